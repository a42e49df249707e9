//! Validation gate: re-scans sanitized output and fails closed.

pub mod patterns;

use crate::capture::model::{EndpointKind, SanitizedCapture};
use crate::capture::parser::{element_path, parse_document};
use crate::config::SanitizerConfig;
use crate::error::CoreResult;
use crate::redaction::rules::RuleSet;
use patterns::{LeakKind, LeakPatterns};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FindingReason {
    FIELD_NOT_PLACEHOLDER,
    IP_ADDRESS_LITERAL,
    MAC_ADDRESS_LITERAL,
    HOSTNAME_LITERAL,
    MARKUP_IN_RULE_FIELD,
}

impl From<LeakKind> for FindingReason {
    fn from(k: LeakKind) -> Self {
        match k {
            LeakKind::IpAddress => FindingReason::IP_ADDRESS_LITERAL,
            LeakKind::MacAddress => FindingReason::MAC_ADDRESS_LITERAL,
            LeakKind::Hostname => FindingReason::HOSTNAME_LITERAL,
        }
    }
}

/// Location of a suspected leak. The suspect value itself is never reported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateFinding {
    pub endpoint: EndpointKind,
    pub path: String,
    pub line: u32,
    pub column: u32,
    pub reason: FindingReason,
    pub rule_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateReport {
    pub endpoint: EndpointKind,
    pub passed: bool,
    pub findings: Vec<GateFinding>,
}

impl GateReport {
    pub fn result(&self) -> &'static str {
        if self.passed {
            "PASS"
        } else {
            "FAIL"
        }
    }
}

pub struct ValidationGate {
    rules: RuleSet,
    patterns: LeakPatterns,
}

impl ValidationGate {
    pub fn new(config: &SanitizerConfig) -> CoreResult<Self> {
        Ok(Self {
            rules: config.rules.clone(),
            patterns: LeakPatterns::compile(&config.rules, &config.hostname_patterns)?,
        })
    }

    pub fn evaluate(&self, sanitized: &SanitizedCapture) -> CoreResult<GateReport> {
        self.evaluate_text(sanitized.endpoint, &sanitized.text)
    }

    /// Malformed text is an error, never a pass.
    pub fn evaluate_text(&self, endpoint: EndpointKind, text: &str) -> CoreResult<GateReport> {
        let doc = parse_document(endpoint, text)?;
        let mut findings = Vec::new();

        for node in doc.descendants() {
            if node.is_text() {
                let value = node.text().unwrap_or("").trim();
                if value.is_empty() {
                    continue;
                }
                let start = node.range().start;
                let owner = self.rules.owning_rule(node);
                if let Some((owner_el, rule)) = owner {
                    if value == rule.replacement {
                        continue;
                    }
                    findings.push(finding(
                        &doc,
                        endpoint,
                        element_path(owner_el),
                        start,
                        FindingReason::FIELD_NOT_PLACEHOLDER,
                        Some(rule.rule_id.clone()),
                    ));
                    continue;
                }
                let path = node
                    .parent_element()
                    .map(element_path)
                    .unwrap_or_else(|| "/".to_string());
                for kind in self.patterns.scan(value) {
                    findings.push(finding(&doc, endpoint, path.clone(), start, kind.into(), None));
                }
            } else if node.is_comment() || node.is_pi() {
                let start = node.range().start;
                if let Some((owner_el, rule)) = self.rules.owning_rule(node) {
                    findings.push(finding(
                        &doc,
                        endpoint,
                        element_path(owner_el),
                        start,
                        FindingReason::MARKUP_IN_RULE_FIELD,
                        Some(rule.rule_id.clone()),
                    ));
                    continue;
                }
                let path = node
                    .parent_element()
                    .map(element_path)
                    .unwrap_or_else(|| "/".to_string());
                for kind in self.patterns.scan(&markup_text(node)) {
                    findings.push(finding(&doc, endpoint, path.clone(), start, kind.into(), None));
                }
            } else if node.is_element() {
                for attr in node.attributes() {
                    let path = format!("{}/@{}", element_path(node), attr.name());
                    let start = attr.range_value().start;
                    if let Some(rule) = self.rules.attribute_rule_for(attr.name()) {
                        if attr.value().trim() != rule.replacement && !attr.value().trim().is_empty() {
                            findings.push(finding(
                                &doc,
                                endpoint,
                                path,
                                start,
                                FindingReason::FIELD_NOT_PLACEHOLDER,
                                Some(rule.rule_id.clone()),
                            ));
                        }
                        continue;
                    }
                    for kind in self.patterns.scan(attr.value()) {
                        findings.push(finding(&doc, endpoint, path.clone(), start, kind.into(), None));
                    }
                }
            }
        }

        let passed = findings.is_empty();
        if !passed {
            tracing::warn!(%endpoint, findings = findings.len(), "validation gate rejected capture");
        }
        Ok(GateReport {
            endpoint,
            passed,
            findings,
        })
    }
}

/// Comment body, or processing-instruction target and content.
fn markup_text(node: Node<'_, '_>) -> String {
    match node.pi() {
        Some(pi) => format!("{} {}", pi.target, pi.value.unwrap_or("")),
        None => node.text().unwrap_or("").to_string(),
    }
}

fn finding(
    doc: &Document<'_>,
    endpoint: EndpointKind,
    path: String,
    byte_pos: usize,
    reason: FindingReason,
    rule_id: Option<String>,
) -> GateFinding {
    let pos = doc.text_pos_at(byte_pos);
    GateFinding {
        endpoint,
        path,
        line: pos.row,
        column: pos.col,
        reason,
        rule_id,
    }
}

pub fn evaluate_validation_gate(
    config: &SanitizerConfig,
    sanitized: &SanitizedCapture,
) -> CoreResult<GateReport> {
    ValidationGate::new(config)?.evaluate(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ValidationGate {
        ValidationGate::new(&SanitizerConfig::default()).unwrap()
    }

    #[test]
    fn placeholders_pass() {
        let r = gate()
            .evaluate_text(
                EndpointKind::DomainObjects,
                "<r><mac-address>0123456789AB</mac-address><lan_ip>127.0.0.1</lan_ip>\
                 <hostname>smile000000</hostname><latitude>52.21</latitude></r>",
            )
            .unwrap();
        assert!(r.passed, "{:?}", r.findings);
    }

    #[test]
    fn missed_longitude_is_reported_with_location() {
        let r = gate()
            .evaluate_text(
                EndpointKind::Locations,
                "<r>\n<location>\n<latitude>52.21</latitude>\n<longitude>5.98</longitude>\n</location>\n</r>",
            )
            .unwrap();
        assert!(!r.passed);
        assert_eq!(r.findings.len(), 1);
        let f = &r.findings[0];
        assert_eq!(f.path, "/r/location/longitude");
        assert_eq!(f.line, 4);
        assert_eq!(f.reason, FindingReason::FIELD_NOT_PLACEHOLDER);
        assert_eq!(f.rule_id.as_deref(), Some("GEO.longitude"));
    }

    #[test]
    fn stray_ip_outside_rule_fields_is_caught() {
        let r = gate()
            .evaluate_text(
                EndpointKind::Modules,
                r#"<r><description>gateway at 10.1.2.3</description><n addr="192.168.0.9"/></r>"#,
            )
            .unwrap();
        let reasons: Vec<_> = r.findings.iter().map(|f| (f.path.as_str(), f.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                ("/r/description", FindingReason::IP_ADDRESS_LITERAL),
                ("/r/n/@addr", FindingReason::IP_ADDRESS_LITERAL),
            ]
        );
    }

    #[test]
    fn unrecognised_value_in_rule_field_fails_closed() {
        let r = gate()
            .evaluate_text(EndpointKind::DomainObjects, "<r><short_id>unknown</short_id></r>")
            .unwrap();
        assert!(!r.passed);
    }

    #[test]
    fn leaks_in_comments_and_instructions_are_caught() {
        let r = gate()
            .evaluate_text(
                EndpointKind::DomainObjects,
                "<r><!-- smile9f3e21 192.168.178.36 c4:93:00:02:78:da -->\
                 <hostname>smile000000</hostname><?trace C493000278DA?></r>",
            )
            .unwrap();
        let reasons: Vec<_> = r.findings.iter().map(|f| (f.path.as_str(), f.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                ("/r", FindingReason::IP_ADDRESS_LITERAL),
                ("/r", FindingReason::MAC_ADDRESS_LITERAL),
                ("/r", FindingReason::HOSTNAME_LITERAL),
                ("/r", FindingReason::MAC_ADDRESS_LITERAL),
            ]
        );
    }

    #[test]
    fn markup_inside_rule_field_fails_closed() {
        let r = gate()
            .evaluate_text(
                EndpointKind::DomainObjects,
                "<r><lan_ip><!-- note -->127.0.0.1</lan_ip></r>",
            )
            .unwrap();
        assert!(!r.passed);
        assert_eq!(r.findings.len(), 1);
        assert_eq!(r.findings[0].reason, FindingReason::MARKUP_IN_RULE_FIELD);
        assert_eq!(r.findings[0].path, "/r/lan_ip");
        assert_eq!(r.findings[0].rule_id.as_deref(), Some("NET.lan_ip"));
    }

    #[test]
    fn bare_and_glued_literals_outside_rule_fields_are_caught() {
        let r = gate()
            .evaluate_text(
                EndpointKind::Modules,
                "<r><mac_address>C493000278DA</mac_address>\
                 <description>gw_192.168.1.42</description></r>",
            )
            .unwrap();
        let reasons: Vec<_> = r.findings.iter().map(|f| (f.path.as_str(), f.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                ("/r/mac_address", FindingReason::MAC_ADDRESS_LITERAL),
                ("/r/description", FindingReason::IP_ADDRESS_LITERAL),
            ]
        );
    }

    #[test]
    fn malformed_text_is_an_error() {
        assert!(gate()
            .evaluate_text(EndpointKind::DomainObjects, "<r><hostname>x</r>")
            .is_err());
    }
}

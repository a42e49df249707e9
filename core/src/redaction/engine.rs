use crate::capture::model::{Capture, EndpointKind, SanitizedCapture};
use crate::capture::parser::{element_path, parse_document, prepare_capture, PreparedCapture};
use crate::determinism::ids::sha256_hex;
use crate::error::CoreResult;
use crate::redaction::rules::{RedactionRule, RuleSet, SensitiveClass};
use roxmltree::Node;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

/// Record of one rewritten value. The original value is never kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedactionRecord {
    pub span_start: usize,
    pub span_end: usize,
    pub rule_id: String,
    pub class: SensitiveClass,
    pub path: String,
    /// False when the value already equalled the placeholder.
    pub changed: bool,
    pub kind: RecordKind,
}

/// What a redaction span covered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// First text run of a field, rewritten to the placeholder.
    Value,
    /// Later text run of a field split by markup, removed.
    Continuation,
    /// Comment or processing instruction inside a field, removed.
    Markup,
}

struct Edit<'r> {
    range: Range<usize>,
    rule: &'r RedactionRule,
    path: String,
    kind: RecordKind,
}

impl Edit<'_> {
    fn replacement(&self) -> String {
        match self.kind {
            RecordKind::Value => escape_xml(&self.rule.replacement),
            RecordKind::Continuation | RecordKind::Markup => String::new(),
        }
    }
}

/// Field redactor
pub struct RedactionEngine {
    rules: RuleSet,
}

impl RedactionEngine {
    pub fn new(rules: RuleSet) -> Self {
        RedactionEngine { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Repairs, parses and redacts a raw capture.
    pub fn redact_capture(&self, capture: &Capture, repair: bool) -> CoreResult<SanitizedCapture> {
        let prepared = prepare_capture(capture, repair)?;
        self.redact(&prepared)
    }

    /// Rewrites every rule-selected value in `prepared` and leaves every other
    /// byte untouched. Comments and processing instructions inside a selected
    /// field are dropped, and a field split into several text runs keeps the
    /// placeholder in the first run only.
    pub fn redact(&self, prepared: &PreparedCapture) -> CoreResult<SanitizedCapture> {
        let text = prepared.text.as_str();
        let edits = self.collect_edits(prepared.endpoint, text)?;

        let mut records = Vec::with_capacity(edits.len());
        let mut result = text.to_string();
        // Spans are disjoint; apply back to front so earlier offsets stay valid.
        for edit in edits.iter().rev() {
            let replacement = edit.replacement();
            let changed = text[edit.range.clone()] != *replacement;
            if changed {
                result.replace_range(edit.range.clone(), &replacement);
            }
            records.push(RedactionRecord {
                span_start: edit.range.start,
                span_end: edit.range.end,
                rule_id: edit.rule.rule_id.clone(),
                class: edit.rule.class,
                path: edit.path.clone(),
                changed,
                kind: edit.kind,
            });
        }
        records.reverse();

        self.log_unfired_rules(prepared.endpoint, &records);

        Ok(SanitizedCapture {
            endpoint: prepared.endpoint,
            sha256: sha256_hex(result.as_bytes()),
            text: result,
            records,
            transformations: prepared.transformations.clone(),
        })
    }

    fn collect_edits<'r>(&'r self, endpoint: EndpointKind, text: &str) -> CoreResult<Vec<Edit<'r>>> {
        let doc = parse_document(endpoint, text)?;
        let mut edits = Vec::new();
        for node in doc.descendants() {
            if node.is_text() {
                if node.text().map(str::trim).unwrap_or("").is_empty() {
                    continue;
                }
                if let Some((owner, rule)) = self.rules.owning_rule(node) {
                    let kind = if follows_text(node) {
                        RecordKind::Continuation
                    } else {
                        RecordKind::Value
                    };
                    edits.push(Edit {
                        range: node.range(),
                        rule,
                        path: element_path(owner),
                        kind,
                    });
                }
            } else if node.is_comment() || node.is_pi() {
                if let Some((owner, rule)) = self.rules.owning_rule(node) {
                    edits.push(Edit {
                        range: node.range(),
                        rule,
                        path: element_path(owner),
                        kind: RecordKind::Markup,
                    });
                }
            } else if node.is_element() {
                for attr in node.attributes() {
                    if let Some(rule) = self.rules.attribute_rule_for(attr.name()) {
                        edits.push(Edit {
                            range: attr.range_value(),
                            rule,
                            path: format!("{}/@{}", element_path(node), attr.name()),
                            kind: RecordKind::Value,
                        });
                    }
                }
            }
        }
        edits.sort_by_key(|e| e.range.start);
        Ok(edits)
    }

    fn log_unfired_rules(&self, endpoint: EndpointKind, records: &[RedactionRecord]) {
        let fired: BTreeSet<&str> = records.iter().map(|r| r.rule_id.as_str()).collect();
        for rule in &self.rules.rules {
            if !fired.contains(rule.rule_id.as_str()) {
                tracing::debug!(%endpoint, rule_id = %rule.rule_id, "rule matched nothing");
            }
        }
    }
}

/// True when an earlier sibling of `node` holds non-blank text.
fn follows_text(node: Node<'_, '_>) -> bool {
    std::iter::successors(node.prev_sibling(), |n| n.prev_sibling())
        .filter(|n| n.is_text())
        .any(|n| !n.text().map(str::trim).unwrap_or("").is_empty())
}

pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

use crate::error::{CoreError, CoreResult};
use roxmltree::Node;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const DEFAULT_RULE_SET_VERSION: &str = "plugwise-fixtures-v1";
pub const LOOPBACK_PLACEHOLDER: &str = "127.0.0.1";

/// What kind of real-world value a rule protects. The gate uses the class to
/// decide which placeholders a leak pattern may legitimately match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveClass {
    MacAddress,
    ShortId,
    IpAddress,
    Hostname,
    Longitude,
    Latitude,
    City,
    PostalCode,
    Other,
}

/// Where a rule applies.
///
/// Written as `name` (element anywhere), `parent/name` (element whose
/// ancestors end with the given names) or `@name` (attribute anywhere).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Selector {
    Element(Vec<String>),
    Attribute(String),
}

impl Selector {
    pub fn parse(s: &str) -> CoreResult<Self> {
        let s = s.trim();
        if let Some(attr) = s.strip_prefix('@') {
            if !is_xml_name(attr) {
                return Err(CoreError::InvalidInput(format!("invalid attribute selector {}", s)));
            }
            return Ok(Selector::Attribute(attr.to_string()));
        }
        let segments: Vec<String> = s.split('/').map(|p| p.trim().to_string()).collect();
        if segments.iter().any(|p| !is_xml_name(p)) {
            return Err(CoreError::InvalidInput(format!("invalid element selector {}", s)));
        }
        Ok(Selector::Element(segments))
    }

    /// Element selectors compare local names against `node` and its ancestors,
    /// innermost first.
    pub fn matches_element(&self, node: Node<'_, '_>) -> bool {
        let Selector::Element(segments) = self else {
            return false;
        };
        if !node.is_element() {
            return false;
        }
        let mut chain = node.ancestors().filter(|n| n.is_element());
        segments
            .iter()
            .rev()
            .all(|seg| chain.next().map(|n| n.tag_name().name() == seg).unwrap_or(false))
    }

    pub fn matches_attribute(&self, name: &str) -> bool {
        matches!(self, Selector::Attribute(a) if a == name)
    }
}

fn is_xml_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Element(segments) => f.write_str(&segments.join("/")),
            Selector::Attribute(a) => write!(f, "@{}", a),
        }
    }
}

impl TryFrom<String> for Selector {
    type Error = CoreError;

    fn try_from(s: String) -> CoreResult<Self> {
        Selector::parse(&s)
    }
}

impl From<Selector> for String {
    fn from(s: Selector) -> String {
        s.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedactionRule {
    pub rule_id: String,
    pub selector: Selector,
    pub class: SensitiveClass,
    pub replacement: String,
}

/// Default table: one row per sensitive field found in Smile captures.
const DEFAULT_RULES: &[(&str, &str, SensitiveClass, &str)] = &[
    ("NET.mac_address", "mac-address", SensitiveClass::MacAddress, "0123456789AB"),
    ("AUTH.short_id", "short_id", SensitiveClass::ShortId, "abcdefgh"),
    ("NET.wifi_ip", "wifi_ip", SensitiveClass::IpAddress, LOOPBACK_PLACEHOLDER),
    ("NET.lan_ip", "lan_ip", SensitiveClass::IpAddress, LOOPBACK_PLACEHOLDER),
    ("NET.ip_addresses", "ip_addresses", SensitiveClass::IpAddress, LOOPBACK_PLACEHOLDER),
    ("NET.hostname", "hostname", SensitiveClass::Hostname, "smile000000"),
    ("GEO.longitude", "longitude", SensitiveClass::Longitude, "4.49"),
    ("GEO.latitude", "latitude", SensitiveClass::Latitude, "52.21"),
    ("GEO.city", "city", SensitiveClass::City, "Sassenheim"),
    ("GEO.postal_code", "postal_code", SensitiveClass::PostalCode, "2171"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSet {
    pub version: String,
    pub rules: Vec<RedactionRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::plugwise_default()
    }
}

impl RuleSet {
    pub fn plugwise_default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(id, selector, class, replacement)| RedactionRule {
                rule_id: id.to_string(),
                selector: Selector::Element(vec![selector.to_string()]),
                class: *class,
                replacement: replacement.to_string(),
            })
            .collect();
        RuleSet {
            version: DEFAULT_RULE_SET_VERSION.to_string(),
            rules,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.version.trim().is_empty() {
            return Err(CoreError::InvalidInput("rule set version is empty".to_string()));
        }
        if self.rules.is_empty() {
            return Err(CoreError::InvalidInput("rule set has no rules".to_string()));
        }
        let mut seen = BTreeSet::new();
        for r in &self.rules {
            if !seen.insert(r.rule_id.as_str()) {
                return Err(CoreError::InvalidInput(format!(
                    "duplicate rule id {}",
                    r.rule_id
                )));
            }
            if r.replacement.trim() != r.replacement || r.replacement.is_empty() {
                return Err(CoreError::InvalidInput(format!(
                    "rule {} replacement must be non-empty without surrounding whitespace",
                    r.rule_id
                )));
            }
        }
        Ok(())
    }

    /// First rule in table order that selects `node` as an element.
    pub fn element_rule_for(&self, node: Node<'_, '_>) -> Option<&RedactionRule> {
        self.rules.iter().find(|r| r.selector.matches_element(node))
    }

    pub fn attribute_rule_for(&self, name: &str) -> Option<&RedactionRule> {
        self.rules.iter().find(|r| r.selector.matches_attribute(name))
    }

    /// Nearest element (starting at `node` itself) that a rule selects.
    /// Text under that element belongs to the rule.
    pub fn owning_rule<'a, 'input>(
        &self,
        node: Node<'a, 'input>,
    ) -> Option<(Node<'a, 'input>, &RedactionRule)> {
        node.ancestors()
            .filter(|n| n.is_element())
            .find_map(|n| self.element_rule_for(n).map(|r| (n, r)))
    }

    pub fn placeholders_for(&self, class: SensitiveClass) -> BTreeSet<&str> {
        self.rules
            .iter()
            .filter(|r| r.class == class)
            .map(|r| r.replacement.as_str())
            .collect()
    }
}

use crate::error::{CoreError, CoreResult};
use crate::gate::patterns::DEFAULT_HOSTNAME_PATTERN;
use crate::redaction::rules::RuleSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything that tunes redaction and the gate. Loaded from JSON; any key
/// left out keeps its built-in default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SanitizerConfig {
    pub rules: RuleSet,
    pub hostname_patterns: Vec<String>,
    pub repair_ampersands: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            rules: RuleSet::plugwise_default(),
            hostname_patterns: vec![DEFAULT_HOSTNAME_PATTERN.to_string()],
            repair_ampersands: true,
        }
    }
}

impl SanitizerConfig {
    pub fn from_json_str(s: &str) -> CoreResult<Self> {
        let cfg: SanitizerConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_json(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            CoreError::InvalidInput(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let cfg = Self::from_json_str(&raw)?;
        tracing::debug!(
            path = %path.display(),
            rule_set_version = %cfg.rules.version,
            rules = cfg.rules.rules.len(),
            "loaded sanitizer config"
        );
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.rules.validate()?;
        for p in &self.hostname_patterns {
            Regex::new(p)?;
        }
        Ok(())
    }
}

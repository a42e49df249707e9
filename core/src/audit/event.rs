use crate::determinism::hash_chain::ChainLink;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    Contributor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEvent {
    pub ts_utc: String, // RFC3339 UTC string
    pub event_type: String,
    pub submission_id: String,
    pub actor: Actor,
    pub details: serde_json::Value,
    pub prev_event_hash: String, // hex 64
    pub event_hash: String,      // hex 64
}

impl AuditEvent {
    pub fn new(
        event_type: &str,
        submission_id: &str,
        actor: Actor,
        details: serde_json::Value,
    ) -> CoreResult<Self> {
        Ok(Self {
            ts_utc: now_rfc3339()?,
            event_type: event_type.to_string(),
            submission_id: submission_id.to_string(),
            actor,
            details,
            prev_event_hash: String::new(),
            event_hash: String::new(),
        })
    }
}

impl ChainLink for AuditEvent {
    fn prev_hash(&self) -> &str {
        &self.prev_event_hash
    }
    fn link_hash(&self) -> &str {
        &self.event_hash
    }
    fn set_prev_hash(&mut self, hash: String) {
        self.prev_event_hash = hash;
    }
    fn set_link_hash(&mut self, hash: String) {
        self.event_hash = hash;
    }
    fn validate(&self) -> CoreResult<()> {
        validate_event_taxonomy(self)
    }
}

pub fn now_rfc3339() -> CoreResult<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| CoreError::InvalidInput(format!("timestamp formatting failed: {}", e)))
}

fn validate_event_taxonomy(event: &AuditEvent) -> CoreResult<()> {
    let allowed = [
        "SUBMISSION_RECEIVED",
        "CAPTURE_REPAIRED",
        "REDACTION_APPLIED",
        "VALIDATION_GATE_RESULT",
        "FIXTURE_CATALOGUED",
        "SUBMISSION_REJECTED",
    ];
    if !allowed.contains(&event.event_type.as_str()) {
        return Err(CoreError::InvalidInput(format!(
            "unknown event_type {}",
            event.event_type
        )));
    }
    if OffsetDateTime::parse(&event.ts_utc, &Rfc3339).is_err() {
        return Err(CoreError::InvalidInput(format!(
            "event {} has non-RFC3339 ts_utc",
            event.event_type
        )));
    }
    for k in required_detail_keys(&event.event_type) {
        if event.details.get(k).is_none() {
            return Err(CoreError::InvalidInput(format!(
                "event {} missing details.{}",
                event.event_type, k
            )));
        }
    }
    Ok(())
}

fn required_detail_keys(event_type: &str) -> &'static [&'static str] {
    match event_type {
        "SUBMISSION_RECEIVED" => &["endpoints", "label", "rule_set_version"],
        "CAPTURE_REPAIRED" => &["endpoint", "transformation"],
        "REDACTION_APPLIED" => &["endpoint", "records", "changed", "sanitized_sha256"],
        "VALIDATION_GATE_RESULT" => &["endpoint", "result", "findings"],
        "FIXTURE_CATALOGUED" => &["fixture_id", "seq", "coverage", "complete"],
        "SUBMISSION_REJECTED" => &["reason", "message"],
        _ => &[],
    }
}

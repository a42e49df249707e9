use crate::audit::event::{Actor, AuditEvent};
use crate::audit::log::AuditLog;
use crate::capture::model::{Capture, EndpointKind, SanitizedCapture};
use crate::capture::parser::{prepare_capture, PreparedCapture};
use crate::catalog::corpus::{Corpus, Coverage, NewFixture};
use crate::catalog::detect::{detect_device, DetectedDevice};
use crate::catalog::profile::{FixtureProfile, ProfileTags};
use crate::config::SanitizerConfig;
use crate::error::{CoreError, CoreResult};
use crate::gate::{GateFinding, GateReport, ValidationGate};
use crate::redaction::engine::RedactionEngine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use ulid::Ulid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubmissionStage {
    Received,
    Prepared,
    Redacted,
    Validated,
    Catalogued,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionState {
    pub stage: SubmissionStage,
    pub submission_id: String,
}

impl SubmissionState {
    pub fn receive() -> Self {
        Self {
            stage: SubmissionStage::Received,
            submission_id: format!("s_{}", Ulid::new()),
        }
    }

    pub fn transition(self, next: SubmissionStage) -> CoreResult<Self> {
        let allowed = matches!(
            (self.stage, next),
            (SubmissionStage::Received, SubmissionStage::Prepared)
                | (SubmissionStage::Prepared, SubmissionStage::Redacted)
                | (SubmissionStage::Redacted, SubmissionStage::Validated)
                | (SubmissionStage::Validated, SubmissionStage::Catalogued)
        );
        if !allowed {
            return Err(CoreError::InvalidInput(format!(
                "invalid transition {:?} -> {:?}",
                self.stage, next
            )));
        }
        Ok(Self {
            stage: next,
            submission_id: self.submission_id,
        })
    }
}

/// One contributor submission: raw captures for a single device plus tags.
#[derive(Debug, Clone)]
pub struct Submission {
    pub captures: Vec<Capture>,
    pub tags: ProfileTags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeReceipt {
    pub submission_id: String,
    pub fixture_id: String,
    pub seq: u64,
    pub label: String,
    pub coverage: Coverage,
    pub complete: bool,
    pub endpoints: Vec<EndpointKind>,
    pub values_redacted: usize,
    pub annotations: Vec<String>,
}

/// Redactor, gate and cataloguer wired together for one rule set.
pub struct Intake {
    config: SanitizerConfig,
    engine: RedactionEngine,
    gate: ValidationGate,
}

impl Intake {
    pub fn new(config: SanitizerConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            engine: RedactionEngine::new(config.rules.clone()),
            gate: ValidationGate::new(&config)?,
            config,
        })
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    pub fn sanitize(&self, capture: &Capture) -> CoreResult<SanitizedCapture> {
        self.engine
            .redact_capture(capture, self.config.repair_ampersands)
    }

    /// Gate-only check for text that is claimed to be sanitized already.
    pub fn check(&self, endpoint: EndpointKind, text: &str) -> CoreResult<GateReport> {
        let prepared = prepare_capture(
            &Capture::new(endpoint, text),
            self.config.repair_ampersands,
        )?;
        self.gate.evaluate_text(endpoint, &prepared.text)
    }

    /// Runs the whole pipeline. A rejection leaves the corpus untouched and
    /// is recorded in the intake log.
    pub fn submit(
        &self,
        corpus: &mut Corpus,
        audit: &mut AuditLog,
        submission: Submission,
    ) -> CoreResult<IntakeReceipt> {
        let state = SubmissionState::receive();
        let sid = state.submission_id.clone();
        let endpoints: Vec<&str> = submission
            .captures
            .iter()
            .map(|c| c.endpoint.as_str())
            .collect();
        audit.append(AuditEvent::new(
            "SUBMISSION_RECEIVED",
            &sid,
            Actor::Contributor,
            json!({
                "endpoints": endpoints,
                "label": submission.tags.label,
                "rule_set_version": self.config.rules.version,
            }),
        )?)?;

        match self.run(state, corpus, audit, submission) {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                tracing::warn!(submission_id = %sid, error = %e, "submission rejected");
                audit.append(AuditEvent::new(
                    "SUBMISSION_REJECTED",
                    &sid,
                    Actor::System,
                    json!({
                        "reason": rejection_reason(&e),
                        "message": e.to_string(),
                    }),
                )?)?;
                Err(e)
            }
        }
    }

    fn run(
        &self,
        state: SubmissionState,
        corpus: &mut Corpus,
        audit: &mut AuditLog,
        submission: Submission,
    ) -> CoreResult<IntakeReceipt> {
        let sid = state.submission_id.clone();
        if submission.captures.is_empty() {
            return Err(CoreError::InvalidInput(
                "submission carries no captures".to_string(),
            ));
        }
        let distinct: BTreeSet<EndpointKind> =
            submission.captures.iter().map(|c| c.endpoint).collect();
        if distinct.len() != submission.captures.len() {
            return Err(CoreError::InvalidInput(
                "submission carries the same endpoint twice".to_string(),
            ));
        }

        // Every capture must parse before any redaction is attempted.
        let prepared = submission
            .captures
            .iter()
            .map(|c| prepare_capture(c, self.config.repair_ampersands))
            .collect::<CoreResult<Vec<PreparedCapture>>>()?;
        for p in prepared.iter().filter(|p| !p.transformations.is_empty()) {
            audit.append(AuditEvent::new(
                "CAPTURE_REPAIRED",
                &sid,
                Actor::System,
                json!({"endpoint": p.endpoint, "transformation": p.transformations}),
            )?)?;
        }
        let state = state.transition(SubmissionStage::Prepared)?;

        let mut sanitized = Vec::with_capacity(prepared.len());
        for p in &prepared {
            let s = self.engine.redact(p)?;
            audit.append(AuditEvent::new(
                "REDACTION_APPLIED",
                &sid,
                Actor::System,
                json!({
                    "endpoint": s.endpoint,
                    "records": s.records.len(),
                    "changed": s.changed_count(),
                    "sanitized_sha256": s.sha256,
                }),
            )?)?;
            sanitized.push(s);
        }
        let state = state.transition(SubmissionStage::Redacted)?;

        let mut findings: Vec<GateFinding> = Vec::new();
        for s in &sanitized {
            let report = self.gate.evaluate(s)?;
            audit.append(AuditEvent::new(
                "VALIDATION_GATE_RESULT",
                &sid,
                Actor::System,
                json!({
                    "endpoint": s.endpoint,
                    "result": report.result(),
                    "findings": report.findings.len(),
                }),
            )?)?;
            findings.extend(report.findings);
        }
        if !findings.is_empty() {
            return Err(CoreError::UnsanitizedFields(findings));
        }
        let state = state.transition(SubmissionStage::Validated)?;

        let domain_objects = sanitized
            .iter()
            .find(|s| s.endpoint == EndpointKind::DomainObjects);
        let detected = match domain_objects {
            Some(d) => Some(detect_device(&d.text)?),
            None => None,
        };
        let (profile, annotations) = resolve_profile(&submission.tags, detected.as_ref())?;

        let values_redacted = sanitized.iter().map(|s| s.changed_count()).sum();
        let entry = corpus.append(NewFixture {
            label: submission.tags.label.clone(),
            rule_set_version: self.config.rules.version.clone(),
            profile,
            captures: sanitized,
            annotations,
        })?;
        audit.append(AuditEvent::new(
            "FIXTURE_CATALOGUED",
            &sid,
            Actor::System,
            json!({
                "fixture_id": entry.fixture_id,
                "seq": entry.seq,
                "coverage": entry.coverage,
                "complete": entry.complete,
            }),
        )?)?;
        let state = state.transition(SubmissionStage::Catalogued)?;

        Ok(IntakeReceipt {
            submission_id: state.submission_id,
            endpoints: entry.captures.iter().map(|c| c.endpoint).collect(),
            fixture_id: entry.fixture_id,
            seq: entry.seq,
            label: entry.label,
            coverage: entry.coverage,
            complete: entry.complete,
            values_redacted,
            annotations: entry.annotations,
        })
    }
}

fn rejection_reason(e: &CoreError) -> &'static str {
    match e {
        CoreError::MalformedCapture { .. } => "MALFORMED_CAPTURE",
        CoreError::UnsanitizedFields(_) => "UNSANITIZED_FIELDS",
        CoreError::UnrecognizedDevice(_) => "UNRECOGNIZED_DEVICE",
        CoreError::InvalidInput(_) => "INVALID_INPUT",
        _ => "INTERNAL_ERROR",
    }
}

/// Contributor tags win; detection fills the gaps. Disagreements become
/// annotations on the entry.
pub fn resolve_profile(
    tags: &ProfileTags,
    detected: Option<&DetectedDevice>,
) -> CoreResult<(FixtureProfile, Vec<String>)> {
    let mut annotations = Vec::new();

    let family = match (tags.family, detected) {
        (Some(f), Some(d)) if f != d.family => {
            tracing::warn!(tagged = %f, detected = %d.family, "family tag disagrees with capture");
            annotations.push(format!(
                "family tagged {} but capture identifies {}",
                f, d.family
            ));
            f
        }
        (Some(f), _) => f,
        (None, Some(d)) => d.family,
        (None, None) => {
            return Err(CoreError::InvalidInput(
                "device family not tagged and no domain_objects capture to detect it from"
                    .to_string(),
            ))
        }
    };

    let firmware_version = match (&tags.firmware_version, detected) {
        (Some(v), Some(d)) if v.trim() != d.firmware_version => {
            tracing::warn!(tagged = %v, detected = %d.firmware_version, "firmware tag disagrees with capture");
            annotations.push(format!(
                "firmware tagged {} but capture reports {}",
                v.trim(),
                d.firmware_version
            ));
            v.clone()
        }
        (Some(v), _) => v.clone(),
        (None, Some(d)) => d.firmware_version.clone(),
        (None, None) => {
            return Err(CoreError::InvalidInput(
                "firmware version not tagged and no domain_objects capture to detect it from"
                    .to_string(),
            ))
        }
    };

    let legacy = tags
        .legacy
        .or(detected.map(|d| d.legacy))
        .unwrap_or(false);

    let mut features = tags.features.clone();
    if let Some(d) = detected {
        if !d.supported {
            annotations.push(format!(
                "gateway {} {} is outside the supported model table",
                d.vendor_model, d.firmware_version
            ));
        }
        for f in d.features.difference(&tags.features) {
            annotations.push(format!("feature {} detected but not tagged", f));
        }
        features.extend(d.features.iter().copied());
    }

    let profile = FixtureProfile::new(
        family,
        &firmware_version,
        legacy,
        tags.peripherals.iter().copied(),
        features,
    )?;
    Ok((profile, annotations))
}

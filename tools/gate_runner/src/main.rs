use serde_json::json;
use smile_fixtures_core::audit::log::AuditLog;
use smile_fixtures_core::capture::model::{Capture, EndpointKind};
use smile_fixtures_core::catalog::corpus::{Corpus, Coverage, INTAKE_LOG_FILE};
use smile_fixtures_core::catalog::profile::{Feature, Peripheral, ProfileTags};
use smile_fixtures_core::config::SanitizerConfig;
use smile_fixtures_core::gate::ValidationGate;
use smile_fixtures_core::intake::{Intake, Submission};
use smile_fixtures_core::validator::verify_corpus;
use std::collections::BTreeSet;
use tracing_subscriber::EnvFilter;

const ADAM: &[(EndpointKind, &str)] = &[
    (
        EndpointKind::Appliances,
        include_str!("../../../core/tests/data/adam_living_floor_plus_3_rooms/core.appliances.xml"),
    ),
    (
        EndpointKind::DirectObjects,
        include_str!("../../../core/tests/data/adam_living_floor_plus_3_rooms/core.direct_objects.xml"),
    ),
    (
        EndpointKind::DomainObjects,
        include_str!("../../../core/tests/data/adam_living_floor_plus_3_rooms/core.domain_objects.xml"),
    ),
    (
        EndpointKind::Locations,
        include_str!("../../../core/tests/data/adam_living_floor_plus_3_rooms/core.locations.xml"),
    ),
    (
        EndpointKind::Modules,
        include_str!("../../../core/tests/data/adam_living_floor_plus_3_rooms/core.modules.xml"),
    ),
];

const P1_LEGACY: &[(EndpointKind, &str)] = &[
    (
        EndpointKind::DomainObjects,
        include_str!("../../../core/tests/data/p1_legacy/core.domain_objects.xml"),
    ),
    (
        EndpointKind::Locations,
        include_str!("../../../core/tests/data/p1_legacy/core.locations.xml"),
    ),
    (
        EndpointKind::Modules,
        include_str!("../../../core/tests/data/p1_legacy/core.modules.xml"),
    ),
];

struct Checks {
    any_fail: bool,
}

impl Checks {
    fn record(&mut self, id: &str, ok: bool, message: impl AsRef<str>) {
        println!(
            "CHECK {} {} {}",
            id,
            if ok { "PASS" } else { "FAIL" },
            message.as_ref()
        );
        if !ok {
            self.any_fail = true;
        }
    }
}

fn captures(set: &[(EndpointKind, &str)]) -> Vec<Capture> {
    set.iter().map(|(e, t)| Capture::new(*e, *t)).collect()
}

fn main() {
    // gate_runner pushes the bundled sample captures through the whole
    // intake pipeline into a throwaway corpus and prints stable check IDs.
    // Any FAIL exits non-zero.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = SanitizerConfig::default();
    let intake = Intake::new(config.clone()).expect("default config is valid");
    let gate = ValidationGate::new(&config).expect("default gate compiles");
    let mut checks = Checks { any_fail: false };

    // Raw samples must trip the gate, otherwise the gate proves nothing.
    let raw_leaks: usize = captures(ADAM)
        .iter()
        .map(|c| {
            gate.evaluate_text(c.endpoint, &c.text)
                .expect("sample parses")
                .findings
                .len()
        })
        .sum();
    checks.record(
        "GATE.RAW_SAMPLES_REJECTED",
        raw_leaks > 0,
        format!("findings={}", raw_leaks),
    );

    // Determinism: identical input must yield byte-identical sanitized output.
    let mut stable = true;
    for c in captures(ADAM).iter().chain(captures(P1_LEGACY).iter()) {
        let a = intake.sanitize(c).expect("sanitize sample");
        let b = intake.sanitize(c).expect("sanitize sample (2)");
        if a.sha256 != b.sha256 {
            eprintln!("{} sha256 {} != {}", c.endpoint, a.sha256, b.sha256);
            stable = false;
        }
    }
    checks.record("DETERMINISM.REDACTION_BYTE_STABILITY", stable, "two runs compared");

    // Idempotence: redacting sanitized output changes nothing.
    let mut idempotent = true;
    for c in captures(ADAM) {
        let once = intake.sanitize(&c).expect("sanitize sample");
        let twice = intake
            .sanitize(&Capture::new(c.endpoint, once.text.clone()))
            .expect("sanitize sanitized sample");
        if twice.text != once.text || twice.changed_count() != 0 {
            idempotent = false;
        }
    }
    checks.record("REDACTION.IDEMPOTENT", idempotent, "adam sample");

    let tmp = tempfile::tempdir().expect("tempdir");
    let root = tmp.path().join("corpus");
    let mut corpus = Corpus::open_or_create(&root).expect("create corpus");
    let (mut audit, _) =
        AuditLog::open_or_create(root.join(INTAKE_LOG_FILE)).expect("create intake log");

    let adam_tags = ProfileTags {
        label: Some("self_audit_adam".to_string()),
        peripherals: BTreeSet::from([Peripheral::Boiler, Peripheral::Lisa]),
        features: BTreeSet::from([Feature::Gas]),
        ..ProfileTags::default()
    };
    let first = intake.submit(
        &mut corpus,
        &mut audit,
        Submission {
            captures: captures(ADAM),
            tags: adam_tags.clone(),
        },
    );
    match &first {
        Ok(r) => checks.record(
            "INTAKE.ACCEPT_COMPLETE",
            r.complete && r.coverage == Coverage::FillsGap,
            json!({"fixture_id": r.fixture_id, "values_redacted": r.values_redacted}).to_string(),
        ),
        Err(e) => checks.record("INTAKE.ACCEPT_COMPLETE", false, e.to_string()),
    }

    let second = intake.submit(
        &mut corpus,
        &mut audit,
        Submission {
            captures: captures(ADAM),
            tags: adam_tags,
        },
    );
    match &second {
        Ok(r) => checks.record(
            "CATALOG.DUPLICATE_FLAGGED",
            r.coverage == Coverage::Redundant,
            format!("annotations={}", r.annotations.len()),
        ),
        Err(e) => checks.record("CATALOG.DUPLICATE_FLAGGED", false, e.to_string()),
    }

    let legacy = intake.submit(
        &mut corpus,
        &mut audit,
        Submission {
            captures: captures(P1_LEGACY),
            tags: ProfileTags::default(),
        },
    );
    match &legacy {
        Ok(r) => checks.record(
            "CATALOG.LEGACY_P1_COMPLETE",
            r.complete,
            format!("endpoints={}", r.endpoints.len()),
        ),
        Err(e) => checks.record("CATALOG.LEGACY_P1_COMPLETE", false, e.to_string()),
    }

    let malformed = intake.submit(
        &mut corpus,
        &mut audit,
        Submission {
            captures: vec![Capture::new(EndpointKind::DomainObjects, "<domain_objects>")],
            tags: ProfileTags::default(),
        },
    );
    checks.record(
        "INTAKE.MALFORMED_REJECTED",
        malformed.is_err() && corpus.len() == 3,
        format!("entries={}", corpus.len()),
    );

    let summary = verify_corpus(&root, &config).expect("verify corpus");
    println!(
        "CORPUS overall={} entries={} rule_set={}",
        summary.overall, summary.entries, summary.rule_set_version
    );
    for c in &summary.checks {
        checks.record(&c.check_id, c.result == "PASS", &c.message);
    }

    let reopened = Corpus::open_or_create(&root).expect("reopen corpus");
    checks.record(
        "CATALOG.REOPEN_STABLE",
        reopened.entries() == corpus.entries(),
        format!("entries={}", reopened.len()),
    );

    if checks.any_fail {
        std::process::exit(1);
    }
}

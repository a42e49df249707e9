mod common;

use common::CorpusEnv;
use smile_fixtures_core::capture::model::{Capture, EndpointKind};
use smile_fixtures_core::catalog::corpus::CATALOG_FILE;
use smile_fixtures_core::catalog::profile::ProfileTags;
use smile_fixtures_core::error::CoreError;
use smile_fixtures_core::gate::FindingReason;
use smile_fixtures_core::intake::Submission;
use std::fs;

fn assert_rejected_cleanly(env: &CorpusEnv, reason: &str) {
    assert!(env.corpus.is_empty());
    assert_eq!(
        fs::read_to_string(env.dir.path().join(CATALOG_FILE)).unwrap(),
        ""
    );
    let fixtures: Vec<_> = fs::read_dir(env.dir.path().join("fixtures"))
        .unwrap()
        .collect();
    assert!(fixtures.is_empty());

    let events = env.events();
    let last = events.last().unwrap();
    assert_eq!(last.event_type, "SUBMISSION_REJECTED");
    assert_eq!(last.details["reason"], reason);
    assert!(events.iter().all(|e| e.event_type != "FIXTURE_CATALOGUED"));
}

#[test]
fn malformed_capture_rejects_whole_submission() {
    let mut env = CorpusEnv::new();
    let mut submission = common::adam_submission();
    for c in submission.captures.iter_mut() {
        if c.endpoint == EndpointKind::Modules {
            c.text = "<modules>\n  <module id=\"x\">\n</modules>".to_string();
        }
    }
    let err = env
        .intake
        .submit(&mut env.corpus, &mut env.audit, submission)
        .unwrap_err();
    match err {
        CoreError::MalformedCapture { ref endpoint, line, .. } => {
            assert_eq!(endpoint, "modules");
            assert_eq!(line, 3);
        }
        ref other => panic!("unexpected error: {:?}", other),
    }
    assert_rejected_cleanly(&env, "MALFORMED_CAPTURE");
    // Nothing was redacted before the parse failure surfaced.
    assert!(env
        .events()
        .iter()
        .all(|e| e.event_type != "REDACTION_APPLIED"));
}

#[test]
fn leak_outside_rule_table_fails_closed() {
    let mut env = CorpusEnv::new();
    let mut submission = common::adam_submission();
    for c in submission.captures.iter_mut() {
        if c.endpoint == EndpointKind::Modules {
            c.text = c.text.replacen(
                "</modules>",
                "<note>installer left 192.168.178.1 here</note></modules>",
                1,
            );
        }
    }
    let err = env
        .intake
        .submit(&mut env.corpus, &mut env.audit, submission)
        .unwrap_err();
    match err {
        CoreError::UnsanitizedFields(findings) => {
            assert_eq!(findings.len(), 1);
            assert_eq!(findings[0].endpoint, EndpointKind::Modules);
            assert_eq!(findings[0].path, "/modules/note");
            assert_eq!(findings[0].reason, FindingReason::IP_ADDRESS_LITERAL);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_rejected_cleanly(&env, "UNSANITIZED_FIELDS");
}

#[test]
fn foreign_gateway_is_unrecognized() {
    let mut env = CorpusEnv::new();
    let submission = Submission {
        captures: vec![Capture::new(
            EndpointKind::DomainObjects,
            "<domain_objects><gateway><vendor_name>Acme</vendor_name>\
             <vendor_model>box</vendor_model><firmware_version>1.0.0</firmware_version>\
             </gateway></domain_objects>",
        )],
        tags: ProfileTags::default(),
    };
    let err = env
        .intake
        .submit(&mut env.corpus, &mut env.audit, submission)
        .unwrap_err();
    assert!(matches!(err, CoreError::UnrecognizedDevice(_)), "{:?}", err);
    assert_rejected_cleanly(&env, "UNRECOGNIZED_DEVICE");
}

#[test]
fn untagged_submission_without_domain_objects_is_invalid() {
    let mut env = CorpusEnv::new();
    let submission = Submission {
        captures: common::captures("anna_without_boiler")
            .into_iter()
            .filter(|c| c.endpoint == EndpointKind::Locations)
            .collect(),
        tags: ProfileTags::default(),
    };
    let err = env
        .intake
        .submit(&mut env.corpus, &mut env.audit, submission)
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidInput(_)));
    assert_rejected_cleanly(&env, "INVALID_INPUT");
}

#[test]
fn empty_and_duplicate_endpoint_submissions_are_invalid() {
    let mut env = CorpusEnv::new();
    let empty = Submission {
        captures: Vec::new(),
        tags: common::adam_tags(),
    };
    assert!(matches!(
        env.intake.submit(&mut env.corpus, &mut env.audit, empty),
        Err(CoreError::InvalidInput(_))
    ));

    let twice = Capture::new(EndpointKind::Locations, "<locations/>");
    let doubled = Submission {
        captures: vec![twice.clone(), twice],
        tags: common::adam_tags(),
    };
    assert!(matches!(
        env.intake.submit(&mut env.corpus, &mut env.audit, doubled),
        Err(CoreError::InvalidInput(_))
    ));
    assert_rejected_cleanly(&env, "INVALID_INPUT");
}

#[test]
fn check_reports_raw_capture_without_touching_anything() {
    let env = CorpusEnv::new();
    let raw = common::captures("anna_without_boiler")
        .into_iter()
        .find(|c| c.endpoint == EndpointKind::DomainObjects)
        .unwrap();
    let report = env.intake.check(raw.endpoint, &raw.text).unwrap();
    assert!(!report.passed);
    let mut rules: Vec<&str> = report
        .findings
        .iter()
        .filter_map(|f| f.rule_id.as_deref())
        .collect();
    rules.sort();
    assert_eq!(
        rules,
        vec![
            "GEO.city",
            "GEO.latitude",
            "GEO.longitude",
            "GEO.postal_code",
            "NET.hostname",
            "NET.lan_ip",
            "NET.mac_address",
            "NET.wifi_ip",
        ]
    );
    assert!(env.events().is_empty());

    let clean = env.intake.sanitize(&raw).unwrap();
    assert!(env.intake.check(clean.endpoint, &clean.text).unwrap().passed);
}

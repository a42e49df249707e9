mod common;

use smile_fixtures_core::capture::model::{Capture, EndpointKind};
use smile_fixtures_core::capture::parser::repair_ampersands;
use smile_fixtures_core::config::SanitizerConfig;
use smile_fixtures_core::gate::ValidationGate;
use smile_fixtures_core::redaction::engine::{escape_xml, RecordKind, RedactionEngine};
use smile_fixtures_core::redaction::rules::RuleSet;

fn engine() -> RedactionEngine {
    RedactionEngine::new(RuleSet::plugwise_default())
}

#[test]
fn redacting_twice_equals_redacting_once() {
    let e = engine();
    for (set, cap) in common::all_captures() {
        let once = e.redact_capture(&cap, true).unwrap();
        let twice = e
            .redact_capture(&Capture::new(cap.endpoint, once.text.clone()), true)
            .unwrap();
        assert_eq!(once.text, twice.text, "{} {}", set, cap.endpoint);
        assert_eq!(twice.changed_count(), 0, "{} {}", set, cap.endpoint);
    }
}

#[test]
fn no_original_sensitive_value_survives() {
    let e = engine();
    for (set, cap) in common::all_captures() {
        let repaired = repair_ampersands(&cap.text).into_owned();
        let out = e.redact_capture(&cap, true).unwrap();
        for r in out.records.iter().filter(|r| r.changed) {
            let original = repaired[r.span_start..r.span_end].trim();
            assert!(
                !out.text.contains(original),
                "{} {}: value at {} survived",
                set,
                cap.endpoint,
                r.path
            );
        }
    }
}

#[test]
fn bytes_outside_redacted_spans_are_untouched() {
    let rules = RuleSet::plugwise_default();
    let e = RedactionEngine::new(rules.clone());
    for (set, cap) in common::all_captures() {
        let input = repair_ampersands(&cap.text).into_owned();
        let out = e.redact_capture(&cap, true).unwrap();

        let mut delta: isize = 0;
        let mut prev_end = 0usize;
        for r in &out.records {
            let from = (prev_end as isize + delta) as usize;
            let to = (r.span_start as isize + delta) as usize;
            assert_eq!(
                &input[prev_end..r.span_start],
                &out.text[from..to],
                "{} {} before {}",
                set,
                cap.endpoint,
                r.path
            );
            let rule = rules.rules.iter().find(|x| x.rule_id == r.rule_id).unwrap();
            let written = match (r.changed, r.kind) {
                (false, _) => r.span_end - r.span_start,
                (true, RecordKind::Value) => escape_xml(&rule.replacement).len(),
                (true, RecordKind::Continuation | RecordKind::Markup) => 0,
            };
            delta += written as isize - (r.span_end - r.span_start) as isize;
            prev_end = r.span_end;
        }
        let from = (prev_end as isize + delta) as usize;
        assert_eq!(&input[prev_end..], &out.text[from..], "{} {} tail", set, cap.endpoint);
    }
}

#[test]
fn every_listed_field_kind_fires_on_adam_capture() {
    let caps = common::captures("adam_living_floor_plus_3_rooms");
    let domain = caps
        .iter()
        .find(|c| c.endpoint == EndpointKind::DomainObjects)
        .unwrap();
    let out = engine().redact_capture(domain, true).unwrap();
    let mut fired: Vec<&str> = out.records.iter().map(|r| r.rule_id.as_str()).collect();
    fired.sort();
    fired.dedup();
    assert_eq!(
        fired,
        vec![
            "AUTH.short_id",
            "GEO.city",
            "GEO.latitude",
            "GEO.longitude",
            "GEO.postal_code",
            "NET.hostname",
            "NET.ip_addresses",
            "NET.lan_ip",
            "NET.mac_address",
            "NET.wifi_ip",
        ]
    );
    // Both entries under ip_addresses, IPv4 and IPv6.
    assert_eq!(
        out.records
            .iter()
            .filter(|r| r.rule_id == "NET.ip_addresses")
            .count(),
        2
    );
    assert!(out.text.contains("<zigbee_mac_address>000D6F000C869B61</zigbee_mac_address>"));
}

#[test]
fn mac_example_maps_to_fixed_token() {
    let out = engine()
        .redact_capture(
            &Capture::new(
                EndpointKind::DomainObjects,
                "<gateway><mac-address>AA:BB:CC:11:22:33</mac-address></gateway>",
            ),
            true,
        )
        .unwrap();
    assert_eq!(out.text, "<gateway><mac-address>0123456789AB</mac-address></gateway>");
}

#[test]
fn values_hidden_in_field_markup_are_removed_and_pass_the_gate() {
    let cases = [
        (
            "<r><lan_ip><!--192.168.178.36-->192.168.178.36</lan_ip></r>",
            "<r><lan_ip>127.0.0.1</lan_ip></r>",
        ),
        (
            "<r><hostname>smile9f<!-- split -->3e21</hostname></r>",
            "<r><hostname>smile000000</hostname></r>",
        ),
        (
            "<r><mac-address><?note c4:93:00:02:78:da?>C4:93:00:02:78:DA</mac-address></r>",
            "<r><mac-address>0123456789AB</mac-address></r>",
        ),
    ];
    let gate = ValidationGate::new(&SanitizerConfig::default()).unwrap();
    for (raw, expected) in cases {
        let out = engine()
            .redact_capture(&Capture::new(EndpointKind::DomainObjects, raw), true)
            .unwrap();
        assert_eq!(out.text, expected);
        let report = gate.evaluate(&out).unwrap();
        assert!(report.passed, "{}: {:?}", raw, report.findings);
    }
}

#[test]
fn input_capture_is_not_mutated() {
    let cap = Capture::new(
        EndpointKind::Locations,
        "<l><city>Utrecht</city></l>",
    );
    let before = cap.clone();
    let _ = engine().redact_capture(&cap, true).unwrap();
    assert_eq!(cap, before);
}

#[test]
fn repair_can_be_disabled_by_config() {
    let cfg = SanitizerConfig {
        repair_ampersands: false,
        ..SanitizerConfig::default()
    };
    let caps = common::captures("p1_legacy");
    let locations = caps
        .iter()
        .find(|c| c.endpoint == EndpointKind::Locations)
        .unwrap();
    let e = RedactionEngine::new(cfg.rules.clone());
    assert!(e.redact_capture(locations, cfg.repair_ampersands).is_err());
    let repaired = e.redact_capture(locations, true).unwrap();
    assert_eq!(repaired.transformations, vec!["AMPERSAND_REPAIR".to_string()]);
}

//! Integration tests for the end-to-end demonstration.
//!
//! Checks the full strict trace, the rejected call sites, the sloppy-mode
//! contrast, structured events, and transcript determinism.

#![forbid(unsafe_code)]

use incontext_engine::demonstration::{demonstration, prepare_realm, run_demonstration};
use incontext_engine::interpreter::RealmConfig;
use incontext_engine::object_model::JsValue;
use incontext_engine::receiver::EvaluationMode;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const STRICT_TRACE: &[&str] = &[
    "Basic Context",
    "global : 0",
    "f1 : 1",
    "f2 : 2",
    "f3 : 3",
    "Experimenting with the key word 'this'",
    "b : 0",
    "b : 10",
    "b : 10",
    "b : 10",
    "b : 10",
    "Car {}",
    "Car { honk: [Function (anonymous)], horn: 'honk honk', make: 'Ford', model: 'Bronco' }",
    "honk honk",
    "Car {}",
    "Car { honk: [Function (anonymous)], horn: 'beep beep', make: 'Volkswagen', model: 'Beetle' }",
    "beep beep",
    "{ bark: [Function: bark], breed: 'Mastif', name: 'tex' }",
    "My name is ",
    "Using call and apply",
    "b : 8",
    "b : 20",
    "using bind",
    "b : 8",
    "b : 8",
    "honk honk",
    "{ a: 20, bark: [Function: bark], breed: 'Mastif', honk: [Function: bound ], name: 'tex', texbind: [Function: bound f8] }",
    "honk honk",
    "honk honk",
];

fn strict_config() -> RealmConfig {
    RealmConfig::default()
}

fn sloppy_config() -> RealmConfig {
    RealmConfig::with_mode(EvaluationMode::Sloppy)
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

#[test]
fn strict_trace_matches_expected_lines() {
    let report = run_demonstration(strict_config(), false).unwrap();
    assert_eq!(report.lines, STRICT_TRACE);
    assert!(report.rejections.is_empty());
    assert!(report.rejected_lines.is_empty());
}

#[test]
fn sloppy_trace_matches_strict_for_working_call_sites() {
    let strict = run_demonstration(strict_config(), false).unwrap();
    let sloppy = run_demonstration(sloppy_config(), false).unwrap();
    assert_eq!(strict.lines, sloppy.lines);
    assert_eq!(sloppy.mode, EvaluationMode::Sloppy);
}

#[test]
fn honk_keeps_car1_horn_after_own_property_assignment() {
    let report = run_demonstration(strict_config(), false).unwrap();
    let tail = &report.lines[report.lines.len() - 2..];
    assert_eq!(tail, ["honk honk", "honk honk"]);
    assert!(!report.lines.iter().any(|l| l.contains("awooga")));
}

// ---------------------------------------------------------------------------
// Rejected call sites
// ---------------------------------------------------------------------------

#[test]
fn strict_rejected_call_sites_fail_with_expected_codes() {
    let report = run_demonstration(strict_config(), true).unwrap();
    let labels: Vec<_> = report.rejections.iter().map(|r| r.call_site.as_str()).collect();
    assert_eq!(labels, ["f4(f5())", "f4(f6())", "f4(f7())", "f4(f8())", "f4(f9())"]);
    for rejection in &report.rejections {
        assert!(
            rejection.rejected_as_expected(),
            "{} produced {:?}",
            rejection.call_site,
            rejection.error_code
        );
    }
    assert_eq!(
        report.rejections[0].detail,
        "TypeError: cannot read properties of undefined (reading 'a')"
    );
    assert_eq!(
        report.rejections[4].detail,
        "TypeError: cannot set property 'a' of undefined"
    );
    // f5 reaches its console.dir before f4 fails.
    assert_eq!(report.rejected_lines, ["undefined"]);
}

#[test]
fn sloppy_rejected_call_sites_complete() {
    let report = run_demonstration(sloppy_config(), true).unwrap();
    assert!(report.rejections.iter().all(|r| r.error_code.is_none()));
    // f5 assigns the global `a` before returning the global object.
    assert_eq!(report.rejections[0].detail, "5");
    // f9 writes `a` through the ambient global receiver.
    assert_eq!(report.rejections[4].detail, "9");
    assert_eq!(report.rejected_lines.len(), 2);
    assert!(report.rejected_lines[0].starts_with("Window {"));
}

#[test]
fn each_rejected_site_fails_in_a_fresh_realm() {
    let demo = demonstration();
    for site in &demo.rejected {
        let mut realm = prepare_realm(strict_config()).unwrap();
        realm.hoist(&demo.script()).unwrap();
        let err = realm.evaluate(&site.expression).unwrap_err();
        assert_eq!(err.stable_code(), site.expected_code, "{}", site.label);
    }
}

// ---------------------------------------------------------------------------
// Realm state after the script
// ---------------------------------------------------------------------------

#[test]
fn scope_isolation_leaves_global_a_untouched_by_f1_to_f3() {
    let demo = demonstration();
    let mut realm = prepare_realm(strict_config()).unwrap();
    realm.run_script(&demo.script()).unwrap();
    // Only the explicit `a = 8` in the call/apply step reassigns the global.
    assert_eq!(realm.get_global("a").unwrap(), JsValue::Int(8));
    let f1 = realm.get_global("f1").unwrap();
    assert_eq!(realm.call_plain(&f1, vec![]).unwrap(), JsValue::Int(1));
    assert_eq!(realm.get_global("a").unwrap(), JsValue::Int(8));
}

#[test]
fn tex_is_not_linked_to_dog_prototype() {
    let demo = demonstration();
    let mut realm = prepare_realm(strict_config()).unwrap();
    realm.run_script(&demo.script()).unwrap();
    let dog = realm.get_global("Dog").unwrap();
    let tex = realm.get_global("tex").unwrap();
    let dog_proto = realm.get(&dog, "prototype").unwrap();
    assert_ne!(realm.prototype_of(&tex).unwrap(), dog_proto.as_handle());
}

// ---------------------------------------------------------------------------
// Events and determinism
// ---------------------------------------------------------------------------

#[test]
fn events_cover_every_invocation_style_used() {
    let report = run_demonstration(strict_config(), true).unwrap();
    let names: std::collections::BTreeSet<_> =
        report.events.iter().map(|e| e.event.as_str()).collect();
    for expected in [
        "invoke_plain",
        "invoke_method",
        "invoke_call",
        "invoke_construct",
        "invoke_bound",
        "bind",
        "rejected",
    ] {
        assert!(names.contains(expected), "missing event {expected}");
    }
    assert!(report.events.iter().all(|e| e.trace_id == "incontext-trace"));
    let rejected: Vec<_> = report
        .events
        .iter()
        .filter_map(|e| e.error_code.as_deref())
        .collect();
    assert_eq!(rejected.len(), 5);
}

#[test]
fn transcript_digest_is_deterministic() {
    let first = run_demonstration(strict_config(), true).unwrap();
    let second = run_demonstration(strict_config(), true).unwrap();
    assert_eq!(first.transcript_sha256, second.transcript_sha256);
    assert_eq!(first.transcript_sha256.len(), 64);
    assert_eq!(first, second);
}

#[test]
fn transcript_digest_depends_on_mode() {
    let strict = run_demonstration(strict_config(), true).unwrap();
    let sloppy = run_demonstration(sloppy_config(), true).unwrap();
    assert_ne!(strict.transcript_sha256, sloppy.transcript_sha256);
}

#[test]
fn report_serde_round_trip() {
    let report = run_demonstration(strict_config(), true).unwrap();
    let json = serde_json::to_string(&report).unwrap();
    let back: incontext_engine::DemonstrationReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}

//! Behavioural tests for log capture, replay on failure, and restoration.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serial_test::serial;

use rstest_inject::capture::log_backend::{LogSink, set_root_sinks};
use rstest_inject::capture::{
    CaptureBuffer, CaptureLevel, CaptureRequest, CapturedRecord, registry, run_guarded,
    scope_matches,
};
use rstest_inject_macros::capture_logs;

struct RecordingSink {
    buffer: Arc<CaptureBuffer>,
}

impl LogSink for RecordingSink {
    fn emit(&self, record: &CapturedRecord) {
        self.buffer.push(record.clone());
    }
}

fn install_root() -> Arc<CaptureBuffer> {
    let buffer = Arc::new(CaptureBuffer::new());
    let sink = Arc::new(RecordingSink {
        buffer: Arc::clone(&buffer),
    });
    set_root_sinks(vec![sink]).unwrap_or_else(|err| panic!("root sinks: {err}"));
    buffer
}

fn reset_root() {
    set_root_sinks(Vec::new()).unwrap_or_else(|err| panic!("reset root sinks: {err}"));
}

fn scoped(buffer: &CaptureBuffer, scope: &str) -> Vec<(CaptureLevel, String)> {
    buffer
        .snapshot()
        .into_iter()
        .filter(|record| scope_matches(&record.target, scope))
        .map(|record| (record.level, record.message))
        .collect()
}

#[test]
fn registry_reports_compiled_backends() {
    let available = registry().available();
    assert!(available.contains(&"log"), "available: {available:?}");
    assert!(available.contains(&"tracing"), "available: {available:?}");
}

#[test]
fn unknown_backends_are_a_configuration_error() {
    let err = run_guarded("log4j", &CaptureRequest::new("scope"), false, |_guard| ());
    let message = err.err().map(|e| e.to_string()).unwrap_or_default();
    assert!(message.contains("log4j"), "got: {message}");
}

#[test]
#[serial(log_router)]
fn only_the_failing_test_replays_its_records() {
    let root = install_root();

    // A passing test: records are buffered, inspectable, and then dropped.
    let passing = run_guarded(
        "log",
        &CaptureRequest::new("suite::passing"),
        false,
        |guard| {
            log::info!(target: "suite::passing", "pass info");
            log::error!(target: "suite::passing", "pass error");
            assert_eq!(guard.records().len(), 2);
        },
    );
    assert!(passing.is_ok());

    // A failing test: the panic propagates and the records are replayed.
    let failing = catch_unwind(AssertUnwindSafe(|| {
        run_guarded(
            "log",
            &CaptureRequest::new("suite::failing"),
            false,
            |_guard| {
                log::info!(target: "suite::failing", "fail info");
                log::error!(target: "suite::failing", "fail error");
                panic!("the assertion at the end of the test failed");
            },
        )
    }));
    assert!(failing.is_err());

    let expected = [
        (CaptureLevel::Info, String::from("fail info")),
        (CaptureLevel::Error, String::from("fail error")),
    ];
    assert_eq!(scoped(&root, "suite"), expected);

    // The capture scopes are gone: new records propagate to the root again.
    log::warn!(target: "suite::failing", "after restore");
    assert_eq!(
        scoped(&root, "suite").last().map(|(_, message)| message.clone()),
        Some(String::from("after restore"))
    );
    reset_root();
}

#[test]
#[serial(log_router)]
fn clear_records_drops_the_buffered_prefix() {
    let outcome = run_guarded(
        "log",
        &CaptureRequest::new("suite::cleared"),
        false,
        |guard| {
            log::info!(target: "suite::cleared", "before clear");
            guard.clear_records();
            guard.clear_records();
            log::info!(target: "suite::cleared", "after clear");
            guard
                .records()
                .into_iter()
                .map(|record| record.message)
                .collect::<Vec<_>>()
        },
    );
    assert_eq!(outcome.ok().as_deref(), Some(&[String::from("after clear")][..]));
}

#[capture_logs(target = "macro_scope")]
#[test]
#[serial(log_router)]
fn the_attribute_exposes_captured_records() {
    log::info!(target: "macro_scope", "first");
    log::info!(target: "macro_scope::inner", "second");
    let messages: Vec<_> = captured_logs
        .records()
        .into_iter()
        .map(|record| record.message)
        .collect();
    assert_eq!(messages, ["first", "second"]);
}

#[capture_logs(target = "silent_scope", disable)]
#[test]
#[serial(log_router)]
fn disable_suppresses_without_capturing() {
    log::error!(target: "silent_scope", "never seen");
    assert!(captured_logs.records().is_empty());
}

#[capture_logs(backend = "tracing", target = "macro_tracing_scope", level = "info")]
#[test]
fn the_attribute_drives_the_tracing_backend() {
    tracing::info!(target: "macro_tracing_scope", "captured");
    tracing::debug!(target: "macro_tracing_scope", "below the requested level");
    let messages: Vec<_> = captured_logs
        .records()
        .into_iter()
        .map(|record| record.message)
        .collect();
    assert_eq!(messages, ["captured"]);
}

#[capture_logs(target = "level_scope", level = "warn")]
#[test]
#[serial(log_router)]
fn level_restriction_applies_to_the_capture() {
    log::info!(target: "level_scope", "too quiet");
    log::error!(target: "level_scope", "loud");
    let messages: Vec<_> = captured_logs
        .records()
        .into_iter()
        .map(|record| record.message)
        .collect();
    assert_eq!(messages, ["loud"]);
}

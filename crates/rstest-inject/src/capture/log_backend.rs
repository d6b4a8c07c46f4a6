//! Capture backend for the `log` facade.
//!
//! The backend installs a process-global router as the `log` logger. The
//! router keeps a tree of logger scopes over `log` target prefixes, each
//! scope owning a sink list and a propagation flag, so swapping a scope's
//! sinks for a capturing sink mirrors hierarchical logger configuration.
//! Installation can fail when the host already claimed the global logger;
//! that is reported as backend unavailability, not an error.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use log::{LevelFilter, Log, Metadata, Record};

use hashbrown::HashMap;

use super::buffer::{CaptureBuffer, CaptureLevel, CapturedRecord};
use super::{BackendRegistration, CaptureBackend, CaptureGuard, CaptureRequest, RestoreFn};
use crate::errors::InjectError;

/// Destination for forwarded or replayed records.
pub trait LogSink: Send + Sync {
    /// Minimum severity this sink accepts.
    fn threshold(&self) -> CaptureLevel {
        CaptureLevel::Trace
    }

    /// Deliver one record.
    fn emit(&self, record: &CapturedRecord);
}

#[derive(Clone)]
struct ScopeConfig {
    sinks: Vec<Arc<dyn LogSink>>,
    propagate: bool,
    level: CaptureLevel,
    capturing: bool,
}

impl ScopeConfig {
    fn root() -> Self {
        Self {
            sinks: Vec::new(),
            propagate: false,
            level: CaptureLevel::Trace,
            capturing: false,
        }
    }
}

struct RouterState {
    scopes: HashMap<String, ScopeConfig>,
}

impl RouterState {
    fn new() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(String::new(), ScopeConfig::root());
        Self { scopes }
    }
}

/// Walk one step outward in the scope tree; the root scope is `""`.
fn parent_target(target: &str) -> Option<&str> {
    target
        .rsplit_once("::")
        .map(|(head, _)| head)
        .or_else(|| (!target.is_empty()).then_some(""))
}

fn route(state: &RouterState, level: CaptureLevel, target: &str) -> Vec<Arc<dyn LogSink>> {
    let mut matched = Vec::new();
    let mut current = Some(target);
    while let Some(scope_name) = current {
        if let Some(scope) = state.scopes.get(scope_name) {
            if level <= scope.level {
                matched.extend(
                    scope
                        .sinks
                        .iter()
                        .filter(|sink| level <= sink.threshold())
                        .cloned(),
                );
            }
            if !scope.propagate {
                return matched;
            }
        }
        current = parent_target(scope_name);
    }
    matched
}

struct RouterLogger {
    state: RwLock<RouterState>,
}

impl RouterLogger {
    fn new() -> Self {
        Self {
            state: RwLock::new(RouterState::new()),
        }
    }

    fn sinks_for(&self, level: CaptureLevel, target: &str) -> Vec<Arc<dyn LogSink>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        route(&state, level, target)
    }
}

impl Log for RouterLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let captured = CapturedRecord::new(
            record.level().into(),
            record.target().to_owned(),
            record.args().to_string(),
        );
        // Sinks are collected under the lock and emitted outside it, so a
        // sink that logs cannot deadlock the router.
        for sink in self.sinks_for(captured.level, &captured.target) {
            sink.emit(&captured);
        }
    }

    fn flush(&self) {}
}

fn router() -> Result<&'static RouterLogger, InjectError> {
    static ROUTER: OnceLock<RouterLogger> = OnceLock::new();
    static INSTALLED: OnceLock<bool> = OnceLock::new();
    let router = ROUTER.get_or_init(RouterLogger::new);
    let installed = *INSTALLED.get_or_init(|| {
        let claimed = log::set_logger(router).is_ok();
        if claimed {
            log::set_max_level(LevelFilter::Trace);
        }
        claimed
    });
    if installed {
        Ok(router)
    } else {
        Err(InjectError::BackendUnavailable {
            name: String::from("log"),
        })
    }
}

/// Replace the sinks attached to the root scope.
///
/// These are the "original destinations" that records reach outside any
/// capture, and that failed-test records are replayed through.
///
/// # Errors
///
/// Fails when the `log` backend is unavailable.
pub fn set_root_sinks(sinks: Vec<Arc<dyn LogSink>>) -> Result<(), InjectError> {
    let router = router()?;
    let mut state = router.state.write().unwrap_or_else(PoisonError::into_inner);
    state
        .scopes
        .entry(String::new())
        .or_insert_with(ScopeConfig::root)
        .sinks = sinks;
    Ok(())
}

struct BufferSink {
    buffer: Arc<CaptureBuffer>,
}

impl LogSink for BufferSink {
    fn emit(&self, record: &CapturedRecord) {
        self.buffer.push(record.clone());
    }
}

/// Capture backend driving the `log` facade.
pub struct LogCaptureBackend;

impl LogCaptureBackend {
    fn install_scope(
        request: &CaptureRequest,
        capturing: bool,
    ) -> Result<CaptureGuard, InjectError> {
        let router = router()?;
        let buffer = Arc::new(CaptureBuffer::new());
        let target = request.target().to_owned();
        let previous = {
            let mut state = router.state.write().unwrap_or_else(PoisonError::into_inner);
            let previous = state.scopes.get(&target).cloned();
            if previous.as_ref().is_some_and(|scope| scope.capturing) {
                return Err(InjectError::config(format!(
                    "a capturing sink is already attached to logger scope '{target}'"
                )));
            }
            let sinks: Vec<Arc<dyn LogSink>> = if capturing {
                vec![Arc::new(BufferSink {
                    buffer: Arc::clone(&buffer),
                })]
            } else {
                Vec::new()
            };
            state.scopes.insert(
                target.clone(),
                ScopeConfig {
                    sinks,
                    propagate: false,
                    level: request.level(),
                    capturing,
                },
            );
            previous
        };
        let restore: RestoreFn = Box::new(move |failed, records| {
            // Restoring the scope and planning the replay happen under one
            // write lock; emission happens after it is released.
            let replay = {
                let mut state = router.state.write().unwrap_or_else(PoisonError::into_inner);
                match previous {
                    Some(config) => {
                        state.scopes.insert(target, config);
                    }
                    None => {
                        state.scopes.remove(&target);
                    }
                }
                if failed {
                    records
                        .snapshot()
                        .into_iter()
                        .flat_map(|record| {
                            route(&state, record.level, &record.target)
                                .into_iter()
                                .map(move |sink| (sink, record.clone()))
                        })
                        .collect()
                } else {
                    Vec::new()
                }
            };
            for (sink, record) in replay {
                sink.emit(&record);
            }
        });
        Ok(CaptureGuard::new(buffer, restore))
    }
}

impl CaptureBackend for LogCaptureBackend {
    fn name(&self) -> &'static str {
        "log"
    }

    fn probe(&self) -> Result<(), InjectError> {
        let guard = Self::install_scope(
            &CaptureRequest::new("rstest_inject::capture::probe"),
            false,
        )?;
        drop(guard);
        Ok(())
    }

    fn start_capture(&self, request: &CaptureRequest) -> Result<CaptureGuard, InjectError> {
        Self::install_scope(request, true)
    }

    fn disable(&self, request: &CaptureRequest) -> Result<CaptureGuard, InjectError> {
        Self::install_scope(request, false)
    }
}

inventory::submit! {
    BackendRegistration { backend: &LogCaptureBackend }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serial_test::serial;

    use super::{LogCaptureBackend, LogSink, set_root_sinks};
    use crate::capture::{CaptureBackend, CaptureBuffer, CaptureLevel, CaptureRequest, CapturedRecord};

    struct RecordingSink {
        buffer: Arc<CaptureBuffer>,
    }

    impl LogSink for RecordingSink {
        fn emit(&self, record: &CapturedRecord) {
            self.buffer.push(record.clone());
        }
    }

    struct ThresholdSink {
        buffer: Arc<CaptureBuffer>,
        threshold: CaptureLevel,
    }

    impl LogSink for ThresholdSink {
        fn threshold(&self) -> CaptureLevel {
            self.threshold
        }

        fn emit(&self, record: &CapturedRecord) {
            self.buffer.push(record.clone());
        }
    }

    fn install_recording_root() -> Arc<CaptureBuffer> {
        let buffer = Arc::new(CaptureBuffer::new());
        let sink = Arc::new(RecordingSink {
            buffer: Arc::clone(&buffer),
        });
        set_root_sinks(vec![sink]).unwrap_or_else(|err| panic!("root sinks: {err}"));
        buffer
    }

    fn messages_for(buffer: &CaptureBuffer, scope: &str) -> Vec<String> {
        buffer
            .snapshot()
            .into_iter()
            .filter(|rec| crate::capture::scope_matches(&rec.target, scope))
            .map(|rec| rec.message)
            .collect()
    }

    #[test]
    #[serial(log_router)]
    fn capture_buffers_matching_records_and_blocks_propagation() {
        let root = install_recording_root();
        let guard = LogCaptureBackend
            .start_capture(&CaptureRequest::new("scope_one"))
            .unwrap_or_else(|err| panic!("start: {err}"));
        log::info!(target: "scope_one::inner", "captured message");
        log::info!(target: "elsewhere_one", "uncaptured message");
        let captured: Vec<_> = guard.records().into_iter().map(|r| r.message).collect();
        assert_eq!(captured, ["captured message"]);
        assert_eq!(
            messages_for(&root, "elsewhere_one"),
            ["uncaptured message"]
        );
        assert!(messages_for(&root, "scope_one").is_empty());
        drop(guard);
        set_root_sinks(Vec::new()).unwrap_or_else(|err| panic!("reset: {err}"));
    }

    #[test]
    #[serial(log_router)]
    fn successful_tests_replay_nothing() {
        let root = install_recording_root();
        {
            let _guard = LogCaptureBackend
                .start_capture(&CaptureRequest::new("scope_two"))
                .unwrap_or_else(|err| panic!("start: {err}"));
            log::warn!(target: "scope_two", "buffered only");
        }
        assert!(messages_for(&root, "scope_two").is_empty());
        set_root_sinks(Vec::new()).unwrap_or_else(|err| panic!("reset: {err}"));
    }

    #[test]
    #[serial(log_router)]
    fn failed_tests_replay_in_logged_order() {
        let root = install_recording_root();
        {
            let guard = LogCaptureBackend
                .start_capture(&CaptureRequest::new("scope_three"))
                .unwrap_or_else(|err| panic!("start: {err}"));
            log::info!(target: "scope_three", "first");
            log::error!(target: "scope_three", "second");
            guard.mark_failed();
        }
        assert_eq!(messages_for(&root, "scope_three"), ["first", "second"]);
        set_root_sinks(Vec::new()).unwrap_or_else(|err| panic!("reset: {err}"));
    }

    #[test]
    #[serial(log_router)]
    fn replay_is_filtered_by_the_destination_threshold() {
        let buffer = Arc::new(CaptureBuffer::new());
        let sink = Arc::new(ThresholdSink {
            buffer: Arc::clone(&buffer),
            threshold: CaptureLevel::Warn,
        });
        set_root_sinks(vec![sink]).unwrap_or_else(|err| panic!("root sinks: {err}"));
        {
            let guard = LogCaptureBackend
                .start_capture(&CaptureRequest::new("scope_four"))
                .unwrap_or_else(|err| panic!("start: {err}"));
            log::info!(target: "scope_four", "too quiet");
            log::error!(target: "scope_four", "loud enough");
            guard.mark_failed();
        }
        assert_eq!(messages_for(&buffer, "scope_four"), ["loud enough"]);
        set_root_sinks(Vec::new()).unwrap_or_else(|err| panic!("reset: {err}"));
    }

    #[test]
    #[serial(log_router)]
    fn second_capture_of_one_scope_is_rejected() {
        let guard = LogCaptureBackend
            .start_capture(&CaptureRequest::new("scope_five"))
            .unwrap_or_else(|err| panic!("start: {err}"));
        let second = LogCaptureBackend.start_capture(&CaptureRequest::new("scope_five"));
        let message = second.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("scope_five"), "got: {message}");
        drop(guard);
    }

    #[test]
    #[serial(log_router)]
    fn disable_suppresses_without_capturing() {
        let root = install_recording_root();
        {
            let guard = LogCaptureBackend
                .disable(&CaptureRequest::new("scope_six"))
                .unwrap_or_else(|err| panic!("disable: {err}"));
            log::info!(target: "scope_six", "dropped");
            assert!(guard.records().is_empty());
        }
        assert!(messages_for(&root, "scope_six").is_empty());
        set_root_sinks(Vec::new()).unwrap_or_else(|err| panic!("reset: {err}"));
    }

    #[test]
    #[serial(log_router)]
    fn level_restriction_filters_the_capture() {
        let guard = LogCaptureBackend
            .start_capture(&CaptureRequest::new("scope_seven").with_level(CaptureLevel::Warn))
            .unwrap_or_else(|err| panic!("start: {err}"));
        log::debug!(target: "scope_seven", "below threshold");
        log::error!(target: "scope_seven", "above threshold");
        let captured: Vec<_> = guard.records().into_iter().map(|r| r.message).collect();
        assert_eq!(captured, ["above threshold"]);
        drop(guard);
    }
}

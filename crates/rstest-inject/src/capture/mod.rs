//! Log-capture backends and their registry.
//!
//! A capture backend swaps a capturing sink into one logging framework for
//! the duration of a test and hands back a [`CaptureGuard`]. Dropping the
//! guard restores the original configuration on every exit path; when the
//! guard was marked failed first, the buffered records are replayed through
//! the restored destinations so the output of a failing test is not lost.
//!
//! Backends are compiled in behind cargo features and register themselves
//! with [`inventory`]. The [`registry`] probes each backend once, at first
//! use; a backend that reports itself unavailable is skipped for the whole
//! run rather than treated as an error.

use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use crate::errors::InjectError;

mod buffer;
#[cfg(feature = "capture-log")]
pub mod log_backend;
#[cfg(feature = "capture-tracing")]
pub mod tracing_backend;

pub use buffer::{CaptureBuffer, CaptureLevel, CapturedRecord};

/// Instruction for starting a capture or suppression scope.
#[derive(Clone, Debug)]
pub struct CaptureRequest {
    target: String,
    level: CaptureLevel,
}

impl CaptureRequest {
    /// Capture the given logger scope (a target prefix; empty for the root).
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            level: CaptureLevel::Trace,
        }
    }

    /// Restrict the capture to records at or above `level`.
    #[must_use]
    pub fn with_level(mut self, level: CaptureLevel) -> Self {
        self.level = level;
        self
    }

    /// The requested logger scope.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The requested minimum severity.
    #[must_use]
    pub fn level(&self) -> CaptureLevel {
        self.level
    }
}

pub(crate) type RestoreFn = Box<dyn FnOnce(bool, &CaptureBuffer)>;

/// Restoration handle returned by [`CaptureBackend::start_capture`].
///
/// Dropping the guard restores the original logging configuration in one
/// step. When [`CaptureGuard::mark_failed`] was called beforehand, every
/// buffered record is replayed through the restored destinations, filtered
/// by their effective level.
pub struct CaptureGuard {
    buffer: Arc<CaptureBuffer>,
    failed: AtomicBool,
    restore: Option<RestoreFn>,
}

impl CaptureGuard {
    /// Construct a guard around a buffer and a restoration action.
    #[must_use]
    pub(crate) fn new(buffer: Arc<CaptureBuffer>, restore: RestoreFn) -> Self {
        Self {
            buffer,
            failed: AtomicBool::new(false),
            restore: Some(restore),
        }
    }

    /// Copy the records captured so far, in the order they were logged.
    #[must_use]
    pub fn records(&self) -> Vec<CapturedRecord> {
        self.buffer.snapshot()
    }

    /// Discard the records captured so far. Idempotent.
    pub fn clear_records(&self) {
        self.buffer.clear();
    }

    /// Shared handle to the underlying buffer, for assertions from other
    /// threads.
    #[must_use]
    pub fn buffer(&self) -> Arc<CaptureBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Mark the surrounding test as failed, requesting replay on restore.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore(self.failed.load(Ordering::SeqCst), &self.buffer);
        }
    }
}

/// Contract implemented by each log-capture backend.
pub trait CaptureBackend: Send + Sync {
    /// Stable name used to select the backend, e.g. `log` or `tracing`.
    fn name(&self) -> &'static str;

    /// Attempt a no-op start/stop cycle to verify the backend can operate.
    ///
    /// # Errors
    ///
    /// [`InjectError::BackendUnavailable`] means the backend cannot operate
    /// in this environment and is skipped; any other error propagates.
    fn probe(&self) -> Result<(), InjectError>;

    /// Swap a capturing sink into the requested logger scope.
    ///
    /// # Errors
    ///
    /// Fails when the backend is unavailable or a capture is already active
    /// for the scope.
    fn start_capture(&self, request: &CaptureRequest) -> Result<CaptureGuard, InjectError>;

    /// Suppress output for the requested logger scope without capturing.
    ///
    /// # Errors
    ///
    /// Same conditions as [`CaptureBackend::start_capture`].
    fn disable(&self, request: &CaptureRequest) -> Result<CaptureGuard, InjectError>;
}

/// Entry submitted by each compiled-in backend.
pub struct BackendRegistration {
    /// The backend instance.
    pub backend: &'static dyn CaptureBackend,
}

inventory::collect!(BackendRegistration);

#[derive(Debug, Clone)]
enum ProbeStatus {
    Available,
    Unavailable,
    Failed(String),
}

struct ProbedBackend {
    backend: &'static dyn CaptureBackend,
    status: ProbeStatus,
}

/// Registry of compiled-in capture backends, probed once at first use.
pub struct CaptureRegistry {
    backends: Vec<ProbedBackend>,
}

static REGISTRY: LazyLock<CaptureRegistry> = LazyLock::new(|| {
    let backends = inventory::iter::<BackendRegistration>
        .into_iter()
        .map(|registration| {
            let status = match registration.backend.probe() {
                Ok(()) => ProbeStatus::Available,
                Err(InjectError::BackendUnavailable { .. }) => {
                    log::debug!(
                        "capture backend '{}' is not operational here; skipping",
                        registration.backend.name()
                    );
                    ProbeStatus::Unavailable
                }
                Err(other) => ProbeStatus::Failed(other.to_string()),
            };
            ProbedBackend {
                backend: registration.backend,
                status,
            }
        })
        .collect();
    CaptureRegistry { backends }
});

/// The process-wide backend registry.
#[must_use]
pub fn registry() -> &'static CaptureRegistry {
    &REGISTRY
}

impl CaptureRegistry {
    /// Names of the backends whose probe succeeded.
    #[must_use]
    pub fn available(&self) -> Vec<&'static str> {
        self.backends
            .iter()
            .filter(|probed| matches!(probed.status, ProbeStatus::Available))
            .map(|probed| probed.backend.name())
            .collect()
    }

    /// Look up an operational backend by name.
    ///
    /// # Errors
    ///
    /// [`InjectError::BackendUnavailable`] for unknown or probe-rejected
    /// names; a probe failure other than unavailability is surfaced as the
    /// configuration error it produced.
    pub fn get(&self, name: &str) -> Result<&'static dyn CaptureBackend, InjectError> {
        let probed = self
            .backends
            .iter()
            .find(|probed| probed.backend.name() == name)
            .ok_or_else(|| InjectError::BackendUnavailable {
                name: name.to_owned(),
            })?;
        match &probed.status {
            ProbeStatus::Available => Ok(probed.backend),
            ProbeStatus::Unavailable => Err(InjectError::BackendUnavailable {
                name: name.to_owned(),
            }),
            ProbeStatus::Failed(message) => Err(InjectError::config(message.clone())),
        }
    }
}

/// Return `true` when `target` falls inside the logger scope `scope`.
///
/// The empty scope matches everything; otherwise the target must equal the
/// scope or continue it with a `::` path segment.
#[must_use]
pub fn scope_matches(target: &str, scope: &str) -> bool {
    if scope.is_empty() {
        return true;
    }
    target
        .strip_prefix(scope)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

/// Run `body` under a capture (or suppression) scope, marking the guard
/// failed when the body panics so the captured records are replayed.
///
/// The panic is rethrown after restoration. This is the runtime behind the
/// `#[capture_logs]` attribute; the guard is passed to the body for
/// in-test assertions.
///
/// # Errors
///
/// Fails when the backend is unknown, unavailable, or already capturing the
/// requested scope.
pub fn run_guarded<R>(
    backend: &str,
    request: &CaptureRequest,
    disable: bool,
    body: impl FnOnce(&CaptureGuard) -> R,
) -> Result<R, InjectError> {
    let backend = registry().get(backend)?;
    let guard = if disable {
        backend.disable(request)?
    } else {
        backend.start_capture(request)?
    };
    match catch_unwind(AssertUnwindSafe(|| body(&guard))) {
        Ok(value) => {
            drop(guard);
            Ok(value)
        }
        Err(payload) => {
            guard.mark_failed();
            drop(guard);
            resume_unwind(payload)
        }
    }
}

//! Capture backend for the `tracing` dispatcher.
//!
//! Capture installs a thread-scoped collector with
//! `tracing::subscriber::set_default`; the returned guard is the structured
//! restore point, so the previous dispatcher comes back on every exit path.
//! Events inside the requested scope are buffered (or dropped when
//! suppressing); everything else is delegated to the previous dispatcher
//! unchanged. Replay after a failed test re-emits the buffered records
//! through the restored dispatcher, which applies its own filtering.

use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::span;
use tracing::subscriber::{DefaultGuard, Interest, set_default};
use tracing::{Dispatch, Event, Level, Metadata, Subscriber};

use super::buffer::{CaptureBuffer, CaptureLevel, CapturedRecord};
use super::{
    BackendRegistration, CaptureBackend, CaptureGuard, CaptureRequest, RestoreFn, scope_matches,
};
use crate::errors::InjectError;

impl From<Level> for CaptureLevel {
    fn from(level: Level) -> Self {
        if level == Level::ERROR {
            Self::Error
        } else if level == Level::WARN {
            Self::Warn
        } else if level == Level::INFO {
            Self::Info
        } else if level == Level::DEBUG {
            Self::Debug
        } else {
            Self::Trace
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

struct CaptureCollector {
    buffer: Arc<CaptureBuffer>,
    target: String,
    level: CaptureLevel,
    capturing: bool,
    parent: Dispatch,
}

impl CaptureCollector {
    fn claims(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event()
            && scope_matches(metadata.target(), &self.target)
            && CaptureLevel::from(*metadata.level()) <= self.level
    }
}

impl Subscriber for CaptureCollector {
    fn register_callsite(&self, _metadata: &'static Metadata<'static>) -> Interest {
        // Interest is cached per callsite; keep it undecided so `enabled`
        // is consulted while a capture is active.
        Interest::sometimes()
    }

    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.claims(metadata) || self.parent.enabled(metadata)
    }

    fn new_span(&self, attrs: &span::Attributes<'_>) -> span::Id {
        self.parent.new_span(attrs)
    }

    fn record(&self, id: &span::Id, values: &span::Record<'_>) {
        self.parent.record(id, values);
    }

    fn record_follows_from(&self, id: &span::Id, follows: &span::Id) {
        self.parent.record_follows_from(id, follows);
    }

    fn event(&self, event: &Event<'_>) {
        if self.claims(event.metadata()) {
            if self.capturing {
                let mut visitor = MessageVisitor::default();
                event.record(&mut visitor);
                self.buffer.push(CapturedRecord::new(
                    CaptureLevel::from(*event.metadata().level()),
                    event.metadata().target().to_owned(),
                    visitor.message,
                ));
            }
            return;
        }
        self.parent.event(event);
    }

    fn enter(&self, id: &span::Id) {
        self.parent.enter(id);
    }

    fn exit(&self, id: &span::Id) {
        self.parent.exit(id);
    }
}

fn replay(record: &CapturedRecord) {
    match record.level {
        CaptureLevel::Error => tracing::error!(
            target: "rstest_inject::capture::replay",
            original_target = %record.target,
            "{}",
            record.message
        ),
        CaptureLevel::Warn => tracing::warn!(
            target: "rstest_inject::capture::replay",
            original_target = %record.target,
            "{}",
            record.message
        ),
        CaptureLevel::Info => tracing::info!(
            target: "rstest_inject::capture::replay",
            original_target = %record.target,
            "{}",
            record.message
        ),
        CaptureLevel::Debug => tracing::debug!(
            target: "rstest_inject::capture::replay",
            original_target = %record.target,
            "{}",
            record.message
        ),
        CaptureLevel::Trace => tracing::trace!(
            target: "rstest_inject::capture::replay",
            original_target = %record.target,
            "{}",
            record.message
        ),
    }
}

fn install(request: &CaptureRequest, capturing: bool) -> CaptureGuard {
    let buffer = Arc::new(CaptureBuffer::new());
    let parent = tracing::dispatcher::get_default(Dispatch::clone);
    let collector = CaptureCollector {
        buffer: Arc::clone(&buffer),
        target: request.target().to_owned(),
        level: request.level(),
        capturing,
        parent,
    };
    let default_guard: DefaultGuard = set_default(collector);
    let restore: RestoreFn = Box::new(move |failed, records| {
        // Dropping the thread-default guard reinstates the previous
        // dispatcher; replayed events go through it and its filters.
        drop(default_guard);
        if failed {
            for record in records.snapshot() {
                replay(&record);
            }
        }
    });
    CaptureGuard::new(buffer, restore)
}

/// Capture backend driving the `tracing` dispatcher.
pub struct TracingCaptureBackend;

impl CaptureBackend for TracingCaptureBackend {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn probe(&self) -> Result<(), InjectError> {
        let guard = install(&CaptureRequest::new("rstest_inject::capture::probe"), false);
        drop(guard);
        Ok(())
    }

    fn start_capture(&self, request: &CaptureRequest) -> Result<CaptureGuard, InjectError> {
        Ok(install(request, true))
    }

    fn disable(&self, request: &CaptureRequest) -> Result<CaptureGuard, InjectError> {
        Ok(install(request, false))
    }
}

inventory::submit! {
    BackendRegistration { backend: &TracingCaptureBackend }
}

//! Named spans for plugin operations.

use std::time::Instant;

use tracing::{Level, Span, field, span};

use crate::lazy::TriggerKind;

/// Span around one plugin operation that records its duration and outcome.
pub struct OperationSpan {
    span: Span,
    start: Instant,
}

impl OperationSpan {
    fn new(span: Span) -> Self {
        Self {
            span,
            start: Instant::now(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn finish(self, success: bool) {
        let duration_ms = self.start.elapsed().as_millis() as u64;
        self.span.record("duration_ms", duration_ms);
        self.span.record("success", success);
    }
}

pub fn install_span(url: &str) -> OperationSpan {
    OperationSpan::new(span!(
        Level::DEBUG,
        "plugin.install",
        url = url,
        success = field::Empty,
        duration_ms = field::Empty,
    ))
}

pub fn update_span(url: &str) -> OperationSpan {
    OperationSpan::new(span!(
        Level::DEBUG,
        "plugin.update",
        url = url,
        success = field::Empty,
        duration_ms = field::Empty,
    ))
}

pub fn load_span(url: &str, trigger: TriggerKind) -> OperationSpan {
    OperationSpan::new(span!(
        Level::INFO,
        "plugin.load",
        url = url,
        trigger = %trigger,
        success = field::Empty,
        duration_ms = field::Empty,
    ))
}

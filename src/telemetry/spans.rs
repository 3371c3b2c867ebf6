//! Request spans and result recording.

use tracing::{info_span, Span};

/// Extension trait for recording an operation's outcome on its span.
pub trait SpanExt {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for standardized request spans.
pub struct RequestSpan;

impl RequestSpan {
    /// Span for one boundary request.
    ///
    /// `status`, `error.message` and `latency_ms` start empty and are filled
    /// in when the request completes.
    pub fn new(request_id: &str, operation: &str) -> Span {
        info_span!(
            "request",
            request_id = %request_id,
            operation = %operation,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}

//! Telemetry for the model server.
//!
//! Structured logging through `tracing`, request spans, and counters and
//! histograms through the `metrics` facade. The crate installs no metrics
//! exporter; embedders pick their own recorder.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    describe_metrics, record_adapter_fallback, record_model_load, record_prediction,
    ADAPTER_FALLBACKS_TOTAL, MODEL_LOADS_TOTAL, PREDICTIONS_TOTAL, PREDICTION_LATENCY_SECONDS,
};
pub use spans::{RequestSpan, SpanExt};

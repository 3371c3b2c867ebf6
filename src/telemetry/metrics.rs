//! Metric names and recording helpers.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

pub const PREDICTIONS_TOTAL: &str = "scaudit_predictions_total";
pub const PREDICTION_LATENCY_SECONDS: &str = "scaudit_prediction_latency_seconds";
pub const MODEL_LOADS_TOTAL: &str = "scaudit_model_loads_total";
pub const ADAPTER_FALLBACKS_TOTAL: &str = "scaudit_adapter_fallbacks_total";

/// Register descriptions with whatever recorder is installed.
pub fn describe_metrics() {
    describe_counter!(PREDICTIONS_TOTAL, Unit::Count, "Predictions served, by outcome");
    describe_histogram!(
        PREDICTION_LATENCY_SECONDS,
        Unit::Seconds,
        "Time spent inside the model for one prediction"
    );
    describe_counter!(MODEL_LOADS_TOTAL, Unit::Count, "Model load attempts, by outcome");
    describe_counter!(
        ADAPTER_FALLBACKS_TOTAL,
        Unit::Count,
        "Loads that fell back to the base model after an adapter failure"
    );
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

pub fn record_prediction(ok: bool, latency: Option<Duration>) {
    counter!(PREDICTIONS_TOTAL, "outcome" => outcome(ok)).increment(1);
    if let Some(latency) = latency {
        histogram!(PREDICTION_LATENCY_SECONDS).record(latency.as_secs_f64());
    }
}

pub fn record_model_load(ok: bool) {
    counter!(MODEL_LOADS_TOTAL, "outcome" => outcome(ok)).increment(1);
}

pub fn record_adapter_fallback() {
    counter!(ADAPTER_FALLBACKS_TOTAL).increment(1);
}

//! Prediction input types and validation.
//!
//! Out-of-range parameters are rejected before they reach the tokenizer.

use super::error::InferenceError;

/// Default inclusive probability cut-off for reporting a label.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Default truncation length in tokens.
pub const DEFAULT_MAX_LENGTH: usize = 512;

/// Upper bound on the truncation length a caller may request.
pub const MAX_SEQUENCE_LENGTH: usize = 8192;

/// Maximum text input size in bytes (1 MiB).
pub const MAX_TEXT_BYTES: usize = 1 << 20;

/// Per-call prediction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictParams {
    /// Inclusive threshold in `[0, 1]`.
    pub threshold: f32,
    /// Tokens kept after truncation.
    pub max_length: usize,
}

impl Default for PredictParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl PredictParams {
    pub fn new(threshold: f32, max_length: usize) -> Self {
        Self { threshold, max_length }
    }

    /// Validate parameter ranges. Returns error on invalid values.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(InferenceError::InputValidation(format!(
                "threshold must be between 0.0 and 1.0, got {}",
                self.threshold
            )));
        }
        if self.max_length == 0 || self.max_length > MAX_SEQUENCE_LENGTH {
            return Err(InferenceError::InputValidation(format!(
                "max_length must be in 1..={}, got {}",
                MAX_SEQUENCE_LENGTH, self.max_length
            )));
        }
        Ok(())
    }
}

/// Reject text that is empty, whitespace-only, or oversized.
pub fn validate_text(text: &str) -> Result<(), InferenceError> {
    if text.trim().is_empty() {
        return Err(InferenceError::InputValidation("text is empty".into()));
    }
    if text.len() > MAX_TEXT_BYTES {
        return Err(InferenceError::InputValidation(format!(
            "text exceeds maximum size: {} > {} bytes",
            text.len(),
            MAX_TEXT_BYTES
        )));
    }
    Ok(())
}

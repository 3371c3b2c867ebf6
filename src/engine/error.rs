//! Inference backend error types.
//!
//! Backends report failures through [`InferenceError`]; the model server decides
//! which of them are fatal to a load and which are downgraded to warnings.

use thiserror::Error;

/// Errors raised by a model backend while loading or running a model.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model config error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Input validation failed: {0}")]
    InputValidation(String),

    #[error("Output shape mismatch: expected {expected} logits, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<candle_core::Error> for InferenceError {
    fn from(e: candle_core::Error) -> Self {
        Self::ModelError(e.to_string())
    }
}

impl InferenceError {
    /// Returns true if the failure came from adapter composition.
    pub fn is_adapter(&self) -> bool {
        matches!(self, Self::Adapter(_))
    }

    /// Returns true if the caller sent bad input rather than the model failing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InputValidation(_))
    }
}

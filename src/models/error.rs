//! Model server error taxonomy.

use thiserror::Error;

use crate::engine::InferenceError;

/// Failures surfaced by [`ModelServer`](super::ModelServer) operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServeError {
    /// Config, base model, tokenizer or device binding failed. The previously
    /// installed model, if any, is still serving.
    #[error("load failed: {0}")]
    LoadFailed(String),

    /// Adapter composition failed. Downgraded to a warning during a load.
    #[error("adapter failed: {0}")]
    AdapterFailed(String),

    #[error("Model not loaded: {0}")]
    NotLoaded(String),

    #[error("prediction failed: {0}")]
    PredictionFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ServeError {
    /// The bare message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::LoadFailed(m)
            | Self::AdapterFailed(m)
            | Self::NotLoaded(m)
            | Self::PredictionFailed(m)
            | Self::InvalidInput(m) => m,
        }
    }

    /// Returns true if the caller sent bad input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Classify a backend failure raised while serving a prediction.
    pub(crate) fn from_prediction(err: InferenceError) -> Self {
        if err.is_client_error() {
            Self::InvalidInput(inner_message(err))
        } else {
            Self::PredictionFailed(err.to_string())
        }
    }
}

fn inner_message(err: InferenceError) -> String {
    match err {
        InferenceError::InputValidation(m) => m,
        other => other.to_string(),
    }
}

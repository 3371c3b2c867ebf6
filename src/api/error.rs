//! Boundary error classes.

use thiserror::Error;

use crate::models::ServeError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Caller error (400).
    #[error("{0}")]
    BadRequest(String),

    /// Model or server failure (500).
    #[error("{0}")]
    Internal(String),

    /// Shutting down (503).
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    /// HTTP-style status code.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Internal(_) => 500,
            Self::Unavailable(_) => 503,
        }
    }

    pub(crate) fn shutting_down() -> Self {
        Self::Unavailable("server is shutting down".into())
    }

    /// A failed reload, reported with the load failure message.
    pub(crate) fn reload_failed(err: ServeError) -> Self {
        Self::Internal(format!("reload failed: {}", err.message()))
    }
}

impl From<ServeError> for ApiError {
    fn from(err: ServeError) -> Self {
        if err.is_client_error() {
            Self::BadRequest(err.message().to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("worker task failed: {}", err))
    }
}

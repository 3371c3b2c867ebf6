//! Request boundary.
//!
//! Typed requests and responses, an async handler that runs the blocking
//! model server on tokio's blocking pool, and a line-delimited JSON serve
//! loop. HTTP routing is left to the embedder; [`ApiError::status`] gives the
//! status code each failure maps to.

mod error;
mod handler;
mod serve;
mod types;

pub use error::ApiError;
pub use handler::ApiHandler;
pub use serve::{serve_lines, ServeSummary};
pub use types::{
    LabelsResponse, Operation, PredictRequest, ReloadRequest, ReloadResponse, WireRequest,
    WireResponse,
};

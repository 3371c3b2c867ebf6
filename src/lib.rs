//! SCAudit model server.
//!
//! Serves multi-label smart contract vulnerability predictions from a
//! fine-tuned sequence classifier, with hot-reload of the base model and
//! its LoRA adapter.
//!
//! - [`models::ModelServer`] owns the model lifecycle: load, reload,
//!   predict, status, teardown. Every load and prediction runs under one
//!   lock, and a failed reload never replaces a working model.
//! - [`engine`] holds the backend seam, the candle implementation and the
//!   sigmoid/threshold prediction pipeline.
//! - [`labels`] is the fixed, ordered set of seven vulnerability classes.
//! - [`api`] is the async request boundary used by `scaudit-cli serve`.

pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod health;
pub mod labels;
pub mod models;
pub mod shutdown;
pub mod telemetry;

pub use api::{ApiError, ApiHandler};
pub use config::ServeConfig;
pub use engine::{CandleBackend, ModelBackend, PredictParams, Prediction};
pub use labels::{LabelSet, LABELS};
pub use models::{ModelServer, ServeError, StatusSnapshot};

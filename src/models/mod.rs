//! Model lifecycle: loading, hot-reload, prediction and status.

mod error;
mod loader;
mod server;
mod status;

pub use error::ServeError;
pub use loader::{LoadReport, LoadResult};
pub use server::ModelServer;
pub use status::StatusSnapshot;

//! `serve`: line-delimited JSON over stdin/stdout.

use std::sync::Arc;

use tokio::io::BufReader;

use super::exit;
use crate::api::{serve_lines, ApiHandler};
use crate::config::ServeConfig;
use crate::engine::CandleBackend;
use crate::models::ModelServer;
use crate::shutdown::ShutdownResult;

/// Load the model, answer requests until EOF or Ctrl-C, then drain and
/// release the model.
pub async fn run_serve(config: &ServeConfig) -> i32 {
    let server = Arc::new(ModelServer::<CandleBackend>::from_config(config));
    let handler = Arc::new(ApiHandler::new(server, config.predict));

    let status = handler.startup().await;
    tracing::info!(loaded = status.loaded, device = %status.device, "serving on stdin/stdout");

    let stop = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let served = serve_lines(
        handler.clone(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        stop,
    )
    .await;

    let drained = handler.shutdown(config.shutdown_timeout).await;

    match served {
        Ok(summary) => {
            tracing::info!(
                requests = summary.requests,
                failures = summary.failures,
                clean = (drained == ShutdownResult::Complete),
                "serve loop finished"
            );
            exit::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "serve loop failed");
            exit::FAILURE
        }
    }
}

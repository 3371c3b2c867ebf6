//! Line-delimited JSON serving loop.
//!
//! Each input line is one [`WireRequest`]; each output line is one
//! [`WireResponse`]. Requests run concurrently, so responses can come back
//! out of order and are matched by `id`.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::handler::ApiHandler;
use super::types::{WireRequest, WireResponse};
use crate::engine::ModelBackend;

/// Counts reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub requests: usize,
    pub failures: usize,
}

/// Serve requests from `input` until EOF or until `stop` resolves, writing
/// responses to `output`. All accepted requests are answered before return.
pub async fn serve_lines<B, R, W, S>(
    handler: Arc<ApiHandler<B>>,
    input: R,
    mut output: W,
    stop: S,
) -> std::io::Result<ServeSummary>
where
    B: ModelBackend + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: std::future::Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<WireResponse>();
    let mut tasks = JoinSet::new();
    let mut lines = input.lines();
    let mut summary = ServeSummary::default();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => {
                tracing::info!("stop requested; no longer reading requests");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                summary.requests += 1;
                match serde_json::from_str::<WireRequest>(&line) {
                    Ok(request) => {
                        let handler = handler.clone();
                        let tx = tx.clone();
                        tasks.spawn(async move {
                            let response = match handler.dispatch(request.operation).await {
                                Ok(result) => WireResponse::success(request.id, result),
                                Err(e) => WireResponse::failure(request.id, e.status(), e.to_string()),
                            };
                            let _ = tx.send(response);
                        });
                    }
                    Err(e) => {
                        let _ = tx.send(WireResponse::failure(
                            serde_json::Value::Null,
                            400,
                            format!("malformed request: {}", e),
                        ));
                    }
                }
            }
            Some(response) = rx.recv() => {
                write_response(&mut output, &response, &mut summary).await?;
            }
        }
    }

    drop(tx);
    while tasks.join_next().await.is_some() {}
    while let Some(response) = rx.recv().await {
        write_response(&mut output, &response, &mut summary).await?;
    }
    output.flush().await?;
    Ok(summary)
}

async fn write_response<W: AsyncWrite + Unpin>(
    output: &mut W,
    response: &WireResponse,
    summary: &mut ServeSummary,
) -> std::io::Result<()> {
    if !response.ok {
        summary.failures += 1;
    }
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await
}

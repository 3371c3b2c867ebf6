//! Async boundary over a blocking [`ModelServer`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use super::error::ApiError;
use super::types::{LabelsResponse, Operation, PredictRequest, ReloadRequest, ReloadResponse};
use crate::engine::{validate_text, ModelBackend, PredictParams, Prediction};
use crate::health::{HealthChecker, HealthReport};
use crate::models::{ModelServer, StatusSnapshot};
use crate::shutdown::{ShutdownCoordinator, ShutdownResult};
use crate::telemetry::{RequestSpan, SpanExt};

/// Dispatches boundary operations to a shared model server.
///
/// Every model call runs on the blocking pool; the handler itself never
/// blocks the async runtime.
pub struct ApiHandler<B: ModelBackend + 'static> {
    server: Arc<ModelServer<B>>,
    shutdown: Arc<ShutdownCoordinator>,
    health: HealthChecker,
    defaults: PredictParams,
}

impl<B: ModelBackend + 'static> ApiHandler<B> {
    pub fn new(server: Arc<ModelServer<B>>, defaults: PredictParams) -> Self {
        Self {
            server,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            health: HealthChecker::new(),
            defaults,
        }
    }

    pub fn server(&self) -> &Arc<ModelServer<B>> {
        &self.server
    }

    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Initial load. A failure is logged and recorded in status; the
    /// boundary keeps serving `status` and `health`.
    pub async fn startup(&self) -> StatusSnapshot {
        let server = self.server.clone();
        match tokio::task::spawn_blocking(move || server.load(None, None)).await {
            Ok(Ok(report)) => {
                tracing::info!(base = %report.base_path.display(), "startup load complete");
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "startup load failed; serving without a model"),
            Err(e) => tracing::error!(error = %e, "startup load task failed"),
        }
        self.server.status()
    }

    /// Stop admitting requests, drain in-flight ones, release the model.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        let result = self.shutdown.initiate(timeout).await;
        if let ShutdownResult::Timeout { remaining } = &result {
            tracing::warn!(remaining, "shutdown drain timed out");
        }
        let server = self.server.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || server.teardown()).await {
            tracing::warn!(error = %e, "model release failed");
        }
        tracing::info!("model resources released");
        result
    }

    pub fn status(&self) -> StatusSnapshot {
        self.server.status()
    }

    pub fn health(&self) -> HealthReport {
        self.health.report(&self.server.status(), self.shutdown.state())
    }

    pub fn labels(&self) -> LabelsResponse {
        LabelsResponse {
            labels: self.server.labels().texts(),
        }
    }

    pub async fn predict(&self, request: PredictRequest) -> Result<Prediction, ApiError> {
        let _guard = self.shutdown.track().ok_or_else(ApiError::shutting_down)?;

        validate_text(&request.text).map_err(|e| match e {
            crate::engine::InferenceError::InputValidation(m) => ApiError::BadRequest(m),
            other => ApiError::BadRequest(other.to_string()),
        })?;
        let params = request.params(self.defaults);
        params
            .validate()
            .map_err(|e| ApiError::from(crate::models::ServeError::from_prediction(e)))?;

        let server = self.server.clone();
        let text = request.text;
        let prediction =
            tokio::task::spawn_blocking(move || server.predict(&text, params)).await??;
        Ok(prediction)
    }

    pub async fn reload(&self, request: ReloadRequest) -> Result<ReloadResponse, ApiError> {
        let _guard = self.shutdown.track().ok_or_else(ApiError::shutting_down)?;

        let server = self.server.clone();
        let report = tokio::task::spawn_blocking(move || {
            server.load(request.base_path, request.adapter_path)
        })
        .await?
        .map_err(ApiError::reload_failed)?;

        Ok(ReloadResponse {
            status: "reloaded".to_string(),
            base: report.base_path,
            adapter: report.adapter_path,
        })
    }

    /// Run one operation inside a request span and serialize its result.
    pub async fn dispatch(&self, operation: Operation) -> Result<serde_json::Value, ApiError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = RequestSpan::new(&request_id, operation.name());
        let started = Instant::now();

        let result = async {
            match operation {
                Operation::Status => to_value(&self.status()),
                Operation::Health => to_value(&self.health()),
                Operation::Labels => to_value(&self.labels()),
                Operation::Predict(req) => to_value(&self.predict(req).await?),
                Operation::Reload(req) => to_value(&self.reload(req).await?),
            }
        }
        .instrument(span.clone())
        .await;

        span.record("latency_ms", started.elapsed().as_millis() as u64);
        span.record_result(&result);
        result
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(format!("serialization failed: {}", e)))
}

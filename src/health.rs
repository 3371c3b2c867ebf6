//! Health reporting.
//!
//! Derives liveness, readiness and an overall state from the model server's
//! status and the shutdown state.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::models::StatusSnapshot;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Model loaded and the last load succeeded.
    Healthy,
    /// Serving a model, but the most recent reload failed.
    Degraded,
    /// No model installed, or shutting down.
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub loaded: bool,
    pub device: String,
    pub accepting_requests: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_load_error: Option<String>,
    pub uptime_secs: u64,
}

/// Builds health reports relative to a fixed start time.
pub struct HealthChecker {
    start_time: Instant,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Ready to serve predictions.
    pub fn is_ready(&self, status: &StatusSnapshot, shutdown_state: ShutdownState) -> bool {
        shutdown_state == ShutdownState::Running && status.loaded
    }

    pub fn report(&self, status: &StatusSnapshot, shutdown_state: ShutdownState) -> HealthReport {
        HealthReport {
            state: Self::compute_state(status, shutdown_state),
            ready: self.is_ready(status, shutdown_state),
            loaded: status.loaded,
            device: status.device.clone(),
            accepting_requests: shutdown_state == ShutdownState::Running,
            last_load_error: status.last_load_error.clone(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(status: &StatusSnapshot, shutdown_state: ShutdownState) -> HealthState {
        if shutdown_state != ShutdownState::Running || !status.loaded {
            return HealthState::Unhealthy;
        }
        if status.is_stale() {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

//! Request and response bodies.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::PredictParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl PredictRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            threshold: None,
            max_length: None,
        }
    }

    /// Request parameters, with `defaults` for anything not given.
    pub fn params(&self, defaults: PredictParams) -> PredictParams {
        PredictParams::new(
            self.threshold.unwrap_or(defaults.threshold),
            self.max_length.unwrap_or(defaults.max_length),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadRequest {
    #[serde(default)]
    pub base_path: Option<PathBuf>,
    #[serde(default)]
    pub adapter_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub status: String,
    pub base: PathBuf,
    pub adapter: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelsResponse {
    pub labels: Vec<String>,
}

/// Operations accepted by the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Status,
    Predict(PredictRequest),
    Reload(ReloadRequest),
    Health,
    Labels,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Predict(_) => "predict",
            Self::Reload(_) => "reload",
            Self::Health => "health",
            Self::Labels => "labels",
        }
    }
}

/// One line of input in serve mode: `{"id": 1, "op": "predict", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(flatten)]
    pub operation: Operation,
}

/// One line of output in serve mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: serde_json::Value,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            status: None,
            error: None,
        }
    }

    pub fn failure(id: serde_json::Value, status: u16, error: String) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            status: Some(status),
            error: Some(error),
        }
    }
}

// Copyright 2024-2026 SCAudit Contributors
// SPDX-License-Identifier: Apache-2.0

//! Model lifecycle manager.
//!
//! One [`ModelServer`] owns the installed model and tokenizer for the life of
//! the process. Loads, predictions and teardown are serialized behind a
//! single mutex; status is published through a separate cell so it can be
//! read while a long load is in progress.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::config::ServeConfig;
use crate::engine::{classify, CandleBackend, ModelBackend, PredictParams, Prediction, ServeDevice};
use crate::labels::{LabelSet, LABELS};
use crate::telemetry;

use super::error::ServeError;
use super::loader::{self, LoadReport, LoadResult};
use super::status::StatusSnapshot;

struct Installed<B: ModelBackend> {
    model: B::Model,
    tokenizer: B::Tokenizer,
}

/// State guarded by the operation lock.
struct Slot<B: ModelBackend> {
    installed: Option<Installed<B>>,
    base_path: PathBuf,
    adapter_path: Option<PathBuf>,
}

/// Thread-safe owner of a classification model.
pub struct ModelServer<B: ModelBackend> {
    backend: B,
    device: ServeDevice,
    labels: &'static LabelSet,
    slot: Mutex<Slot<B>>,
    status: RwLock<StatusSnapshot>,
}

impl ModelServer<CandleBackend> {
    /// Production server: candle backend, device and paths from configuration.
    pub fn from_config(config: &ServeConfig) -> Self {
        Self::new(
            CandleBackend::new(),
            ServeDevice::resolve(config.device),
            config.base_model_path.clone(),
            config.adapter_path.clone(),
        )
    }
}

impl<B: ModelBackend> ModelServer<B> {
    /// Create an unloaded server. Nothing is read from disk until `load`.
    pub fn new(
        backend: B,
        device: ServeDevice,
        base_path: PathBuf,
        adapter_path: Option<PathBuf>,
    ) -> Self {
        let status = StatusSnapshot::initial(device.to_string(), base_path.clone(), adapter_path.clone());
        Self {
            backend,
            device,
            labels: &LABELS,
            slot: Mutex::new(Slot {
                installed: None,
                base_path,
                adapter_path,
            }),
            status: RwLock::new(status),
        }
    }

    pub fn labels(&self) -> &'static LabelSet {
        self.labels
    }

    pub fn device(&self) -> &ServeDevice {
        &self.device
    }

    /// Load (or reload) the model. Absent paths keep their current values.
    ///
    /// On failure the previously installed model keeps serving and the
    /// message is recorded as `last_load_error`. `loaded` stays `true` in
    /// that case, since a model is still installed and answering.
    pub fn load(
        &self,
        base_path: Option<PathBuf>,
        adapter_path: Option<PathBuf>,
    ) -> Result<LoadReport, ServeError> {
        let mut slot = self.slot.lock();

        let base = loader::resolve_path(base_path, Some(slot.base_path.as_path()))
            .unwrap_or_else(|| slot.base_path.clone());
        let adapter = loader::resolve_path(adapter_path, slot.adapter_path.as_deref());

        tracing::info!(
            base = %base.display(),
            adapter = %adapter.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none)".into()),
            device = %self.device,
            "loading model"
        );
        let started = Instant::now();

        match loader::build(&self.backend, &self.device, self.labels.len(), base, adapter) {
            Ok(result) => {
                let report = self.install(&mut slot, result);
                telemetry::record_model_load(true);
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    adapter_applied = report.adapter_applied,
                    "model loaded"
                );
                Ok(report)
            }
            Err(err) => {
                let message = err.message().to_string();
                {
                    let mut status = self.status.write();
                    let mut next = status.clone();
                    next.last_load_error = Some(message.clone());
                    *status = next;
                }
                telemetry::record_model_load(false);
                tracing::error!(error = %message, "model load failed");
                Err(ServeError::LoadFailed(message))
            }
        }
    }

    /// Release the old handles, install the new ones and publish status.
    fn install(&self, slot: &mut Slot<B>, result: LoadResult<B>) -> LoadReport {
        if let Some(old) = slot.installed.take() {
            self.backend.release(old.model, old.tokenizer, &self.device);
        }

        let LoadResult {
            model,
            tokenizer,
            resolved_base_path,
            resolved_adapter_path,
            adapter_applied,
        } = result;

        slot.installed = Some(Installed { model, tokenizer });
        slot.base_path = resolved_base_path.clone();
        slot.adapter_path = resolved_adapter_path.clone();

        *self.status.write() = StatusSnapshot {
            loaded: true,
            device: self.device.to_string(),
            base_path: resolved_base_path.clone(),
            adapter_path: resolved_adapter_path.clone(),
            last_load_error: None,
            adapter_applied,
        };

        LoadReport {
            message: "loaded",
            base_path: resolved_base_path,
            adapter_path: resolved_adapter_path,
            adapter_applied,
        }
    }

    /// Classify one text with the installed model.
    pub fn predict(&self, text: &str, params: PredictParams) -> Result<Prediction, ServeError> {
        let mut slot = self.slot.lock();
        let Some(installed) = slot.installed.as_mut() else {
            let reason = self
                .status
                .read()
                .last_load_error
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            telemetry::record_prediction(false, None);
            return Err(ServeError::NotLoaded(reason));
        };

        let started = Instant::now();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| {
            classify(&installed.model, &mut installed.tokenizer, self.labels, text, &params)
        })) {
            Ok(result) => result.map_err(ServeError::from_prediction),
            Err(payload) => Err(ServeError::PredictionFailed(format!(
                "backend panicked: {}",
                loader::panic_message(payload.as_ref())
            ))),
        };
        drop(slot);

        let elapsed = started.elapsed();
        match &result {
            Ok(prediction) => {
                tracing::debug!(
                    matched = prediction.labels.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "prediction served"
                );
                telemetry::record_prediction(true, Some(elapsed));
            }
            Err(e) => {
                tracing::warn!(error = %e, "prediction failed");
                telemetry::record_prediction(false, Some(elapsed));
            }
        }
        result
    }

    /// Current status. Does not wait for an in-progress load.
    pub fn status(&self) -> StatusSnapshot {
        self.status.read().clone()
    }

    /// Release the installed model and return device memory. Safe to call
    /// more than once; a later `load` brings the server back.
    pub fn teardown(&self) {
        let mut slot = self.slot.lock();
        let Some(old) = slot.installed.take() else {
            return;
        };
        self.backend.release(old.model, old.tokenizer, &self.device);

        let mut status = self.status.write();
        let mut next = status.clone();
        next.loaded = false;
        next.adapter_applied = false;
        *status = next;
        tracing::info!("model released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EncodedInput, InferenceError, SequenceClassifier, TextEncoder};
    use std::path::Path;

    struct Fixed(Vec<f32>);

    impl SequenceClassifier for Fixed {
        fn forward(&self, _input: &EncodedInput) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }

        fn num_labels(&self) -> usize {
            self.0.len()
        }
    }

    struct OneToken;

    impl TextEncoder for OneToken {
        fn encode(&mut self, _text: &str, _max_length: usize) -> Result<EncodedInput, InferenceError> {
            Ok(EncodedInput {
                input_ids: vec![1],
                attention_mask: vec![1],
                type_ids: vec![0],
            })
        }
    }

    /// Fails any base path named "missing".
    struct StubBackend;

    impl ModelBackend for StubBackend {
        type Config = usize;
        type Weights = Vec<f32>;
        type Model = Fixed;
        type Tokenizer = OneToken;

        fn resolve_config(&self, base: &Path, n: usize) -> Result<usize, InferenceError> {
            if base.ends_with("missing") {
                return Err(InferenceError::Config("config.json not found".into()));
            }
            Ok(n)
        }

        fn load_base(&self, _base: &Path, n: &usize) -> Result<Vec<f32>, InferenceError> {
            Ok(vec![0.0; *n])
        }

        fn apply_adapter(&self, w: &Vec<f32>, _n: &usize, _p: &Path) -> Result<Vec<f32>, InferenceError> {
            Ok(w.iter().map(|x| x + 1.0).collect())
        }

        fn bind(&self, w: Vec<f32>, _n: &usize, _d: &ServeDevice) -> Result<Fixed, InferenceError> {
            Ok(Fixed(w))
        }

        fn load_tokenizer(&self, _base: &Path) -> Result<OneToken, InferenceError> {
            Ok(OneToken)
        }
    }

    fn server() -> ModelServer<StubBackend> {
        ModelServer::new(StubBackend, ServeDevice::cpu(), PathBuf::from("base"), None)
    }

    #[test]
    fn test_initial_status() {
        let status = server().status();
        assert!(!status.loaded);
        assert_eq!(status.device, "cpu");
        assert_eq!(status.base_path, PathBuf::from("base"));
        assert_eq!(status.last_load_error, None);
    }

    #[test]
    fn test_predict_before_load_is_not_loaded() {
        let err = server().predict("x", PredictParams::default()).unwrap_err();
        assert_eq!(err, ServeError::NotLoaded("unknown".into()));
    }

    #[test]
    fn test_load_then_predict() {
        let server = server();
        let report = server.load(None, None).unwrap();
        assert_eq!(report.message, "loaded");
        assert!(!report.adapter_applied);

        let prediction = server.predict("x", PredictParams::default()).unwrap();
        assert_eq!(prediction.probs, vec![0.5; 7]);
        assert_eq!(prediction.labels.len(), 7);
    }

    #[test]
    fn test_failed_load_records_error_and_keeps_state() {
        let server = server();
        let err = server.load(Some(PathBuf::from("missing")), None).unwrap_err();
        let status = server.status();
        assert!(!status.loaded);
        assert_eq!(status.base_path, PathBuf::from("base"));
        assert_eq!(status.last_load_error.as_deref(), Some(err.message()));

        let err = server.predict("x", PredictParams::default()).unwrap_err();
        assert!(matches!(err, ServeError::NotLoaded(m) if m.contains("config.json not found")));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let server = server();
        server.load(None, None).unwrap();
        server.teardown();
        server.teardown();
        assert!(!server.status().loaded);
        assert!(server.predict("x", PredictParams::default()).is_err());

        server.load(None, None).unwrap();
        assert!(server.status().loaded);
    }
}

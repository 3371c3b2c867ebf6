//! Stub backend shared by the integration tests.
//!
//! Model directories are tempdirs holding `config.json` and `logits.json`;
//! the "model" always returns those logits. Adapter directories hold
//! `adapter_logits.json`, which replaces them.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scaudit_core::engine::{
    EncodedInput, InferenceError, ModelBackend, SequenceClassifier, ServeDevice, TextEncoder,
};
use tempfile::TempDir;

/// Records overlapping model work and releases.
#[derive(Default)]
pub struct StubState {
    busy: AtomicBool,
    pub overlaps: AtomicUsize,
    pub releases: AtomicUsize,
    pub forwards: AtomicUsize,
    /// When set, the next forward passes panic.
    pub panic_forward: AtomicBool,
    pub delay: Duration,
}

impl StubState {
    fn enter(&self) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }

    fn exit(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct StubBackend {
    pub state: Arc<StubState>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            state: Arc::new(StubState {
                delay,
                ..Default::default()
            }),
        }
    }
}

pub struct StubModel {
    logits: Vec<f32>,
    state: Arc<StubState>,
}

impl SequenceClassifier for StubModel {
    fn forward(&self, _input: &EncodedInput) -> Result<Vec<f32>, InferenceError> {
        if self.state.panic_forward.load(Ordering::SeqCst) {
            panic!("kernel fault");
        }
        self.state.enter();
        self.state.forwards.fetch_add(1, Ordering::SeqCst);
        self.state.exit();
        Ok(self.logits.clone())
    }

    fn num_labels(&self) -> usize {
        self.logits.len()
    }
}

pub struct WhitespaceTokenizer;

impl TextEncoder for WhitespaceTokenizer {
    fn encode(&mut self, text: &str, max_length: usize) -> Result<EncodedInput, InferenceError> {
        let n = text.split_whitespace().count().min(max_length);
        Ok(EncodedInput {
            input_ids: (0..n as u32).collect(),
            attention_mask: vec![1; n],
            type_ids: vec![0; n],
        })
    }
}

fn read_logits(path: &Path) -> Result<Vec<f32>, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| format!("{}: {}", path.display(), e))
}

impl ModelBackend for StubBackend {
    type Config = usize;
    type Weights = Vec<f32>;
    type Model = StubModel;
    type Tokenizer = WhitespaceTokenizer;

    fn resolve_config(&self, base: &Path, num_labels: usize) -> Result<usize, InferenceError> {
        if !base.join("config.json").is_file() {
            return Err(InferenceError::Config(format!(
                "{}: config.json not found",
                base.display()
            )));
        }
        Ok(num_labels)
    }

    fn load_base(&self, base: &Path, _num_labels: &usize) -> Result<Vec<f32>, InferenceError> {
        if base.join("panic").exists() {
            panic!("corrupt checkpoint");
        }
        self.state.enter();
        let result = read_logits(&base.join("logits.json")).map_err(InferenceError::ModelError);
        self.state.exit();
        result
    }

    fn apply_adapter(
        &self,
        _weights: &Vec<f32>,
        _num_labels: &usize,
        adapter: &Path,
    ) -> Result<Vec<f32>, InferenceError> {
        read_logits(&adapter.join("adapter_logits.json")).map_err(InferenceError::Adapter)
    }

    fn bind(
        &self,
        weights: Vec<f32>,
        _num_labels: &usize,
        _device: &ServeDevice,
    ) -> Result<StubModel, InferenceError> {
        Ok(StubModel {
            logits: weights,
            state: self.state.clone(),
        })
    }

    fn load_tokenizer(&self, _base: &Path) -> Result<WhitespaceTokenizer, InferenceError> {
        Ok(WhitespaceTokenizer)
    }

    fn release(&self, model: StubModel, tokenizer: WhitespaceTokenizer, _device: &ServeDevice) {
        drop(model);
        drop(tokenizer);
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// A model directory whose model always returns `logits`.
pub fn model_dir(logits: &[f32]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.json"), "{}").unwrap();
    std::fs::write(
        dir.path().join("logits.json"),
        serde_json::to_string(logits).unwrap(),
    )
    .unwrap();
    dir
}

/// An adapter directory replacing the logits with `logits`.
pub fn adapter_dir(logits: &[f32]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("adapter_logits.json"),
        serde_json::to_string(logits).unwrap(),
    )
    .unwrap();
    dir
}

pub const FIXED_LOGITS: [f32; 7] = [10.0, -10.0, 0.0, 0.0, 0.0, 0.0, 0.0];

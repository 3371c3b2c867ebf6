// Copyright 2024-2026 SCAudit Contributors
// SPDX-License-Identifier: Apache-2.0

//! Candle backend.
//!
//! Serves BERT encoders and Llama-layout decoders (Llama, Qwen2) as sequence
//! classifiers stored as safetensors checkpoints, with optional LoRA adapters
//! merged into the weights at load time.

mod adapter;
mod classifier;
mod config;
mod decoder;
mod weights;

use std::path::Path;

use candle_core::DType;
use candle_nn::VarBuilder;

pub use adapter::{merge_adapter, AdapterConfig, MergeSummary};
pub use classifier::{BertSequenceClassifier, CandleClassifier};
pub use config::{Architecture, ClassifierConfig, DecoderConfig, RopeScaling, MULTI_LABEL_PROBLEM};
pub use decoder::DecoderSequenceClassifier;
pub use weights::ModelWeights;

use super::device::ServeDevice;
use super::error::InferenceError;
use super::tokenizer::HfTokenizer;
use super::ModelBackend;

/// Production backend: candle tensors, HuggingFace tokenizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleBackend;

impl CandleBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ModelBackend for CandleBackend {
    type Config = ClassifierConfig;
    type Weights = ModelWeights;
    type Model = CandleClassifier;
    type Tokenizer = HfTokenizer;

    fn resolve_config(
        &self,
        base_path: &Path,
        num_labels: usize,
    ) -> Result<ClassifierConfig, InferenceError> {
        ClassifierConfig::from_dir(base_path, num_labels)
    }

    fn load_base(
        &self,
        base_path: &Path,
        config: &ClassifierConfig,
    ) -> Result<ModelWeights, InferenceError> {
        let mut weights = ModelWeights::load(base_path)?;
        weights.ensure_head(config)?;
        tracing::debug!(tensors = weights.len(), path = %base_path.display(), "base weights read");
        Ok(weights)
    }

    fn apply_adapter(
        &self,
        weights: &ModelWeights,
        _config: &ClassifierConfig,
        adapter_path: &Path,
    ) -> Result<ModelWeights, InferenceError> {
        let (merged, summary) = merge_adapter(weights, adapter_path)?;
        tracing::info!(
            merged = summary.merged,
            replaced = summary.replaced,
            path = %adapter_path.display(),
            "adapter merged"
        );
        Ok(merged)
    }

    fn bind(
        &self,
        weights: ModelWeights,
        config: &ClassifierConfig,
        device: &ServeDevice,
    ) -> Result<CandleClassifier, InferenceError> {
        let tensors = weights.to_device(device.device())?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, device.device());
        CandleClassifier::load(vb, config)
    }

    fn load_tokenizer(&self, base_path: &Path) -> Result<HfTokenizer, InferenceError> {
        HfTokenizer::from_dir(base_path)
    }
}

//! Host-side checkpoint weights.
//!
//! Weights are read to CPU memory and normalized before any adapter is
//! merged: encoders to the `bert.* / classifier.*` layout, decoders to
//! `model.* / score.*`.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use candle_core::{DType, Device, Tensor};

use super::config::{Architecture, ClassifierConfig};
use crate::engine::InferenceError;

const SINGLE_FILE: &str = "model.safetensors";
const SHARD_INDEX: &str = "model.safetensors.index.json";

pub(crate) const ENCODER_PREFIX: &str = "bert.";
pub(crate) const POOLER_WEIGHT: &str = "bert.pooler.dense.weight";
pub(crate) const POOLER_BIAS: &str = "bert.pooler.dense.bias";
pub(crate) const HEAD_WEIGHT: &str = "classifier.weight";
pub(crate) const HEAD_BIAS: &str = "classifier.bias";
pub(crate) const SCORE_WEIGHT: &str = "score.weight";
const LM_HEAD_WEIGHT: &str = "lm_head.weight";

/// Named tensors of one checkpoint, resident on the CPU.
#[derive(Debug, Clone, Default)]
pub struct ModelWeights {
    tensors: HashMap<String, Tensor>,
}

impl ModelWeights {
    pub fn from_tensors(tensors: HashMap<String, Tensor>) -> Self {
        let tensors = tensors
            .into_iter()
            .map(|(name, t)| (normalize_key(&name), t))
            .collect();
        Self { tensors }
    }

    /// Read safetensors weights from a model directory, either a single
    /// `model.safetensors` or a sharded checkpoint with an index file.
    pub fn load(dir: &Path) -> Result<Self, InferenceError> {
        if !dir.is_dir() {
            return Err(InferenceError::ModelError(format!(
                "model directory not found: {}",
                dir.display()
            )));
        }

        let single = dir.join(SINGLE_FILE);
        if single.is_file() {
            let tensors = candle_core::safetensors::load(&single, &Device::Cpu)?;
            return Ok(Self::from_tensors(tensors));
        }

        let index = dir.join(SHARD_INDEX);
        if index.is_file() {
            let mut tensors = HashMap::new();
            for shard in shard_files(&index)? {
                tensors.extend(candle_core::safetensors::load(dir.join(&shard), &Device::Cpu)?);
            }
            return Ok(Self::from_tensors(tensors));
        }

        Err(InferenceError::ModelError(format!(
            "no safetensors weights found in {}",
            dir.display()
        )))
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn insert(&mut self, name: String, tensor: Tensor) {
        self.tensors.insert(name, tensor);
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Make sure the checkpoint carries a classification head with
    /// `config.num_labels` outputs (and, for encoders, a pooler). Missing
    /// layers are freshly initialized; a head of the wrong width is rejected.
    pub fn ensure_head(&mut self, config: &ClassifierConfig) -> Result<(), InferenceError> {
        let hidden = config.hidden_size;
        let std = config.initializer_range as f32;

        match &config.architecture {
            Architecture::Bert(_) => {
                if !self.contains(POOLER_WEIGHT) {
                    tracing::warn!("pooler not found in checkpoint; initializing fresh weights");
                    self.insert(POOLER_WEIGHT.into(), Tensor::randn(0f32, std, (hidden, hidden), &Device::Cpu)?);
                    self.insert(POOLER_BIAS.into(), Tensor::zeros(hidden, DType::F32, &Device::Cpu)?);
                }
                if self.check_head(HEAD_WEIGHT, config)? {
                    self.insert(
                        HEAD_WEIGHT.into(),
                        Tensor::randn(0f32, std, (config.num_labels, hidden), &Device::Cpu)?,
                    );
                    self.insert(
                        HEAD_BIAS.into(),
                        Tensor::zeros(config.num_labels, DType::F32, &Device::Cpu)?,
                    );
                }
            }
            Architecture::Decoder(_) => {
                if self.tensors.remove(LM_HEAD_WEIGHT).is_some() {
                    tracing::debug!("dropped language-model head");
                }
                if self.check_head(SCORE_WEIGHT, config)? {
                    self.insert(
                        SCORE_WEIGHT.into(),
                        Tensor::randn(0f32, std, (config.num_labels, hidden), &Device::Cpu)?,
                    );
                }
            }
        }
        Ok(())
    }

    /// Returns `true` when the head at `name` is absent and must be created.
    fn check_head(&self, name: &str, config: &ClassifierConfig) -> Result<bool, InferenceError> {
        match self.get(name) {
            Some(head) => {
                let outputs = head.dims().first().copied().unwrap_or(0);
                if outputs != config.num_labels {
                    return Err(InferenceError::ModelError(format!(
                        "classification head has {} outputs, expected {}",
                        outputs, config.num_labels
                    )));
                }
                Ok(false)
            }
            None => {
                tracing::warn!(
                    num_labels = config.num_labels,
                    head = name,
                    "classification head not found in checkpoint; initializing fresh weights"
                );
                Ok(true)
            }
        }
    }

    /// Copy every tensor to `device` as f32.
    pub fn to_device(&self, device: &Device) -> Result<HashMap<String, Tensor>, InferenceError> {
        self.tensors
            .iter()
            .map(|(name, t)| -> Result<(String, Tensor), InferenceError> {
                Ok((name.clone(), t.to_dtype(DType::F32)?.to_device(device)?))
            })
            .collect()
    }
}

/// Unique shard file names referenced by a safetensors index.
fn shard_files(index: &Path) -> Result<BTreeSet<String>, InferenceError> {
    let raw = std::fs::read_to_string(index)?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| InferenceError::ModelError(format!("{}: {}", index.display(), e)))?;
    let map = value
        .get("weight_map")
        .and_then(|m| m.as_object())
        .ok_or_else(|| {
            InferenceError::ModelError(format!("{}: missing weight_map", index.display()))
        })?;
    Ok(map
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}

/// Map checkpoint names onto the `bert.*` layout and modern LayerNorm names.
pub(crate) fn normalize_key(name: &str) -> String {
    let name = name
        .replace("LayerNorm.gamma", "LayerNorm.weight")
        .replace("LayerNorm.beta", "LayerNorm.bias");
    let bare_encoder = ["embeddings.", "encoder.", "pooler."]
        .iter()
        .any(|p| name.starts_with(p));
    if bare_encoder {
        format!("{}{}", ENCODER_PREFIX, name)
    } else {
        name
    }
}

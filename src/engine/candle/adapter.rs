// Copyright 2024-2026 SCAudit Contributors
// SPDX-License-Identifier: Apache-2.0

//! Low-rank adapter composition.
//!
//! Reads a PEFT-style adapter directory (`adapter_config.json` +
//! `adapter_model.safetensors`) and folds it into a copy of the base
//! weights: every `lora_A`/`lora_B` pair adds `scale * B·A` to its target
//! weight, every other tensor replaces the base tensor of the same name
//! (`modules_to_save`, typically the classification head).
//!
//! The merge is computed on a copy; the base weights are never modified.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use serde::Deserialize;

use super::weights::{normalize_key, ModelWeights};
use crate::engine::InferenceError;

const CONFIG_FILE: &str = "adapter_config.json";
const WEIGHTS_FILE: &str = "adapter_model.safetensors";

const PEFT_PREFIX: &str = "base_model.model.";
const LORA_A: &str = ".lora_A";
const LORA_B: &str = ".lora_B";

/// The subset of `adapter_config.json` the merge needs.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    pub r: usize,
    pub lora_alpha: f64,
    #[serde(default)]
    pub use_rslora: bool,
    #[serde(default)]
    pub fan_in_fan_out: bool,
    #[serde(default)]
    pub peft_type: Option<String>,
}

impl AdapterConfig {
    pub fn read(dir: &Path) -> Result<Self, InferenceError> {
        let path = dir.join(CONFIG_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            InferenceError::Adapter(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| InferenceError::Adapter(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), InferenceError> {
        if let Some(kind) = &self.peft_type {
            if !kind.eq_ignore_ascii_case("lora") {
                return Err(InferenceError::Adapter(format!("unsupported adapter type '{}'", kind)));
            }
        }
        if self.r == 0 {
            return Err(InferenceError::Adapter("adapter rank r must be > 0".into()));
        }
        Ok(())
    }

    /// Multiplier applied to `B·A`.
    pub fn scale(&self) -> f64 {
        if self.use_rslora {
            self.lora_alpha / (self.r as f64).sqrt()
        } else {
            self.lora_alpha / self.r as f64
        }
    }
}

/// Counts reported after a successful merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub merged: usize,
    pub replaced: usize,
}

/// Merge the adapter at `dir` into a copy of `base`.
pub fn merge_adapter(
    base: &ModelWeights,
    dir: &Path,
) -> Result<(ModelWeights, MergeSummary), InferenceError> {
    let config = AdapterConfig::read(dir)?;
    let path = dir.join(WEIGHTS_FILE);
    if !path.is_file() {
        return Err(InferenceError::Adapter(format!("{} not found", path.display())));
    }
    let tensors = candle_core::safetensors::load(&path, &Device::Cpu)
        .map_err(|e| InferenceError::Adapter(format!("{}: {}", path.display(), e)))?;
    merge_tensors(base, &config, tensors)
}

/// Merge already-loaded adapter tensors. Split out so the arithmetic can be
/// checked without touching the filesystem.
pub fn merge_tensors(
    base: &ModelWeights,
    config: &AdapterConfig,
    tensors: HashMap<String, Tensor>,
) -> Result<(ModelWeights, MergeSummary), InferenceError> {
    let scale = config.scale();
    let mut pairs: HashMap<String, (Option<Tensor>, Option<Tensor>)> = HashMap::new();
    let mut replacements: Vec<(String, Tensor)> = Vec::new();

    for (raw_name, tensor) in tensors {
        let name = raw_name.strip_prefix(PEFT_PREFIX).unwrap_or(raw_name.as_str());
        if name.contains(".lora_embedding_") || name.contains(".lora_magnitude_") {
            return Err(InferenceError::Adapter(format!("unsupported adapter tensor '{}'", raw_name)));
        }
        if let Some(module) = lora_module(name, LORA_A) {
            pairs.entry(module).or_default().0 = Some(tensor);
        } else if let Some(module) = lora_module(name, LORA_B) {
            pairs.entry(module).or_default().1 = Some(tensor);
        } else {
            let target = name
                .replace(".modules_to_save.default", "")
                .replace(".modules_to_save", "");
            replacements.push((normalize_key(&target), tensor));
        }
    }

    let mut merged = base.clone();
    let mut summary = MergeSummary::default();

    let mut modules: Vec<_> = pairs.into_iter().collect();
    modules.sort_by(|a, b| a.0.cmp(&b.0));
    for (module, pair) in modules {
        let (a, b) = match pair {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(InferenceError::Adapter(format!(
                    "incomplete lora pair for '{}'",
                    module
                )))
            }
        };
        let target = normalize_key(&format!("{}.weight", module));
        let weight = base.get(&target).ok_or_else(|| {
            InferenceError::Adapter(format!("adapter targets unknown weight '{}'", target))
        })?;
        let updated = apply_delta(weight, &a, &b, scale, config.fan_in_fan_out)
            .map_err(|e| InferenceError::Adapter(format!("{}: {}", target, e)))?;
        merged.insert(target, updated);
        summary.merged += 1;
    }

    for (target, tensor) in replacements {
        let current = base.get(&target).ok_or_else(|| {
            InferenceError::Adapter(format!("adapter replaces unknown weight '{}'", target))
        })?;
        if current.dims() != tensor.dims() {
            return Err(InferenceError::Adapter(format!(
                "shape mismatch for '{}': base {:?}, adapter {:?}",
                target,
                current.dims(),
                tensor.dims()
            )));
        }
        merged.insert(target, tensor);
        summary.replaced += 1;
    }

    if summary.merged + summary.replaced == 0 {
        return Err(InferenceError::Adapter("adapter contains no applicable weights".into()));
    }
    Ok((merged, summary))
}

/// Module path for `...<marker>.weight` or `...<marker>.<adapter>.weight`.
fn lora_module(name: &str, marker: &str) -> Option<String> {
    let idx = name.find(marker)?;
    let rest = &name[idx + marker.len()..];
    if rest.starts_with('.') && rest.ends_with(".weight") {
        Some(name[..idx].to_string())
    } else {
        None
    }
}

fn apply_delta(
    weight: &Tensor,
    a: &Tensor,
    b: &Tensor,
    scale: f64,
    fan_in_fan_out: bool,
) -> Result<Tensor, candle_core::Error> {
    let a = a.to_dtype(DType::F32)?;
    let b = b.to_dtype(DType::F32)?;
    let mut delta = b.matmul(&a)?.affine(scale, 0.0)?;
    if fan_in_fan_out {
        delta = delta.t()?;
    }
    if delta.dims() != weight.dims() {
        candle_core::bail!("delta shape {:?} does not match weight {:?}", delta.dims(), weight.dims());
    }
    weight.to_dtype(DType::F32)?.add(&delta)
}

//! Model configuration resolution from `config.json`.

use std::path::Path;

use candle_transformers::models::bert::Config as BertConfig;
use serde::Deserialize;

use crate::engine::InferenceError;

/// Problem type recorded on every resolved config.
pub const MULTI_LABEL_PROBLEM: &str = "multi_label_classification";

/// Architectures the candle backend can build.
const SUPPORTED_MODEL_TYPES: &[&str] = &["bert", "llama", "qwen2"];

/// Layer stack under the classification head.
#[derive(Debug, Clone)]
pub enum Architecture {
    /// Bidirectional encoder, pooled at `[CLS]`.
    Bert(BertConfig),
    /// Causal decoder, read at the last non-padding token.
    Decoder(DecoderConfig),
}

/// Configuration of a sequence classifier with a fixed number of outputs.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub architecture: Architecture,
    pub num_labels: usize,
    pub hidden_size: usize,
    /// Std-dev used when a head has to be freshly initialized.
    pub initializer_range: f64,
    pub problem_type: String,
    pub model_type: Option<String>,
    pub pad_token_id: Option<u32>,
}

impl ClassifierConfig {
    /// Read `config.json` from a model directory.
    pub fn from_dir(dir: &Path, num_labels: usize) -> Result<Self, InferenceError> {
        let path = dir.join("config.json");
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            InferenceError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| InferenceError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(value, num_labels)
    }

    /// Resolve a parsed config, forcing `num_labels` and the multi-label problem type.
    pub fn from_json(mut value: serde_json::Value, num_labels: usize) -> Result<Self, InferenceError> {
        if num_labels == 0 {
            return Err(InferenceError::Config("num_labels must be > 0".into()));
        }
        let obj = value
            .as_object_mut()
            .ok_or_else(|| InferenceError::Config("config must be a JSON object".into()))?;

        let model_type = obj.get("model_type").and_then(|v| v.as_str()).map(str::to_string);
        if let Some(mt) = &model_type {
            if !SUPPORTED_MODEL_TYPES.contains(&mt.as_str()) {
                return Err(InferenceError::Config(format!(
                    "unsupported model_type '{}' (supported: {})",
                    mt,
                    SUPPORTED_MODEL_TYPES.join(", ")
                )));
            }
        }

        let hidden_size = obj
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| InferenceError::Config("missing hidden_size".into()))?
            as usize;
        let initializer_range = obj
            .get("initializer_range")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.02);
        let pad_token_id = obj
            .get("pad_token_id")
            .and_then(|v| v.as_u64())
            .map(|id| id as u32);

        obj.insert("num_labels".into(), serde_json::json!(num_labels));
        obj.insert("problem_type".into(), serde_json::json!(MULTI_LABEL_PROBLEM));

        let architecture = match model_type.as_deref() {
            None | Some("bert") => Architecture::Bert(
                serde_json::from_value(value)
                    .map_err(|e| InferenceError::Config(format!("invalid encoder config: {}", e)))?,
            ),
            Some(_) => {
                let decoder: DecoderConfig = serde_json::from_value(value)
                    .map_err(|e| InferenceError::Config(format!("invalid decoder config: {}", e)))?;
                decoder.validate()?;
                Architecture::Decoder(decoder)
            }
        };

        Ok(Self {
            architecture,
            num_labels,
            hidden_size,
            initializer_range,
            problem_type: MULTI_LABEL_PROBLEM.to_string(),
            model_type,
            pad_token_id,
        })
    }

    pub fn is_decoder(&self) -> bool {
        matches!(self.architecture, Architecture::Decoder(_))
    }
}

fn default_rms_norm_eps() -> f64 {
    1e-6
}

fn default_rope_theta() -> f64 {
    10_000.0
}

fn default_hidden_act() -> String {
    "silu".to_string()
}

/// Hyperparameters of a Llama-layout decoder (Llama, Qwen2).
#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    #[serde(default)]
    pub model_type: Option<String>,
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub intermediate_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    #[serde(default)]
    pub num_key_value_heads: Option<usize>,
    #[serde(default)]
    pub head_dim: Option<usize>,
    #[serde(default = "default_rms_norm_eps")]
    pub rms_norm_eps: f64,
    #[serde(default = "default_rope_theta")]
    pub rope_theta: f64,
    #[serde(default)]
    pub rope_scaling: Option<RopeScaling>,
    #[serde(default)]
    pub attention_bias: Option<bool>,
    #[serde(default)]
    pub mlp_bias: bool,
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,
}

/// `rope_scaling` block. Only the `llama3` frequency rescaling is applied.
#[derive(Debug, Clone, Deserialize)]
pub struct RopeScaling {
    #[serde(default)]
    pub rope_type: Option<String>,
    #[serde(default, rename = "type")]
    pub legacy_type: Option<String>,
    #[serde(default = "RopeScaling::default_factor")]
    pub factor: f64,
    #[serde(default = "RopeScaling::default_factor")]
    pub low_freq_factor: f64,
    #[serde(default = "RopeScaling::default_high_freq_factor")]
    pub high_freq_factor: f64,
    #[serde(default = "RopeScaling::default_original_max")]
    pub original_max_position_embeddings: usize,
}

impl RopeScaling {
    fn default_factor() -> f64 {
        1.0
    }

    fn default_high_freq_factor() -> f64 {
        4.0
    }

    fn default_original_max() -> usize {
        8192
    }

    pub fn kind(&self) -> &str {
        self.rope_type
            .as_deref()
            .or(self.legacy_type.as_deref())
            .unwrap_or("default")
    }

    /// Llama 3 wavelength-dependent rescaling of one inverse frequency.
    fn llama3(&self, freq: f64) -> f64 {
        let original = self.original_max_position_embeddings as f64;
        let low_freq_wavelen = original / self.low_freq_factor;
        let high_freq_wavelen = original / self.high_freq_factor;
        let wavelen = 2.0 * std::f64::consts::PI / freq;
        if wavelen < high_freq_wavelen {
            freq
        } else if wavelen > low_freq_wavelen {
            freq / self.factor
        } else {
            let smooth = (original / wavelen - self.low_freq_factor)
                / (self.high_freq_factor - self.low_freq_factor);
            (1.0 - smooth) * freq / self.factor + smooth * freq
        }
    }
}

impl DecoderConfig {
    pub fn num_kv_heads(&self) -> usize {
        self.num_key_value_heads.unwrap_or(self.num_attention_heads)
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
            .unwrap_or(self.hidden_size / self.num_attention_heads.max(1))
    }

    /// Qwen2 carries q/k/v biases without declaring `attention_bias`.
    pub fn qkv_bias(&self) -> bool {
        self.attention_bias
            .unwrap_or(self.model_type.as_deref() == Some("qwen2"))
    }

    pub fn o_bias(&self) -> bool {
        self.attention_bias.unwrap_or(false)
    }

    /// Rotary inverse frequencies, one per pair of head dimensions.
    pub fn inv_freq(&self) -> Vec<f32> {
        let dim = self.head_dim();
        (0..dim)
            .step_by(2)
            .map(|i| 1.0 / self.rope_theta.powf(i as f64 / dim as f64))
            .map(|freq| match &self.rope_scaling {
                Some(scaling) if scaling.kind() == "llama3" => scaling.llama3(freq),
                _ => freq,
            })
            .map(|freq| freq as f32)
            .collect()
    }

    fn validate(&self) -> Result<(), InferenceError> {
        let invalid = |msg: String| Err(InferenceError::Config(msg));
        if self.num_attention_heads == 0 || self.num_kv_heads() == 0 {
            return invalid("attention head counts must be > 0".into());
        }
        if self.head_dim.is_none() && self.hidden_size % self.num_attention_heads != 0 {
            return invalid(format!(
                "hidden_size {} is not divisible by {} attention heads",
                self.hidden_size, self.num_attention_heads
            ));
        }
        if self.head_dim() % 2 != 0 {
            return invalid(format!("head_dim {} must be even for rotary embeddings", self.head_dim()));
        }
        if self.num_attention_heads % self.num_kv_heads() != 0 {
            return invalid(format!(
                "{} attention heads cannot be grouped over {} key/value heads",
                self.num_attention_heads,
                self.num_kv_heads()
            ));
        }
        if self.hidden_act != "silu" {
            return invalid(format!("unsupported hidden_act '{}' (supported: silu)", self.hidden_act));
        }
        if let Some(scaling) = &self.rope_scaling {
            if !matches!(scaling.kind(), "default" | "llama3") {
                return invalid(format!("unsupported rope_scaling type '{}'", scaling.kind()));
            }
        }
        Ok(())
    }
}

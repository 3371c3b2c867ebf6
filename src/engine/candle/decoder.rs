//! Causal decoder (Llama / Qwen2 layout) with a bias-free `score` head.
//!
//! The head reads the hidden state of the last non-padding token, the way
//! decoder sequence classifiers are trained.

use candle_core::{Device, Tensor};
use candle_nn::{Embedding, Linear, Module, RmsNorm, VarBuilder};

use super::config::{ClassifierConfig, DecoderConfig};
use crate::engine::{EncodedInput, InferenceError, SequenceClassifier};

struct Rotary {
    /// `(1, head_dim / 2)`
    inv_freq: Tensor,
}

impl Rotary {
    fn new(config: &DecoderConfig, device: &Device) -> Result<Self, InferenceError> {
        let inv_freq = config.inv_freq();
        let half = inv_freq.len();
        Ok(Self {
            inv_freq: Tensor::from_vec(inv_freq, (1, half), device)?,
        })
    }

    /// `(cos, sin)`, each `(seq_len, head_dim / 2)`.
    fn tables(&self, seq_len: usize) -> Result<(Tensor, Tensor), InferenceError> {
        let positions: Vec<f32> = (0..seq_len).map(|p| p as f32).collect();
        let positions = Tensor::from_vec(positions, (seq_len, 1), self.inv_freq.device())?;
        let freqs = positions.matmul(&self.inv_freq)?;
        Ok((freqs.cos()?, freqs.sin()?))
    }
}

struct Attention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    o_proj: Linear,
    num_heads: usize,
    num_kv_heads: usize,
    head_dim: usize,
}

impl Attention {
    fn load(vb: VarBuilder, config: &DecoderConfig) -> Result<Self, InferenceError> {
        let hidden = config.hidden_size;
        let head_dim = config.head_dim();
        let q_out = config.num_attention_heads * head_dim;
        let kv_out = config.num_kv_heads() * head_dim;
        let qkv_bias = config.qkv_bias();
        Ok(Self {
            q_proj: candle_nn::linear_b(hidden, q_out, qkv_bias, vb.pp("q_proj"))?,
            k_proj: candle_nn::linear_b(hidden, kv_out, qkv_bias, vb.pp("k_proj"))?,
            v_proj: candle_nn::linear_b(hidden, kv_out, qkv_bias, vb.pp("v_proj"))?,
            o_proj: candle_nn::linear_b(q_out, hidden, config.o_bias(), vb.pp("o_proj"))?,
            num_heads: config.num_attention_heads,
            num_kv_heads: config.num_kv_heads(),
            head_dim,
        })
    }

    /// `[1, heads, seq, head_dim]`
    fn split_heads(&self, x: &Tensor, heads: usize) -> Result<Tensor, InferenceError> {
        let (b, t, _) = x.dims3()?;
        Ok(x.reshape((b, t, heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    fn forward(
        &self,
        x: &Tensor,
        cos: &Tensor,
        sin: &Tensor,
        mask: &Tensor,
    ) -> Result<Tensor, InferenceError> {
        let (b, t, _) = x.dims3()?;
        let q = self.split_heads(&self.q_proj.forward(x)?, self.num_heads)?;
        let k = self.split_heads(&self.k_proj.forward(x)?, self.num_kv_heads)?;
        let v = self.split_heads(&self.v_proj.forward(x)?, self.num_kv_heads)?;

        let q = candle_nn::rotary_emb::rope(&q, cos, sin)?;
        let k = candle_nn::rotary_emb::rope(&k, cos, sin)?;

        let groups = self.num_heads / self.num_kv_heads;
        let k = repeat_kv(k, groups)?;
        let v = repeat_kv(v, groups)?;

        let scale = (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.t()?.contiguous()?)? / scale)?.broadcast_add(mask)?;
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;
        let context = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((b, t, self.num_heads * self.head_dim))?;
        Ok(self.o_proj.forward(&context)?)
    }
}

/// Share each key/value head across `groups` query heads.
fn repeat_kv(x: Tensor, groups: usize) -> Result<Tensor, InferenceError> {
    if groups == 1 {
        return Ok(x);
    }
    let (b, kv_heads, t, d) = x.dims4()?;
    Ok(x.unsqueeze(2)?
        .expand((b, kv_heads, groups, t, d))?
        .reshape((b, kv_heads * groups, t, d))?)
}

struct Mlp {
    gate_proj: Linear,
    up_proj: Linear,
    down_proj: Linear,
}

impl Mlp {
    fn load(vb: VarBuilder, config: &DecoderConfig) -> Result<Self, InferenceError> {
        let (hidden, inter, bias) = (config.hidden_size, config.intermediate_size, config.mlp_bias);
        Ok(Self {
            gate_proj: candle_nn::linear_b(hidden, inter, bias, vb.pp("gate_proj"))?,
            up_proj: candle_nn::linear_b(hidden, inter, bias, vb.pp("up_proj"))?,
            down_proj: candle_nn::linear_b(inter, hidden, bias, vb.pp("down_proj"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor, InferenceError> {
        let gate = candle_nn::ops::silu(&self.gate_proj.forward(x)?)?;
        let up = self.up_proj.forward(x)?;
        Ok(self.down_proj.forward(&(gate * up)?)?)
    }
}

struct DecoderLayer {
    input_layernorm: RmsNorm,
    self_attn: Attention,
    post_attention_layernorm: RmsNorm,
    mlp: Mlp,
}

impl DecoderLayer {
    fn load(vb: VarBuilder, config: &DecoderConfig) -> Result<Self, InferenceError> {
        let (hidden, eps) = (config.hidden_size, config.rms_norm_eps);
        Ok(Self {
            input_layernorm: candle_nn::rms_norm(hidden, eps, vb.pp("input_layernorm"))?,
            self_attn: Attention::load(vb.pp("self_attn"), config)?,
            post_attention_layernorm: candle_nn::rms_norm(
                hidden,
                eps,
                vb.pp("post_attention_layernorm"),
            )?,
            mlp: Mlp::load(vb.pp("mlp"), config)?,
        })
    }

    fn forward(
        &self,
        x: &Tensor,
        cos: &Tensor,
        sin: &Tensor,
        mask: &Tensor,
    ) -> Result<Tensor, InferenceError> {
        let attn = self
            .self_attn
            .forward(&self.input_layernorm.forward(x)?, cos, sin, mask)?;
        let x = (x + attn)?;
        let mlp = self.mlp.forward(&self.post_attention_layernorm.forward(&x)?)?;
        Ok((x + mlp)?)
    }
}

/// Decoder sequence classifier bound to one device.
pub struct DecoderSequenceClassifier {
    embed_tokens: Embedding,
    layers: Vec<DecoderLayer>,
    norm: RmsNorm,
    score: Linear,
    rotary: Rotary,
    num_labels: usize,
    pad_token_id: Option<u32>,
    device: Device,
}

impl DecoderSequenceClassifier {
    pub fn load(
        vb: VarBuilder,
        config: &ClassifierConfig,
        decoder: &DecoderConfig,
    ) -> Result<Self, InferenceError> {
        let device = vb.device().clone();
        let hidden = decoder.hidden_size;
        let model = vb.pp("model");
        let embed_tokens =
            candle_nn::embedding(decoder.vocab_size, hidden, model.pp("embed_tokens"))?;
        let layers = (0..decoder.num_hidden_layers)
            .map(|i| DecoderLayer::load(model.pp(format!("layers.{i}")), decoder))
            .collect::<Result<Vec<_>, _>>()?;
        let norm = candle_nn::rms_norm(hidden, decoder.rms_norm_eps, model.pp("norm"))?;
        let score = candle_nn::linear_no_bias(hidden, config.num_labels, vb.pp("score"))?;
        Ok(Self {
            embed_tokens,
            layers,
            norm,
            score,
            rotary: Rotary::new(decoder, &device)?,
            num_labels: config.num_labels,
            pad_token_id: config.pad_token_id,
            device,
        })
    }
}

impl SequenceClassifier for DecoderSequenceClassifier {
    fn forward(&self, input: &EncodedInput) -> Result<Vec<f32>, InferenceError> {
        if input.is_empty() {
            return Err(InferenceError::InputValidation("text produced no tokens".into()));
        }
        let t = input.input_ids.len();
        let ids = Tensor::new(input.input_ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let mask = Tensor::from_vec(attention_bias(&input.attention_mask), (t, t), &self.device)?;
        let (cos, sin) = self.rotary.tables(t)?;

        let mut hidden = self.embed_tokens.forward(&ids)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, &cos, &sin, &mask)?;
        }
        let hidden = self.norm.forward(&hidden)?;

        let last = last_token_index(input, self.pad_token_id);
        let pooled = hidden.narrow(1, last, 1)?.squeeze(1)?;
        let logits = self.score.forward(&pooled)?.squeeze(0)?;
        Ok(logits.to_vec1::<f32>()?)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }
}

/// Row-major `(t, t)` additive mask: causal, and padding keys hidden.
fn attention_bias(attention_mask: &[u32]) -> Vec<f32> {
    let t = attention_mask.len();
    let mut bias = vec![0f32; t * t];
    for query in 0..t {
        for key in 0..t {
            if key > query || attention_mask[key] == 0 {
                bias[query * t + key] = f32::MIN;
            }
        }
    }
    bias
}

/// Position the head reads from.
///
/// With a pad id, the rightmost token that is not padding (0 if every
/// token is padding). Without one, the last position.
fn last_token_index(input: &EncodedInput, pad_token_id: Option<u32>) -> usize {
    let len = input.input_ids.len();
    match pad_token_id {
        Some(pad) => input
            .input_ids
            .iter()
            .rposition(|&id| id != pad)
            .unwrap_or(0),
        None => len.saturating_sub(1),
    }
}

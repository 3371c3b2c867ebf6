//! End-to-end tests against the candle backend with tiny BERT and Llama
//! checkpoints written to a tempdir.
//!
//! The BERT classification head has zero weights, so the logits equal the
//! head bias no matter what the encoder computes. That keeps expectations
//! exact while still running every layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use scaudit_core::engine::{CandleBackend, HfTokenizer, PredictParams, ServeDevice};
use scaudit_core::models::{ModelServer, ServeError};
use tempfile::TempDir;

const HIDDEN: usize = 8;
const INTERMEDIATE: usize = 16;
const VOCAB: usize = 8;
const MAX_POSITIONS: usize = 16;
const NUM_LABELS: usize = 7;

const HEAD_BIAS: [f32; NUM_LABELS] = [10.0, -10.0, 0.0, 0.0, 0.0, 0.0, 0.0];

fn config_json() -> serde_json::Value {
    serde_json::json!({
        "model_type": "bert",
        "vocab_size": VOCAB,
        "hidden_size": HIDDEN,
        "num_hidden_layers": 1,
        "num_attention_heads": 2,
        "intermediate_size": INTERMEDIATE,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.0,
        "max_position_embeddings": MAX_POSITIONS,
        "type_vocab_size": 2,
        "initializer_range": 0.02,
        "layer_norm_eps": 1e-12,
        "pad_token_id": 0
    })
}

fn tokenizer_json() -> serde_json::Value {
    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {
                "[PAD]": 0, "[UNK]": 1, "[SEP]": 2, "contract": 3,
                "function": 4, "withdraw": 5, "call": 6, "balance": 7
            },
            "unk_token": "[UNK]"
        }
    })
}

fn randn(shape: &[usize]) -> Tensor {
    Tensor::randn(0f32, 0.02, shape, &Device::Cpu).unwrap()
}

fn zeros(shape: &[usize]) -> Tensor {
    Tensor::zeros(shape, DType::F32, &Device::Cpu).unwrap()
}

fn ones(shape: &[usize]) -> Tensor {
    Tensor::ones(shape, DType::F32, &Device::Cpu).unwrap()
}

fn encoder_tensors() -> HashMap<String, Tensor> {
    let mut t = HashMap::new();
    let mut put = |name: &str, tensor: Tensor| {
        t.insert(name.to_string(), tensor);
    };

    put("bert.embeddings.word_embeddings.weight", randn(&[VOCAB, HIDDEN]));
    put("bert.embeddings.position_embeddings.weight", randn(&[MAX_POSITIONS, HIDDEN]));
    put("bert.embeddings.token_type_embeddings.weight", randn(&[2, HIDDEN]));
    put("bert.embeddings.LayerNorm.weight", ones(&[HIDDEN]));
    put("bert.embeddings.LayerNorm.bias", zeros(&[HIDDEN]));

    let layer = "bert.encoder.layer.0";
    for proj in ["query", "key", "value"] {
        put(&format!("{layer}.attention.self.{proj}.weight"), randn(&[HIDDEN, HIDDEN]));
        put(&format!("{layer}.attention.self.{proj}.bias"), zeros(&[HIDDEN]));
    }
    put(&format!("{layer}.attention.output.dense.weight"), randn(&[HIDDEN, HIDDEN]));
    put(&format!("{layer}.attention.output.dense.bias"), zeros(&[HIDDEN]));
    put(&format!("{layer}.attention.output.LayerNorm.weight"), ones(&[HIDDEN]));
    put(&format!("{layer}.attention.output.LayerNorm.bias"), zeros(&[HIDDEN]));
    put(&format!("{layer}.intermediate.dense.weight"), randn(&[INTERMEDIATE, HIDDEN]));
    put(&format!("{layer}.intermediate.dense.bias"), zeros(&[INTERMEDIATE]));
    put(&format!("{layer}.output.dense.weight"), randn(&[HIDDEN, INTERMEDIATE]));
    put(&format!("{layer}.output.dense.bias"), zeros(&[HIDDEN]));
    put(&format!("{layer}.output.LayerNorm.weight"), ones(&[HIDDEN]));
    put(&format!("{layer}.output.LayerNorm.bias"), zeros(&[HIDDEN]));
    t
}

/// A zero-weight head whose logits are always `bias`.
fn head(outputs: usize, bias: &[f32]) -> [(String, Tensor); 2] {
    [
        ("classifier.weight".to_string(), zeros(&[outputs, HIDDEN])),
        (
            "classifier.bias".to_string(),
            Tensor::new(bias, &Device::Cpu).unwrap(),
        ),
    ]
}

fn write_model(tensors: HashMap<String, Tensor>) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.json"), config_json().to_string()).unwrap();
    std::fs::write(dir.path().join("tokenizer.json"), tokenizer_json().to_string()).unwrap();
    candle_core::safetensors::save(&tensors, dir.path().join("model.safetensors")).unwrap();
    dir
}

fn model_with_head(bias: &[f32]) -> TempDir {
    let mut tensors = encoder_tensors();
    tensors.extend(head(bias.len(), bias));
    write_model(tensors)
}

fn write_adapter(config: serde_json::Value, tensors: HashMap<String, Tensor>) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("adapter_config.json"), config.to_string()).unwrap();
    candle_core::safetensors::save(&tensors, dir.path().join("adapter_model.safetensors")).unwrap();
    dir
}

fn lora_config() -> serde_json::Value {
    serde_json::json!({
        "peft_type": "LORA",
        "r": 2,
        "lora_alpha": 4,
        "target_modules": ["query", "value"],
        "modules_to_save": ["classifier"]
    })
}

fn server(base: &Path, adapter: Option<PathBuf>) -> ModelServer<CandleBackend> {
    ModelServer::new(CandleBackend::new(), ServeDevice::cpu(), base.to_path_buf(), adapter)
}

fn assert_fixed_probs(probs: &[f32]) {
    assert_eq!(probs.len(), NUM_LABELS);
    assert!((probs[0] - 0.99995).abs() < 1e-4);
    assert!(probs[1] < 1e-4);
    for p in &probs[2..] {
        assert!((p - 0.5).abs() < 1e-6);
    }
}

#[test]
fn test_head_bias_drives_prediction() {
    let base = model_with_head(&HEAD_BIAS);
    let server = server(base.path(), None);
    server.load(None, None).unwrap();

    let prediction = server
        .predict("contract withdraw call balance", PredictParams::default())
        .unwrap();
    assert_fixed_probs(&prediction.probs);
    assert_eq!(prediction.labels.len(), 6);

    let status = server.status();
    assert!(status.loaded);
    assert_eq!(status.device, "cpu");
}

#[test]
fn test_unknown_words_and_truncation() {
    let base = model_with_head(&HEAD_BIAS);
    let server = server(base.path(), None);
    server.load(None, None).unwrap();

    let prediction = server
        .predict("pragma solidity unknown tokens everywhere", PredictParams::new(0.5, 2))
        .unwrap();
    assert_fixed_probs(&prediction.probs);
}

#[test]
fn test_missing_head_is_initialized() {
    let base = write_model(encoder_tensors());
    let server = server(base.path(), None);
    server.load(None, None).unwrap();

    let prediction = server.predict("contract", PredictParams::default()).unwrap();
    assert_eq!(prediction.probs.len(), NUM_LABELS);
    // Small random head: every probability sits near one half.
    assert!(prediction.probs.iter().all(|p| (p - 0.5).abs() < 0.1));
}

#[test]
fn test_wrong_head_width_fails_load() {
    let base = model_with_head(&[1.0, -1.0]);
    let server = server(base.path(), None);

    let err = server.load(None, None).unwrap_err();
    assert!(matches!(&err, ServeError::LoadFailed(m) if m.contains("classification head has 2 outputs, expected 7")));
    assert!(!server.status().loaded);
}

#[test]
fn test_missing_tokenizer_fails_load() {
    let base = model_with_head(&HEAD_BIAS);
    std::fs::remove_file(base.path().join("tokenizer.json")).unwrap();
    let server = server(base.path(), None);

    let err = server.load(None, None).unwrap_err();
    assert!(err.message().contains("tokenizer.json"));
}

#[test]
fn test_adapter_head_replaces_base_head() {
    let base = model_with_head(&[0.0; NUM_LABELS]);

    let mut adapter_tensors = HashMap::new();
    for (name, tensor) in head(NUM_LABELS, &HEAD_BIAS) {
        let name = name.replace("classifier.", "classifier.modules_to_save.default.");
        adapter_tensors.insert(format!("base_model.model.{name}"), tensor);
    }
    let q = "base_model.model.bert.encoder.layer.0.attention.self.query";
    adapter_tensors.insert(format!("{q}.lora_A.weight"), randn(&[2, HIDDEN]));
    adapter_tensors.insert(format!("{q}.lora_B.weight"), randn(&[HIDDEN, 2]));
    let adapter = write_adapter(lora_config(), adapter_tensors);

    let server = server(base.path(), Some(adapter.path().to_path_buf()));
    let report = server.load(None, None).unwrap();
    assert!(report.adapter_applied);
    assert!(server.status().adapter_applied);

    let prediction = server.predict("contract withdraw", PredictParams::default()).unwrap();
    assert_fixed_probs(&prediction.probs);
}

#[test]
fn test_unsupported_adapter_falls_back_to_base() {
    let base = model_with_head(&HEAD_BIAS);
    let mut config = lora_config();
    config["peft_type"] = serde_json::json!("IA3");
    let adapter = write_adapter(config, HashMap::from(head(NUM_LABELS, &[0.0; NUM_LABELS])));

    let server = server(base.path(), Some(adapter.path().to_path_buf()));
    let report = server.load(None, None).unwrap();
    assert!(!report.adapter_applied);

    let status = server.status();
    assert!(status.loaded);
    assert!(!status.adapter_applied);
    assert_eq!(status.adapter_path.as_deref(), Some(adapter.path()));

    let prediction = server.predict("contract", PredictParams::default()).unwrap();
    assert_fixed_probs(&prediction.probs);
}

#[test]
fn test_reload_swaps_checkpoints() {
    let first = model_with_head(&HEAD_BIAS);
    let second = model_with_head(&[-10.0; NUM_LABELS]);
    let server = server(first.path(), None);
    server.load(None, None).unwrap();
    assert_eq!(
        server.predict("contract", PredictParams::default()).unwrap().labels.len(),
        6
    );

    server.load(Some(second.path().to_path_buf()), None).unwrap();
    assert!(server
        .predict("contract", PredictParams::default())
        .unwrap()
        .labels
        .is_empty());

    server.teardown();
    assert!(!server.status().loaded);
}

// Llama layout: bias-free `score` head, no pad token in the tokenizer.

const KV_HEADS: usize = 1;
const HEAD_DIM: usize = 4;
const EOS: &str = "<|end_of_text|>";

fn llama_config_json() -> serde_json::Value {
    serde_json::json!({
        "model_type": "llama",
        "vocab_size": VOCAB,
        "hidden_size": HIDDEN,
        "intermediate_size": INTERMEDIATE,
        "num_hidden_layers": 1,
        "num_attention_heads": 2,
        "num_key_value_heads": KV_HEADS,
        "hidden_act": "silu",
        "max_position_embeddings": MAX_POSITIONS,
        "rms_norm_eps": 1e-5,
        "rope_theta": 500000.0,
        "rope_scaling": {
            "factor": 32.0,
            "high_freq_factor": 4.0,
            "low_freq_factor": 1.0,
            "original_max_position_embeddings": 8,
            "rope_type": "llama3"
        },
        "attention_bias": false,
        "mlp_bias": false,
        "tie_word_embeddings": true,
        "bos_token_id": 0,
        "eos_token_id": 1
    })
}

/// Word-level vocabulary with a BOS template and no padding configured.
fn llama_tokenizer_json() -> serde_json::Value {
    let bos = serde_json::json!({ "SpecialToken": { "id": "<|begin_of_text|>", "type_id": 0 } });
    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [bos, { "Sequence": { "id": "A", "type_id": 0 } }],
            "pair": [
                bos,
                { "Sequence": { "id": "A", "type_id": 0 } },
                bos,
                { "Sequence": { "id": "B", "type_id": 1 } }
            ],
            "special_tokens": {
                "<|begin_of_text|>": {
                    "id": "<|begin_of_text|>",
                    "ids": [0],
                    "tokens": ["<|begin_of_text|>"]
                }
            }
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {
                "<|begin_of_text|>": 0, "<|end_of_text|>": 1, "<unk>": 2, "contract": 3,
                "function": 4, "withdraw": 5, "call": 6, "balance": 7
            },
            "unk_token": "<unk>"
        }
    })
}

fn randn_std(shape: &[usize], std: f32) -> Tensor {
    Tensor::randn(0f32, std, shape, &Device::Cpu).unwrap()
}

fn decoder_tensors() -> HashMap<String, Tensor> {
    let kv = KV_HEADS * HEAD_DIM;
    let mut t = HashMap::new();
    let mut put = |name: &str, tensor: Tensor| {
        t.insert(name.to_string(), tensor);
    };

    put("model.embed_tokens.weight", randn_std(&[VOCAB, HIDDEN], 1.0));
    let layer = "model.layers.0";
    put(&format!("{layer}.input_layernorm.weight"), ones(&[HIDDEN]));
    put(&format!("{layer}.self_attn.q_proj.weight"), randn(&[HIDDEN, HIDDEN]));
    put(&format!("{layer}.self_attn.k_proj.weight"), randn(&[kv, HIDDEN]));
    put(&format!("{layer}.self_attn.v_proj.weight"), randn(&[kv, HIDDEN]));
    put(&format!("{layer}.self_attn.o_proj.weight"), randn(&[HIDDEN, HIDDEN]));
    put(&format!("{layer}.post_attention_layernorm.weight"), ones(&[HIDDEN]));
    put(&format!("{layer}.mlp.gate_proj.weight"), randn(&[INTERMEDIATE, HIDDEN]));
    put(&format!("{layer}.mlp.up_proj.weight"), randn(&[INTERMEDIATE, HIDDEN]));
    put(&format!("{layer}.mlp.down_proj.weight"), randn(&[HIDDEN, INTERMEDIATE]));
    put("model.norm.weight", ones(&[HIDDEN]));
    put("lm_head.weight", randn(&[VOCAB, HIDDEN]));
    t
}

fn write_llama(score: Option<Tensor>) -> TempDir {
    let mut tensors = decoder_tensors();
    if let Some(score) = score {
        tensors.insert("score.weight".to_string(), score);
    }
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.json"), llama_config_json().to_string()).unwrap();
    std::fs::write(dir.path().join("tokenizer.json"), llama_tokenizer_json().to_string()).unwrap();
    std::fs::write(
        dir.path().join("tokenizer_config.json"),
        serde_json::json!({
            "bos_token": "<|begin_of_text|>",
            "eos_token": EOS,
            "pad_token": null
        })
        .to_string(),
    )
    .unwrap();
    candle_core::safetensors::save(&tensors, dir.path().join("model.safetensors")).unwrap();
    dir
}

#[test]
fn test_llama_pads_with_eos_and_classifies() {
    let base = write_llama(Some(zeros(&[NUM_LABELS, HIDDEN])));
    assert_eq!(HfTokenizer::from_dir(base.path()).unwrap().pad_token(), Some(EOS));

    let server = server(base.path(), None);
    server.load(None, None).unwrap();

    // Zero score head: every logit is 0, every probability exactly one half.
    let prediction = server
        .predict("contract withdraw call balance", PredictParams::default())
        .unwrap();
    assert_eq!(prediction.probs, vec![0.5; NUM_LABELS]);
    assert_eq!(prediction.labels.len(), NUM_LABELS);
}

#[test]
fn test_llama_reads_last_token() {
    let base = write_llama(Some(randn_std(&[NUM_LABELS, HIDDEN], 1.0)));
    let server = server(base.path(), None);
    server.load(None, None).unwrap();

    let predict = |text: &str, max_length: usize| {
        server
            .predict(text, PredictParams::new(0.5, max_length))
            .unwrap()
            .probs
    };

    // Same leading tokens, different final token: different scores.
    let contract = predict("contract", 16);
    let withdraw = predict("withdraw", 16);
    let spread = contract
        .iter()
        .zip(&withdraw)
        .map(|(a, b)| (a - b).abs())
        .fold(0f32, f32::max);
    assert!(spread > 1e-3, "scores did not depend on the last token");

    // Causal: truncating to the first two words matches encoding just those.
    assert_eq!(predict("contract withdraw call balance", 3), predict("contract withdraw", 16));
}

#[test]
fn test_llama_missing_score_head_is_initialized() {
    let base = write_llama(None);
    let server = server(base.path(), None);
    server.load(None, None).unwrap();

    let prediction = server.predict("contract call", PredictParams::default()).unwrap();
    assert_eq!(prediction.probs.len(), NUM_LABELS);
    assert!(prediction.probs.iter().all(|p| *p > 0.0 && *p < 1.0));
}

#[test]
fn test_llama_max_length_below_special_tokens_is_client_error() {
    let base = write_llama(Some(zeros(&[NUM_LABELS, HIDDEN])));
    let server = server(base.path(), None);
    server.load(None, None).unwrap();

    let err = server
        .predict("contract", PredictParams::new(0.5, 1))
        .unwrap_err();
    assert!(matches!(&err, ServeError::InvalidInput(m) if m.contains("special tokens")));

    // The tokenizer still works at a usable length.
    assert!(server.predict("contract", PredictParams::new(0.5, 2)).is_ok());
}

#[test]
fn test_llama_adapter_merges_attention_and_score() {
    let base = write_llama(Some(zeros(&[NUM_LABELS, HIDDEN])));

    let mut adapter_tensors = HashMap::new();
    adapter_tensors.insert(
        "base_model.model.score.modules_to_save.default.weight".to_string(),
        randn_std(&[NUM_LABELS, HIDDEN], 1.0),
    );
    let q = "base_model.model.model.layers.0.self_attn.q_proj";
    adapter_tensors.insert(format!("{q}.lora_A.weight"), randn(&[2, HIDDEN]));
    adapter_tensors.insert(format!("{q}.lora_B.weight"), randn(&[HIDDEN, 2]));
    let mut config = lora_config();
    config["target_modules"] = serde_json::json!(["q_proj", "v_proj"]);
    config["modules_to_save"] = serde_json::json!(["score"]);
    let adapter = write_adapter(config, adapter_tensors);

    let server = server(base.path(), Some(adapter.path().to_path_buf()));
    let report = server.load(None, None).unwrap();
    assert!(report.adapter_applied);

    let prediction = server.predict("contract withdraw", PredictParams::default()).unwrap();
    assert!(prediction.probs.iter().any(|p| (p - 0.5).abs() > 1e-3));
}

#[test]
fn test_unsupported_decoder_type_fails_load() {
    let base = write_llama(None);
    let mut config = llama_config_json();
    config["model_type"] = serde_json::json!("gpt2");
    std::fs::write(base.path().join("config.json"), config.to_string()).unwrap();

    let server = server(base.path(), None);
    let err = server.load(None, None).unwrap_err();
    assert!(matches!(&err, ServeError::LoadFailed(m) if m.contains("unsupported model_type 'gpt2'")));
}

//! HuggingFace tokenizer wrapper.
//!
//! Loads `tokenizer.json` from a model directory and applies per-call
//! truncation. A tokenizer without a padding token pads with its
//! end-of-sequence token. Padding never extends past the longest sequence
//! of a call, so `max_length` bounds every encoding.

use std::path::Path;

use tokenizers::{PaddingParams, PaddingStrategy, PostProcessor, Tokenizer, TruncationParams};

use super::error::InferenceError;
use super::{EncodedInput, TextEncoder};

/// EOS spellings probed when `tokenizer_config.json` does not name one.
const FALLBACK_EOS_TOKENS: &[&str] = &["</s>", "<|end_of_text|>", "<|endoftext|>", "<eos>", "[SEP]"];

/// Special tokens declared in `tokenizer_config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialTokens {
    pub eos_token: Option<String>,
    pub pad_token: Option<String>,
}

impl SpecialTokens {
    /// Read special tokens from a model directory. A missing config file is
    /// not an error; a malformed one is.
    pub fn read(dir: &Path) -> Result<Self, InferenceError> {
        let path = dir.join("tokenizer_config.json");
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            InferenceError::Tokenizer(format!("{}: {}", path.display(), e))
        })?;
        Ok(Self {
            eos_token: token_field(&value, "eos_token"),
            pad_token: token_field(&value, "pad_token"),
        })
    }
}

/// Token entries are either a bare string or an object with `content`.
fn token_field(value: &serde_json::Value, key: &str) -> Option<String> {
    match value.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(obj) => obj.get("content")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// Tokenizer installed alongside a model.
pub struct HfTokenizer {
    inner: Tokenizer,
    pad_token: Option<String>,
    truncation: Option<usize>,
}

impl HfTokenizer {
    /// Load `tokenizer.json` (and optional `tokenizer_config.json`) from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, InferenceError> {
        let path = dir.join("tokenizer.json");
        let inner = Tokenizer::from_file(&path)
            .map_err(|e| InferenceError::Tokenizer(format!("{}: {}", path.display(), e)))?;
        let special = SpecialTokens::read(dir)?;
        Ok(Self::new(inner, &special))
    }

    /// Wrap an already-built tokenizer, installing a padding token if it has none.
    pub fn new(mut inner: Tokenizer, special: &SpecialTokens) -> Self {
        let pad_token = match inner.get_padding_mut() {
            Some(padding) => {
                // Fixed-length padding would outgrow the truncation limit.
                padding.strategy = PaddingStrategy::BatchLongest;
                padding.pad_to_multiple_of = None;
                Some(padding.pad_token.clone())
            }
            None => {
                let pad = resolve_pad_token(&inner, special);
                match &pad {
                    Some((token, id)) => {
                        inner.with_padding(Some(PaddingParams {
                            strategy: PaddingStrategy::BatchLongest,
                            pad_id: *id,
                            pad_token: token.clone(),
                            ..Default::default()
                        }));
                    }
                    None => tracing::warn!("tokenizer has no pad or eos token; padding disabled"),
                }
                pad.map(|(token, _)| token)
            }
        };
        Self { inner, pad_token, truncation: None }
    }

    /// Token used for padding, if any.
    pub fn pad_token(&self) -> Option<&str> {
        self.pad_token.as_deref()
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Tokens the post-processor adds around a single sequence.
    fn special_token_count(&self) -> usize {
        self.inner
            .get_post_processor()
            .map(|p| p.added_tokens(false))
            .unwrap_or(0)
    }

    fn set_truncation(&mut self, max_length: usize) -> Result<(), InferenceError> {
        if self.truncation == Some(max_length) {
            return Ok(());
        }
        let special = self.special_token_count();
        if max_length <= special {
            return Err(InferenceError::InputValidation(format!(
                "max_length {} leaves no room for text after {} special tokens",
                max_length, special
            )));
        }
        self.inner
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;
        self.truncation = Some(max_length);
        Ok(())
    }
}

/// Explicit pad token first, then EOS.
fn resolve_pad_token(tokenizer: &Tokenizer, special: &SpecialTokens) -> Option<(String, u32)> {
    let lookup = |token: &str| tokenizer.token_to_id(token).map(|id| (token.to_string(), id));

    if let Some(found) = special.pad_token.as_deref().and_then(lookup) {
        return Some(found);
    }
    if let Some(found) = special.eos_token.as_deref().and_then(lookup) {
        return Some(found);
    }
    FALLBACK_EOS_TOKENS.iter().find_map(|t| lookup(t))
}

impl TextEncoder for HfTokenizer {
    fn encode(&mut self, text: &str, max_length: usize) -> Result<EncodedInput, InferenceError> {
        self.set_truncation(max_length)?;
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;
        Ok(EncodedInput {
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
            type_ids: encoding.get_type_ids().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tokenizer(dir: &Path, vocab: &[&str]) {
        write_tokenizer_with(dir, vocab, serde_json::Value::Null, serde_json::Value::Null);
    }

    fn write_tokenizer_with(
        dir: &Path,
        vocab: &[&str],
        padding: serde_json::Value,
        post_processor: serde_json::Value,
    ) {
        let vocab: serde_json::Map<String, serde_json::Value> = vocab
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), serde_json::json!(i)))
            .collect();
        let json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": padding,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": post_processor,
            "decoder": null,
            "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]" }
        });
        std::fs::write(dir.join("tokenizer.json"), json.to_string()).unwrap();
    }

    #[test]
    fn test_missing_tokenizer_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            HfTokenizer::from_dir(dir.path()),
            Err(InferenceError::Tokenizer(_))
        ));
    }

    #[test]
    fn test_pad_defaults_to_fallback_eos() {
        let dir = tempfile::tempdir().unwrap();
        write_tokenizer(dir.path(), &["[UNK]", "</s>", "pragma", "solidity"]);
        let tokenizer = HfTokenizer::from_dir(dir.path()).unwrap();
        assert_eq!(tokenizer.pad_token(), Some("</s>"));
    }

    #[test]
    fn test_pad_defaults_to_configured_eos() {
        let dir = tempfile::tempdir().unwrap();
        write_tokenizer(dir.path(), &["[UNK]", "<|eot|>", "pragma"]);
        std::fs::write(
            dir.path().join("tokenizer_config.json"),
            r#"{"eos_token": {"content": "<|eot|>"}, "pad_token": null}"#,
        )
        .unwrap();
        let tokenizer = HfTokenizer::from_dir(dir.path()).unwrap();
        assert_eq!(tokenizer.pad_token(), Some("<|eot|>"));
    }

    #[test]
    fn test_explicit_pad_token_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_tokenizer(dir.path(), &["[UNK]", "</s>", "[PAD]"]);
        std::fs::write(
            dir.path().join("tokenizer_config.json"),
            r#"{"eos_token": "</s>", "pad_token": "[PAD]"}"#,
        )
        .unwrap();
        let tokenizer = HfTokenizer::from_dir(dir.path()).unwrap();
        assert_eq!(tokenizer.pad_token(), Some("[PAD]"));
    }

    #[test]
    fn test_encode_truncates_to_max_length() {
        let dir = tempfile::tempdir().unwrap();
        write_tokenizer(dir.path(), &["[UNK]", "</s>", "a", "b"]);
        let mut tokenizer = HfTokenizer::from_dir(dir.path()).unwrap();

        let full = tokenizer.encode("a b a b a", 512).unwrap();
        assert_eq!(full.input_ids, vec![2, 3, 2, 3, 2]);
        assert_eq!(full.attention_mask, vec![1; 5]);

        let short = tokenizer.encode("a b a b a", 3).unwrap();
        assert_eq!(short.input_ids, vec![2, 3, 2]);
        assert_eq!(short.type_ids.len(), 3);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let dir = tempfile::tempdir().unwrap();
        write_tokenizer(dir.path(), &["[UNK]", "</s>", "a"]);
        let mut tokenizer = HfTokenizer::from_dir(dir.path()).unwrap();
        let encoded = tokenizer.encode("a zzz", 16).unwrap();
        assert_eq!(encoded.input_ids, vec![2, 0]);
        assert_eq!(tokenizer.vocab_size(), 3);
    }

    #[test]
    fn test_fixed_padding_does_not_exceed_max_length() {
        let dir = tempfile::tempdir().unwrap();
        write_tokenizer_with(
            dir.path(),
            &["[UNK]", "</s>", "a", "b"],
            serde_json::json!({
                "strategy": { "Fixed": 16 },
                "direction": "Right",
                "pad_to_multiple_of": 8,
                "pad_id": 1,
                "pad_type_id": 0,
                "pad_token": "</s>"
            }),
            serde_json::Value::Null,
        );
        let mut tokenizer = HfTokenizer::from_dir(dir.path()).unwrap();
        assert_eq!(tokenizer.pad_token(), Some("</s>"));

        let encoded = tokenizer.encode("a b", 4).unwrap();
        assert_eq!(encoded.input_ids, vec![2, 3]);
        assert_eq!(encoded.attention_mask, vec![1, 1]);
    }

    #[test]
    fn test_max_length_must_leave_room_for_text() {
        let dir = tempfile::tempdir().unwrap();
        write_tokenizer_with(
            dir.path(),
            &["[UNK]", "[PAD]", "[CLS]", "[SEP]", "a"],
            serde_json::Value::Null,
            serde_json::json!({
                "type": "BertProcessing",
                "sep": ["[SEP]", 3],
                "cls": ["[CLS]", 2]
            }),
        );
        let mut tokenizer = HfTokenizer::from_dir(dir.path()).unwrap();

        for max_length in [1, 2] {
            let err = tokenizer.encode("a a a", max_length).unwrap_err();
            assert!(err.is_client_error(), "{err}");
            assert!(err.to_string().contains("special tokens"));
        }

        let encoded = tokenizer.encode("a a a", 3).unwrap();
        assert_eq!(encoded.input_ids, vec![2, 4, 3]);
    }
}

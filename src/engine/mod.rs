//! Inference engine module.
//!
//! Defines the backend seam the model server drives during a load
//! ([`ModelBackend`]), the handles it installs ([`SequenceClassifier`],
//! [`TextEncoder`]), and the prediction pipeline that turns logits into labels.

pub mod candle;
pub mod device;
pub mod error;
pub mod input;
pub mod output;
pub mod pipeline;

mod tokenizer;

use std::path::Path;

pub use self::candle::CandleBackend;
pub use device::{DeviceKind, DevicePreference, ServeDevice};
pub use error::InferenceError;
pub use input::{validate_text, PredictParams};
pub use input::{DEFAULT_MAX_LENGTH, DEFAULT_THRESHOLD, MAX_SEQUENCE_LENGTH, MAX_TEXT_BYTES};
pub use output::Prediction;
pub use pipeline::{classify, select_labels, sigmoid};
pub use tokenizer::HfTokenizer;

/// Token ids and masks for one encoded sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedInput {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub type_ids: Vec<u32>,
}

impl EncodedInput {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Text encoder installed alongside a model.
pub trait TextEncoder: Send {
    /// Encode one sequence, truncated to at most `max_length` tokens.
    fn encode(&mut self, text: &str, max_length: usize) -> Result<EncodedInput, InferenceError>;
}

/// A model bound to a device, ready for forward passes.
pub trait SequenceClassifier: Send {
    /// Raw classification-head scores, one per output unit.
    fn forward(&self, input: &EncodedInput) -> Result<Vec<f32>, InferenceError>;

    /// Number of output units of the classification head.
    fn num_labels(&self) -> usize;
}

/// Knows how to build the model and tokenizer handles for a load.
///
/// Each method is one step of a load; the model server calls them in order
/// and only installs the results once every fatal step has succeeded.
pub trait ModelBackend: Send + Sync {
    /// Resolved model configuration.
    type Config: Send;
    /// Host-side weights before device binding.
    type Weights: Send;
    type Model: SequenceClassifier;
    type Tokenizer: TextEncoder;

    /// Resolve the configuration for multi-label classification with
    /// `num_labels` outputs.
    fn resolve_config(
        &self,
        base_path: &Path,
        num_labels: usize,
    ) -> Result<Self::Config, InferenceError>;

    /// Read the base classification model weights.
    fn load_base(
        &self,
        base_path: &Path,
        config: &Self::Config,
    ) -> Result<Self::Weights, InferenceError>;

    /// Compose an adapter onto the base weights. Implementations must leave
    /// `weights` untouched when they return an error.
    fn apply_adapter(
        &self,
        weights: &Self::Weights,
        config: &Self::Config,
        adapter_path: &Path,
    ) -> Result<Self::Weights, InferenceError>;

    /// Move weights to the device and build an inference-mode model.
    fn bind(
        &self,
        weights: Self::Weights,
        config: &Self::Config,
        device: &ServeDevice,
    ) -> Result<Self::Model, InferenceError>;

    /// Build the tokenizer shipped with the base model.
    fn load_tokenizer(&self, base_path: &Path) -> Result<Self::Tokenizer, InferenceError>;

    /// Release a retired model and return its device memory.
    fn release(&self, model: Self::Model, tokenizer: Self::Tokenizer, device: &ServeDevice) {
        drop(model);
        drop(tokenizer);
        if let Err(e) = device.synchronize() {
            tracing::warn!(error = %e, "device synchronize after release failed");
        }
    }
}

//! Sequence classifiers built by the candle backend.

use candle_core::{Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};

use super::config::{Architecture, ClassifierConfig};
use super::decoder::DecoderSequenceClassifier;
use crate::engine::{EncodedInput, InferenceError, SequenceClassifier};

/// Classifier for whichever architecture the checkpoint declares.
pub enum CandleClassifier {
    Bert(BertSequenceClassifier),
    Decoder(DecoderSequenceClassifier),
}

impl CandleClassifier {
    pub fn load(vb: VarBuilder, config: &ClassifierConfig) -> Result<Self, InferenceError> {
        match &config.architecture {
            Architecture::Bert(encoder) => {
                BertSequenceClassifier::load(vb, config, encoder).map(Self::Bert)
            }
            Architecture::Decoder(decoder) => {
                DecoderSequenceClassifier::load(vb, config, decoder).map(Self::Decoder)
            }
        }
    }
}

impl SequenceClassifier for CandleClassifier {
    fn forward(&self, input: &EncodedInput) -> Result<Vec<f32>, InferenceError> {
        match self {
            Self::Bert(model) => model.forward(input),
            Self::Decoder(model) => model.forward(input),
        }
    }

    fn num_labels(&self) -> usize {
        match self {
            Self::Bert(model) => model.num_labels(),
            Self::Decoder(model) => model.num_labels(),
        }
    }
}

/// BERT encoder with a pooler and a linear multi-label head, bound to one
/// device.
///
/// Built from a `VarBuilder` over plain tensors, so no gradient tracking
/// is ever attached.
pub struct BertSequenceClassifier {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    num_labels: usize,
    device: Device,
}

impl BertSequenceClassifier {
    pub fn load(
        vb: VarBuilder,
        config: &ClassifierConfig,
        encoder: &BertConfig,
    ) -> Result<Self, InferenceError> {
        let device = vb.device().clone();
        let hidden = config.hidden_size;
        let bert = BertModel::load(vb.pp("bert"), encoder)?;
        let pooler = candle_nn::linear(hidden, hidden, vb.pp("bert.pooler.dense"))?;
        let classifier = candle_nn::linear(hidden, config.num_labels, vb.pp("classifier"))?;
        Ok(Self {
            bert,
            pooler,
            classifier,
            num_labels: config.num_labels,
            device,
        })
    }

    fn row(&self, values: &[u32]) -> Result<Tensor, InferenceError> {
        Ok(Tensor::new(values, &self.device)?.unsqueeze(0)?)
    }
}

impl SequenceClassifier for BertSequenceClassifier {
    fn forward(&self, input: &EncodedInput) -> Result<Vec<f32>, InferenceError> {
        if input.is_empty() {
            return Err(InferenceError::InputValidation("text produced no tokens".into()));
        }
        let ids = self.row(&input.input_ids)?;
        let types = self.row(&input.type_ids)?;
        let mask = self.row(&input.attention_mask)?;

        let hidden = self.bert.forward(&ids, &types, Some(&mask))?;
        // [CLS] position
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?.squeeze(0)?;
        Ok(logits.to_vec1::<f32>()?)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }
}

//! Prediction pipeline: encode, forward, sigmoid, threshold.

use crate::labels::LabelSet;

use super::error::InferenceError;
use super::input::PredictParams;
use super::output::Prediction;
use super::{SequenceClassifier, TextEncoder};

/// Logistic function, `1 / (1 + e^-x)`.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Texts of the labels whose probability is at or above `threshold`.
pub fn select_labels(probs: &[f32], labels: &LabelSet, threshold: f32) -> Vec<String> {
    probs
        .iter()
        .enumerate()
        .filter(|(_, p)| **p >= threshold)
        .filter_map(|(i, _)| labels.get(i).map(|l| l.text()))
        .collect()
}

/// Run one text through a loaded model and tokenizer.
///
/// The logit count must equal the label count; anything else means the
/// installed head does not match the label set.
pub fn classify<M, T>(
    model: &M,
    tokenizer: &mut T,
    labels: &LabelSet,
    text: &str,
    params: &PredictParams,
) -> Result<Prediction, InferenceError>
where
    M: SequenceClassifier + ?Sized,
    T: TextEncoder + ?Sized,
{
    params.validate()?;

    let encoded = tokenizer.encode(text, params.max_length)?;
    if encoded.is_empty() {
        return Err(InferenceError::InputValidation("text produced no tokens".into()));
    }
    tracing::debug!(tokens = encoded.len(), "encoded input");

    let logits = model.forward(&encoded)?;
    if logits.len() != labels.len() {
        return Err(InferenceError::ShapeMismatch {
            expected: labels.len(),
            actual: logits.len(),
        });
    }

    let probs: Vec<f32> = logits.iter().copied().map(sigmoid).collect();
    let matched = select_labels(&probs, labels, params.threshold);
    Ok(Prediction { labels: matched, probs })
}

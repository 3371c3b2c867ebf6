//! Prediction output types.

use serde::{Deserialize, Serialize};

/// Result of one multi-label prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Published text of every label whose probability met the threshold,
    /// in label-set order.
    pub labels: Vec<String>,
    /// Sigmoid probability per label, in label-set order.
    pub probs: Vec<f32>,
}

impl Prediction {
    /// Labels paired with their probabilities, highest first.
    pub fn ranked(&self, label_texts: &[String]) -> Vec<(String, f32)> {
        let mut pairs: Vec<(String, f32)> = label_texts
            .iter()
            .cloned()
            .zip(self.probs.iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

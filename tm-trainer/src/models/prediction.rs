//! Prediction request and normalized result

use serde::{Deserialize, Serialize};

/// Image to classify against the latest trained model
#[derive(Debug, Clone)]
pub struct PredictionRequest {
    pub image: Vec<u8>,
    /// Caller's enhancement choice; `None` uses the choice made at training time
    pub enhance_images: Option<bool>,
}

/// One class score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelConfidence {
    #[serde(rename = "class")]
    pub label: String,
    /// Percentage in 0..=100
    #[serde(rename = "confidence")]
    pub confidence_percent: f64,
}

/// Predictions in provider order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predictions: Vec<LabelConfidence>,
    pub project_id: String,
    pub iteration_id: String,
}

/// Map a provider probability (0..=1) to a percentage, clamped to 0..=100
pub fn probability_to_percent(probability: f64) -> f64 {
    (probability * 100.0).clamp(0.0, 100.0)
}

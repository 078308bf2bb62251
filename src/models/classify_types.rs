use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Confidence below this percentage is LOW.
pub const MODERATE_CONFIDENCE: f32 = 50.0;
/// Confidence at or above this percentage is HIGH.
pub const HIGH_CONFIDENCE: f32 = 70.0;

#[derive(Debug, Serialize, Clone)]
pub struct ModelStatus {
    pub ready: bool,
    pub classes: Option<usize>,
    pub model_path: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Prediction {
    #[serde(rename = "name")]
    pub class_name: String,
    /// Percentage, 0..=100.
    pub confidence: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Moderate,
    High,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence < MODERATE_CONFIDENCE {
            ConfidenceTier::Low
        } else if confidence < HIGH_CONFIDENCE {
            ConfidenceTier::Moderate
        } else {
            ConfidenceTier::High
        }
    }

    /// Advisory only: the prediction is still returned.
    pub fn needs_verification(self) -> bool {
        self != ConfidenceTier::High
    }

    pub fn advice(self) -> Option<&'static str> {
        match self {
            ConfidenceTier::Low => Some(
                "The model is uncertain about this prediction. Please verify the result or try a clearer image.",
            ),
            ConfidenceTier::Moderate => {
                Some("Consider verifying this result with additional images.")
            }
            ConfidenceTier::High => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Moderate => "moderate",
            ConfidenceTier::High => "high",
        }
    }
}

/// Outcome of one inference call. Never mutated after creation.
#[derive(Debug, Serialize, Clone)]
pub struct DecisionReport {
    pub class_index: usize,
    pub raw_label: String,
    #[serde(rename = "disease")]
    pub label: String,
    pub confidence: f32,
    pub is_healthy: bool,
    pub tier: ConfidenceTier,
    pub needs_verification: bool,
    pub advice: Option<String>,
    pub top_predictions: Vec<Prediction>,
    pub healthy_confidence: Option<f32>,
    /// Every class in index order.
    pub probabilities: Vec<Prediction>,
}

impl DecisionReport {
    /// Sum of all class probabilities as fractions; ~1.0 for a softmax head.
    pub fn probability_sum(&self) -> f32 {
        self.probabilities.iter().map(|p| p.confidence).sum::<f32>() / 100.0
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ClassifyResult {
    pub file_name: String,
    pub file_path: String,
    pub report: Option<DecisionReport>,
    pub error: Option<AppError>,
}

#[derive(Debug, Serialize, Clone)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub results: Vec<ClassifyResult>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ProbeResult {
    pub label: String,
    pub confidence: f32,
    pub probability_sum: f32,
    pub sum_ok: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct CheckReport {
    pub status: ModelStatus,
    pub labels: Vec<String>,
    pub probe: Option<ProbeResult>,
    pub error: Option<AppError>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.status.ready && self.error.is_none() && self.probe.as_ref().is_some_and(|p| p.sum_ok)
    }
}

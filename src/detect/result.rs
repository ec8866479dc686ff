use serde::Serialize;

/// Raw model output before interpretation.
#[derive(Clone, Debug, PartialEq)]
pub enum RawOutput {
    /// Single sigmoid probability of the positive class.
    Sigmoid(f32),
    /// Per-class scores, index-aligned with the label list.
    Classes(Vec<f32>),
}

impl RawOutput {
    /// Interpret a flat output tensor: one value is a sigmoid scalar, more is a class vector.
    pub fn from_scores(scores: Vec<f32>) -> Option<Self> {
        match scores.len() {
            0 => None,
            1 => Some(RawOutput::Sigmoid(scores[0])),
            _ => Some(RawOutput::Classes(scores)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassScore {
    pub label: String,
    pub confidence: f32,
}

/// Result of classifying one image.
///
/// Serializes to the `detectVest` success payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Positive-class confidence cleared the threshold.
    pub detected: bool,
    /// Positive-class confidence.
    pub confidence: f32,
    pub results: Vec<ClassScore>,
}

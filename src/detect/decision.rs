use serde::Deserialize;

use crate::assets::LabelList;
use crate::error::DetectError;

use super::result::{ClassScore, ClassificationResult, RawOutput};

/// Threshold comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `confidence >= threshold`.
    #[default]
    Inclusive,
    /// `confidence > threshold`, the behavior of models shipped with a fixed 0.5 cutoff.
    Strict,
}

impl Comparison {
    pub fn passes(self, confidence: f32, threshold: f32) -> bool {
        match self {
            Comparison::Inclusive => confidence >= threshold,
            Comparison::Strict => confidence > threshold,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecisionPolicy {
    /// Output index of the "vest present" class.
    pub positive_index: usize,
    pub comparison: Comparison,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            positive_index: 1,
            comparison: Comparison::Inclusive,
        }
    }
}

/// Map raw model output to labeled confidences and a detection decision.
///
/// A sigmoid scalar `p` becomes the two-class vector `[1 - p, p]`.
pub fn decide(
    raw: &RawOutput,
    labels: &LabelList,
    policy: &DecisionPolicy,
    threshold: f32,
) -> Result<ClassificationResult, DetectError> {
    let scores = match raw {
        RawOutput::Sigmoid(p) => {
            if !p.is_finite() {
                return Err(DetectError::Classification);
            }
            let p = p.clamp(0.0, 1.0);
            vec![1.0 - p, p]
        }
        RawOutput::Classes(scores) => {
            if scores.is_empty() || scores.iter().any(|s| !s.is_finite()) {
                return Err(DetectError::Classification);
            }
            scores.clone()
        }
    };

    let Some(&confidence) = scores.get(policy.positive_index) else {
        log::warn!(
            "positive index {} out of range for {} model outputs",
            policy.positive_index,
            scores.len()
        );
        return Err(DetectError::Classification);
    };
    if !labels.is_empty() && labels.len() != scores.len() {
        log::warn!(
            "model produced {} scores for {} labels",
            scores.len(),
            labels.len()
        );
    }

    let results = scores
        .iter()
        .enumerate()
        .map(|(idx, &confidence)| ClassScore {
            label: labels.get(idx).to_string(),
            confidence,
        })
        .collect();

    Ok(ClassificationResult {
        detected: policy.comparison.passes(confidence, threshold),
        confidence,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelList {
        LabelList::from_labels(["no_vest", "vest"])
    }

    #[test]
    fn sigmoid_synthesizes_two_classes() {
        let result = decide(
            &RawOutput::Sigmoid(0.9),
            &labels(),
            &DecisionPolicy::default(),
            0.75,
        )
        .unwrap();
        assert!(result.detected);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].label, "no_vest");
        assert_eq!(result.results[1].label, "vest");
        let sum: f32 = result.results.iter().map(|r| r.confidence).sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn synthesized_scores_sum_to_one() {
        for step in 0..=100 {
            let p = step as f32 / 100.0;
            let result = decide(
                &RawOutput::Sigmoid(p),
                &labels(),
                &DecisionPolicy::default(),
                0.5,
            )
            .unwrap();
            let sum: f32 = result.results.iter().map(|r| r.confidence).sum();
            assert!((sum - 1.0).abs() < 1e-6, "p={} sum={}", p, sum);
        }
    }

    #[test]
    fn class_vector_is_used_directly() {
        let result = decide(
            &RawOutput::Classes(vec![0.8, 0.2]),
            &labels(),
            &DecisionPolicy::default(),
            0.75,
        )
        .unwrap();
        assert!(!result.detected);
        assert_eq!(result.confidence, 0.2);
        assert_eq!(result.results[0].confidence, 0.8);
    }

    #[test]
    fn threshold_equality_counts_as_detected() {
        let policy = DecisionPolicy::default();
        let result = decide(&RawOutput::Classes(vec![0.25, 0.75]), &labels(), &policy, 0.75)
            .unwrap();
        assert!(result.detected);

        let strict = DecisionPolicy {
            comparison: Comparison::Strict,
            ..policy
        };
        let result = decide(&RawOutput::Classes(vec![0.25, 0.75]), &labels(), &strict, 0.75)
            .unwrap();
        assert!(!result.detected);
    }

    #[test]
    fn detected_tracks_threshold() {
        let policy = DecisionPolicy::default();
        for step in 0..=20 {
            let threshold = step as f32 / 20.0;
            let result =
                decide(&RawOutput::Sigmoid(0.6), &labels(), &policy, threshold).unwrap();
            assert_eq!(result.detected, result.confidence >= threshold);
        }
    }

    #[test]
    fn extra_outputs_get_unknown_label() {
        let result = decide(
            &RawOutput::Classes(vec![0.1, 0.7, 0.2]),
            &labels(),
            &DecisionPolicy::default(),
            0.5,
        )
        .unwrap();
        assert_eq!(result.results[2].label, "unknown");
    }

    #[test]
    fn malformed_output_fails_classification() {
        let policy = DecisionPolicy {
            positive_index: 3,
            ..DecisionPolicy::default()
        };
        assert!(matches!(
            decide(&RawOutput::Classes(vec![0.1, 0.9]), &labels(), &policy, 0.5),
            Err(DetectError::Classification)
        ));
        assert!(matches!(
            decide(
                &RawOutput::Sigmoid(f32::NAN),
                &labels(),
                &DecisionPolicy::default(),
                0.5
            ),
            Err(DetectError::Classification)
        ));
    }
}

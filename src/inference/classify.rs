//! Classifier output decoding and species selection.

use super::labels::Labels;
use super::types::Classification;
use crate::constants::classifier::{BLANK_LABEL, PROBABILITY_EPSILON};
use crate::tensor::Tensor;

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Whether the values already form a probability distribution.
pub fn is_probability_distribution(values: &[f32]) -> bool {
    if values.is_empty() || values.iter().any(|v| !(0.0..=1.0).contains(v)) {
        return false;
    }
    let sum: f32 = values.iter().sum();
    (sum - 1.0).abs() <= PROBABILITY_EPSILON
}

/// Turn raw classifier scores into the `top_k` best labelled results.
///
/// Logits are normalized with softmax; outputs that are already
/// probabilities are used as they are.
pub fn decode_classifications(
    scores: &[f32],
    labels: &Labels,
    top_k: usize,
) -> Vec<Classification> {
    let probs = if is_probability_distribution(scores) {
        scores.to_vec()
    } else {
        softmax(scores)
    };

    let mut ranked: Vec<(usize, f32)> = probs.into_iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
        .into_iter()
        .take(top_k)
        .map(|(class_id, score)| Classification {
            label: labels.resolve(class_id),
            score,
            class_id,
        })
        .collect()
}

/// Decode a classifier output tensor (any shape, one score per class).
pub fn decode_classifier_tensor(
    output: &Tensor,
    labels: &Labels,
    top_k: usize,
) -> Vec<Classification> {
    decode_classifications(output.data(), labels, top_k)
}

/// Whether a classifier label means "no animal".
pub fn is_blank_label(label: &str) -> bool {
    let trimmed = label.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(BLANK_LABEL)
}

/// Pick the species name for one crop.
///
/// Returns the first non-blank result scoring above `acceptance_threshold`,
/// otherwise the detector's coarse label.
pub fn select_species(
    results: &[Classification],
    detector_label: &str,
    acceptance_threshold: f32,
) -> String {
    results
        .iter()
        .find(|c| !is_blank_label(&c.label) && c.score > acceptance_threshold)
        .map_or_else(|| detector_label.to_string(), |c| c.label.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(label: &str, score: f32) -> Classification {
        Classification {
            label: label.to_string(),
            score,
            class_id: 0,
        }
    }

    #[test]
    fn test_softmax_sums_to_one_and_preserves_order() {
        let logits = [2.0, -1.0, 0.5, 3.5];
        let probs = softmax(&logits);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[3] > probs[0] && probs[0] > probs[2] && probs[2] > probs[1]);
    }

    #[test]
    fn test_softmax_large_logits_are_stable() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_probabilities_are_not_renormalized() {
        let labels = Labels::new(vec!["fox".into(), "deer".into(), "blank".into()]);
        let out = decode_classifications(&[0.2, 0.7, 0.1], &labels, 5);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].label, "deer");
        assert!((out[0].score - 0.7).abs() < 1e-6);
        assert_eq!(out[0].class_id, 1);
    }

    #[test]
    fn test_logits_are_normalized_and_truncated() {
        let out = decode_classifications(&[1.0, 4.0, 2.0, 3.0], &Labels::default(), 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, "class_1");
        assert_eq!(out[1].label, "class_3");
        assert!(out[0].score < 1.0);
    }

    #[test]
    fn test_select_skips_blank_labels() {
        let results = [result("blank", 0.8), result("  ", 0.5), result("red fox", 0.3)];
        assert_eq!(select_species(&results, "animal", 0.1), "red fox");
    }

    #[test]
    fn test_select_falls_back_below_threshold() {
        let results = [result("blank", 0.9), result("red fox", 0.05)];
        assert_eq!(select_species(&results, "animal", 0.1), "animal");
        assert_eq!(select_species(&[], "animal", 0.1), "animal");
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let results = [result("red fox", 0.1)];
        assert_eq!(select_species(&results, "animal", 0.1), "animal");
    }
}

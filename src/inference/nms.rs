//! Greedy non-maximum suppression.

use super::types::{Detection, iou};

/// Keep the best-scoring detections, dropping any that overlap an already
/// kept detection by `iou_threshold` or more.
///
/// Candidates are stable-sorted by score, so equal scores keep their input
/// order. The result is a subset of the input in descending score order with
/// at most `max_results` entries.
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_results: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(max_results.min(candidates.len()));
    'outer: for candidate in candidates {
        if kept.len() >= max_results {
            break;
        }
        for k in &kept {
            if iou(k.bbox(), candidate.bbox()) >= iou_threshold {
                continue 'outer;
            }
        }
        kept.push(candidate);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::BoundingBox;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Detection {
        Detection::new(BoundingBox::new(x1, y1, x2, y2), score, 0, "animal")
    }

    #[test]
    fn test_overlapping_lower_score_is_dropped() {
        let out = non_max_suppression(
            vec![
                det(0.0, 0.0, 10.0, 10.0, 0.6),
                det(1.0, 1.0, 11.0, 11.0, 0.9),
                det(50.0, 50.0, 60.0, 60.0, 0.5),
            ],
            0.45,
            10,
        );
        assert_eq!(out.len(), 2);
        assert!((out[0].score() - 0.9).abs() < 1e-6);
        assert!((out[1].score() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cap_limits_output() {
        let candidates: Vec<Detection> = (0..10u8)
            .map(|i| {
                let x = f32::from(i) * 100.0;
                det(x, 0.0, x + 10.0, 10.0, 0.5 + f32::from(i) * 0.01)
            })
            .collect();
        let out = non_max_suppression(candidates, 0.45, 3);
        assert_eq!(out.len(), 3);
        assert!(out.windows(2).all(|w| w[0].score() >= w[1].score()));
    }

    #[test]
    fn test_equal_scores_keep_input_order() {
        let a = Detection::new(BoundingBox::new(0.0, 0.0, 5.0, 5.0), 0.5, 1, "first");
        let b = Detection::new(BoundingBox::new(100.0, 0.0, 105.0, 5.0), 0.5, 2, "second");
        let out = non_max_suppression(vec![a, b], 0.45, 10);
        assert_eq!(out[0].label(), "first");
        assert_eq!(out[1].label(), "second");
    }

    #[test]
    fn test_empty_input() {
        assert!(non_max_suppression(Vec::new(), 0.45, 50).is_empty());
    }
}

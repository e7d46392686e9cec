//! Detector output decoding.
//!
//! Supported output shapes:
//!
//! | Shape        | Meaning                                              |
//! |--------------|------------------------------------------------------|
//! | `[1, K, 6]`  | pre-decoded rows `x1, y1, x2, y2, score, class`       |
//! | `[1, A, V]`  | anchors-major raw YOLO output (`A > V`)               |
//! | `[1, V, A]`  | channels-major raw YOLO output (`V < A`)             |
//! | `[A, V]`     | anchors-major raw output without a batch dimension   |
//!
//! Raw rows hold `cx, cy, w, h` followed by `V - 4` class scores. Any other
//! shape is ambiguous and decodes to no detections.

use super::labels::Labels;
use super::nms::non_max_suppression;
use super::types::{BoundingBox, Detection};
use crate::config::DetectorConfig;
use crate::constants::detector::{BOX_VALUES, PREDECODED_ROW};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Thresholds and limits applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodeSettings {
    /// Square model input edge; boxes are clamped to `[0, input_size]`.
    pub input_size: u32,
    /// Minimum detection score.
    pub conf_threshold: f32,
    /// NMS overlap threshold.
    pub iou_threshold: f32,
    /// Maximum detections returned.
    pub top_k: usize,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self::from(&DetectorConfig::default())
    }
}

impl From<&DetectorConfig> for DecodeSettings {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            input_size: config.input_size,
            conf_threshold: config.conf_threshold,
            iou_threshold: config.iou_threshold,
            top_k: config.top_k,
        }
    }
}

/// Recognized detector output arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// Rows of `x1, y1, x2, y2, score, class`, usually already suppressed by the model.
    PreDecoded {
        /// Number of rows.
        rows: usize,
    },
    /// `data[anchor * values + channel]`.
    AnchorsMajor {
        /// Number of candidate boxes.
        anchors: usize,
        /// Values per candidate (4 box values + class scores).
        values: usize,
    },
    /// `data[channel * anchors + anchor]`.
    ChannelsMajor {
        /// Values per candidate (4 box values + class scores).
        values: usize,
        /// Number of candidate boxes.
        anchors: usize,
    },
}

impl OutputLayout {
    /// Classify an output shape, or `None` if it is ambiguous.
    pub fn classify(shape: &[usize]) -> Option<Self> {
        let layout = match *shape {
            [1, rows, PREDECODED_ROW] => Self::PreDecoded { rows },
            [1, a, b] if a > b => Self::AnchorsMajor {
                anchors: a,
                values: b,
            },
            [1, a, b] if a < b => Self::ChannelsMajor {
                values: a,
                anchors: b,
            },
            [anchors, values] => Self::AnchorsMajor { anchors, values },
            _ => return None,
        };

        match layout {
            Self::AnchorsMajor { values, .. } | Self::ChannelsMajor { values, .. }
                if values <= BOX_VALUES =>
            {
                None
            }
            other => Some(other),
        }
    }

    /// Number of elements this layout reads.
    pub const fn element_count(&self) -> usize {
        match *self {
            Self::PreDecoded { rows } => rows * PREDECODED_ROW,
            Self::AnchorsMajor { anchors, values } | Self::ChannelsMajor { values, anchors } => {
                anchors * values
            }
        }
    }
}

/// Decode a detector output tensor.
pub fn decode_tensor(
    output: &Tensor,
    settings: &DecodeSettings,
    labels: &Labels,
) -> Vec<Detection> {
    decode_detections(output.shape(), output.data(), settings, labels)
}

/// Decode raw detector output into final detections.
///
/// Ambiguous shapes and short buffers yield an empty list; they are logged
/// but never treated as errors.
pub fn decode_detections(
    shape: &[usize],
    data: &[f32],
    settings: &DecodeSettings,
    labels: &Labels,
) -> Vec<Detection> {
    let Some(layout) = OutputLayout::classify(shape) else {
        debug!("Unrecognized detector output shape {:?}, no detections", shape);
        return Vec::new();
    };

    if data.len() < layout.element_count() {
        debug!(
            "Detector output has {} values, shape {:?} needs {}",
            data.len(),
            shape,
            layout.element_count()
        );
        return Vec::new();
    }

    match layout {
        OutputLayout::PreDecoded { rows } => decode_predecoded(data, rows, settings, labels),
        OutputLayout::AnchorsMajor { anchors, values } => decode_raw(
            anchors,
            values,
            |a, c| data[a * values + c],
            settings,
            labels,
        ),
        OutputLayout::ChannelsMajor { values, anchors } => decode_raw(
            anchors,
            values,
            |a, c| data[c * anchors + a],
            settings,
            labels,
        ),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn decode_predecoded(
    data: &[f32],
    rows: usize,
    settings: &DecodeSettings,
    labels: &Labels,
) -> Vec<Detection> {
    let limit = settings.input_size as f32;
    let candidates: Vec<Detection> = data
        .chunks_exact(PREDECODED_ROW)
        .take(rows)
        .filter(|row| row[4] >= settings.conf_threshold)
        .map(|row| {
            let class_id = row[5].max(0.0).round() as usize;
            let bbox = BoundingBox::new(row[0], row[1], row[2], row[3]).clamp(limit);
            Detection::new(bbox, row[4], class_id, labels.resolve(class_id))
        })
        .collect();

    // Exported models usually ran NMS already; this only removes leftovers.
    non_max_suppression(candidates, settings.iou_threshold, settings.top_k)
}

fn decode_raw(
    anchors: usize,
    values: usize,
    at: impl Fn(usize, usize) -> f32,
    settings: &DecodeSettings,
    labels: &Labels,
) -> Vec<Detection> {
    let limit = settings.input_size as f32;
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let mut best_score = 0.0_f32;
        let mut best_class = None;
        for class in 0..values - BOX_VALUES {
            let score = at(anchor, BOX_VALUES + class);
            if score > best_score {
                best_score = score;
                best_class = Some(class);
            }
        }

        let Some(class_id) = best_class else {
            continue;
        };
        if best_score < settings.conf_threshold {
            continue;
        }

        let bbox = BoundingBox::from_center(
            at(anchor, 0),
            at(anchor, 1),
            at(anchor, 2),
            at(anchor, 3),
        )
        .clamp(limit);
        candidates.push(Detection::new(
            bbox,
            best_score,
            class_id,
            labels.resolve(class_id),
        ));
    }

    non_max_suppression(candidates, settings.iou_threshold, settings.top_k)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn settings() -> DecodeSettings {
        DecodeSettings {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            top_k: 50,
        }
    }

    #[test]
    fn test_classify_predecoded() {
        assert_eq!(
            OutputLayout::classify(&[1, 300, 6]),
            Some(OutputLayout::PreDecoded { rows: 300 })
        );
    }

    #[test]
    fn test_classify_raw_orientations() {
        assert_eq!(
            OutputLayout::classify(&[1, 8400, 84]),
            Some(OutputLayout::AnchorsMajor {
                anchors: 8400,
                values: 84
            })
        );
        assert_eq!(
            OutputLayout::classify(&[1, 84, 8400]),
            Some(OutputLayout::ChannelsMajor {
                values: 84,
                anchors: 8400
            })
        );
        assert_eq!(
            OutputLayout::classify(&[8400, 7]),
            Some(OutputLayout::AnchorsMajor {
                anchors: 8400,
                values: 7
            })
        );
    }

    #[test]
    fn test_classify_ambiguous() {
        assert_eq!(OutputLayout::classify(&[1, 84, 84]), None);
        assert_eq!(OutputLayout::classify(&[1, 2, 3, 4]), None);
        assert_eq!(OutputLayout::classify(&[1, 3, 100]), None);
        assert_eq!(OutputLayout::classify(&[2, 8400, 84]), None);
        assert_eq!(OutputLayout::classify(&[]), None);
    }

    #[test]
    fn test_predecoded_filters_and_sorts() {
        let data = [
            10.0, 10.0, 50.0, 50.0, 0.3, 0.0, //
            0.0, 0.0, 20.0, 20.0, 0.1, 1.0, //
            100.0, 100.0, 700.0, 200.0, 0.9, 2.0,
        ];
        let out = decode_detections(&[1, 3, 6], &data, &settings(), &Labels::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].score(), 0.9);
        assert_eq!(out[0].bbox().x2, 640.0);
        assert_eq!(out[0].label(), "class_2");
        assert_eq!(out[1].class_id(), 0);
    }

    #[test]
    fn test_short_buffer_is_ambiguous() {
        let out = decode_detections(&[1, 300, 6], &[0.0; 12], &settings(), &Labels::default());
        assert!(out.is_empty());
    }

    #[test]
    fn test_raw_all_zero_scores_produce_nothing() {
        // argmax starts at zero with a strict comparison, so all-zero rows
        // never pick a class even with a zero threshold.
        let mut s = settings();
        s.conf_threshold = 0.0;
        let data = vec![0.0; 10 * 7];
        let out = decode_detections(&[1, 10, 7], &data, &s, &Labels::default());
        assert!(out.is_empty());
    }
}

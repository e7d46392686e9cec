//! Detection and classification result types.

use crate::frame::Region;
use serde::{Deserialize, Serialize};

/// Corner-form box in model input coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x1: f32,
    /// Top edge.
    pub y1: f32,
    /// Right edge.
    pub x2: f32,
    /// Bottom edge.
    pub y2: f32,
}

impl BoundingBox {
    /// Box from corner coordinates.
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box from center, width and height.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    /// Clamp every coordinate into `[0, limit]`.
    #[must_use]
    pub fn clamp(self, limit: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, limit),
            y1: self.y1.clamp(0.0, limit),
            x2: self.x2.clamp(0.0, limit),
            y2: self.y2.clamp(0.0, limit),
        }
    }

    /// Box width (zero when inverted).
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    /// Box height (zero when inverted).
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Box area (zero when inverted).
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Map from a square `input_size` model space onto a `width` x `height`
    /// frame and return the covered pixel region.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_frame_region(&self, input_size: u32, width: u32, height: u32) -> Region {
        let size = input_size.max(1) as f32;
        let sx = width as f32 / size;
        let sy = height as f32 / size;
        let x1 = (self.x1 * sx).max(0.0);
        let y1 = (self.y1 * sy).max(0.0);
        let w = self.width() * sx;
        let h = self.height() * sy;
        Region {
            x: x1.floor() as u32,
            y: y1.floor() as u32,
            width: w.floor() as u32,
            height: h.floor() as u32,
        }
        .clamp_to(width, height)
    }
}

/// Intersection over union of two boxes. Zero when the union is empty.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let iw = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let ih = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = iw * ih;
    let union = a.area() + b.area() - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// One detected object. Scores are always within `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    bbox: BoundingBox,
    score: f32,
    class_id: usize,
    label: String,
}

impl Detection {
    /// Create a detection, clamping the score into `[0, 1]`.
    pub fn new(bbox: BoundingBox, score: f32, class_id: usize, label: impl Into<String>) -> Self {
        let score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
        Self {
            bbox,
            score,
            class_id,
            label: label.into(),
        }
    }

    /// Box in model input coordinates.
    pub const fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Confidence in `[0, 1]`.
    pub const fn score(&self) -> f32 {
        self.score
    }

    /// Model class index.
    pub const fn class_id(&self) -> usize {
        self.class_id
    }

    /// Resolved class label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// One ranked classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Resolved class label.
    pub label: String,
    /// Probability in `[0, 1]`.
    pub score: f32,
    /// Model class index.
    pub class_id: usize,
}

//! Detection and classification inference.

pub mod classify;
pub mod decode;
mod engine;
mod labels;
pub mod nms;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod provider;
mod types;

pub use classify::{decode_classifications, select_species, softmax};
pub use decode::{DecodeSettings, OutputLayout, decode_detections};
pub use engine::{InferenceEngine, ModelSession, default_engine, run_single};
pub use labels::{Labels, fallback_label};
pub use nms::non_max_suppression;
pub use provider::{ExecutionProvider, select_providers};
pub use types::{BoundingBox, Classification, Detection, iou};

//! Configuration type definitions.

use crate::constants::{capture, classifier, detector};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Object detector settings.
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Species classifier settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Capture loop and recording settings.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Inference settings.
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Object detector model and decoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Path to the ONNX detector model.
    pub model: Option<PathBuf>,

    /// Path to the labels file (JSON array or index map).
    pub labels: Option<PathBuf>,

    /// Square model input edge in pixels.
    pub input_size: u32,

    /// Minimum detection score.
    pub conf_threshold: f32,

    /// IoU threshold for non-maximum suppression.
    pub iou_threshold: f32,

    /// Maximum detections per frame.
    pub top_k: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: None,
            labels: None,
            input_size: detector::INPUT_SIZE,
            conf_threshold: detector::CONF_THRESHOLD,
            iou_threshold: detector::IOU_THRESHOLD,
            top_k: detector::TOP_K,
        }
    }
}

/// Species classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Run the second-pass species classifier on recorded key frames.
    pub enabled: bool,

    /// Path to the ONNX classifier model.
    pub model: Option<PathBuf>,

    /// Path to the labels file.
    pub labels: Option<PathBuf>,

    /// Square model input edge in pixels.
    pub input_size: u32,

    /// Number of ranked results to return.
    pub top_k: usize,

    /// Minimum score for a species label to replace the detector label.
    pub acceptance_threshold: f32,

    /// Detector labels that are never classified (people, vehicles).
    pub ignored_labels: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            labels: None,
            input_size: classifier::INPUT_SIZE,
            top_k: classifier::TOP_K,
            acceptance_threshold: classifier::ACCEPTANCE_THRESHOLD,
            ignored_labels: classifier::IGNORED_LABELS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Capture loop and recording settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct CaptureConfig {
    /// Identifier attached to every uploaded clip (defaults to the hostname).
    pub device_id: Option<String>,

    /// Start recording automatically on the first detection.
    pub auto_record: bool,

    /// Hand finished clips to the uploader automatically.
    pub auto_upload: bool,

    /// Run the detector on every Nth frame.
    pub process_every_n: u32,

    /// Stop after this many milliseconds without a detection.
    pub silence_timeout_ms: u64,

    /// Stop once the encoded clip reaches this many megabytes.
    pub max_file_size_mb: u64,

    /// Keep at most one key frame per window of this many milliseconds.
    pub key_frame_interval_ms: u64,

    /// Frame rate of the capture loop.
    pub target_fps: u32,

    /// Only these detector labels trigger and count (empty = all labels).
    pub target_labels: Vec<String>,

    /// JPEG quality for recorded frames and thumbnails (1-100).
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            auto_record: true,
            auto_upload: true,
            process_every_n: capture::PROCESS_EVERY_N,
            silence_timeout_ms: capture::SILENCE_TIMEOUT_MS,
            max_file_size_mb: capture::MAX_FILE_SIZE_MB,
            key_frame_interval_ms: capture::KEY_FRAME_INTERVAL_MS,
            target_fps: capture::TARGET_FPS,
            target_labels: Vec::new(),
            jpeg_quality: capture::JPEG_QUALITY,
        }
    }
}

impl CaptureConfig {
    /// Silence timeout as a duration.
    pub const fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    /// Key-frame window as a duration.
    pub const fn key_frame_interval(&self) -> Duration {
        Duration::from_millis(self.key_frame_interval_ms)
    }

    /// Encoded size cap in bytes.
    pub const fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(crate::constants::BYTES_PER_MB)
    }

    /// Interval between capture loop ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }

    /// Configured device id, or the hostname when unset.
    pub fn resolved_device_id(&self) -> String {
        self.device_id.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| capture::FALLBACK_DEVICE_ID.to_string())
        })
    }

    /// Whether a detector label may trigger recording and be counted.
    pub fn is_target_label(&self, label: &str) -> bool {
        self.target_labels.is_empty() || self.target_labels.iter().any(|t| t == label)
    }
}

/// Inference device configuration.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum InferenceDevice {
    /// Automatically select (GPU if available, else CPU).
    #[default]
    Auto,
    /// Prefer a GPU provider, warn when falling back to CPU.
    Gpu,
    /// Force CPU inference.
    Cpu,
}

/// Where inference runs relative to the capture loop.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Dedicated inference thread, messages correlated by id.
    #[default]
    Worker,
    /// Inline on the calling task.
    Direct,
}

/// Inference settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Device to use for inference.
    pub device: InferenceDevice,

    /// Execution backend.
    pub execution: ExecutionMode,
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for stored clips (defaults to `./clips`).
    pub clips_dir: Option<PathBuf>,
}

impl OutputConfig {
    /// Clip directory with the default applied.
    pub fn resolved_clips_dir(&self) -> PathBuf {
        self.clips_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::constants::clip::DEFAULT_OUTPUT_DIR))
    }
}

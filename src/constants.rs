//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "wildcam";

/// Detector defaults (`MegaDetector`-style YOLO export).
pub mod detector {
    /// Square model input edge in pixels.
    pub const INPUT_SIZE: u32 = 640;
    /// Minimum score for a detection to be kept.
    pub const CONF_THRESHOLD: f32 = 0.2;
    /// Overlap above which a lower-scoring box is suppressed.
    pub const IOU_THRESHOLD: f32 = 0.45;
    /// Maximum detections returned per frame.
    pub const TOP_K: usize = 50;
    /// Number of leading box values (cx, cy, w, h) in raw YOLO rows.
    pub const BOX_VALUES: usize = 4;
    /// Width of a pre-decoded row: x1, y1, x2, y2, score, class.
    pub const PREDECODED_ROW: usize = 6;
}

/// Species classifier defaults.
pub mod classifier {
    /// Square model input edge in pixels.
    pub const INPUT_SIZE: u32 = 480;
    /// Number of ranked classifications returned.
    pub const TOP_K: usize = 5;
    /// A species label is only accepted above this score.
    pub const ACCEPTANCE_THRESHOLD: f32 = 0.1;
    /// Crops must be strictly larger than this on both sides.
    pub const MIN_CROP_EDGE: f32 = 10.0;
    /// Classifier label meaning "nothing here".
    pub const BLANK_LABEL: &str = "blank";
    /// Detector labels that are never sent to the species classifier.
    pub const IGNORED_LABELS: &[&str] = &["person", "vehicle"];
    /// Tolerance used when deciding whether scores already sum to one.
    pub const PROBABILITY_EPSILON: f32 = 1e-3;
}

/// Capture loop defaults.
pub mod capture {
    /// Run the detector on every Nth frame.
    pub const PROCESS_EVERY_N: u32 = 3;
    /// Stop recording after this long without a detection.
    pub const SILENCE_TIMEOUT_MS: u64 = 4000;
    /// Stop recording once the encoded clip reaches this size.
    pub const MAX_FILE_SIZE_MB: u64 = 45;
    /// At most one key frame is kept per window of this length.
    pub const KEY_FRAME_INTERVAL_MS: u64 = 1000;
    /// Frame rate of the capture loop.
    pub const TARGET_FPS: u32 = 15;
    /// JPEG quality for recorded frames and thumbnails.
    pub const JPEG_QUALITY: u8 = 85;
    /// Device id used when the hostname cannot be read.
    pub const FALLBACK_DEVICE_ID: &str = "wildcam-device";
}

/// Clip output naming.
pub mod clip {
    /// Default directory for stored clips.
    pub const DEFAULT_OUTPUT_DIR: &str = "clips";
    /// Extension of the recorded media stream.
    pub const VIDEO_EXTENSION: &str = "mjpeg";
    /// Extension of the thumbnail image.
    pub const THUMBNAIL_EXTENSION: &str = "jpg";
    /// Extension of the metadata sidecar.
    pub const METADATA_EXTENSION: &str = "json";
}

/// Confidence value bounds.
pub mod confidence {
    /// Minimum valid confidence value.
    pub const MIN: f32 = 0.0;
    /// Maximum valid confidence value.
    pub const MAX: f32 = 1.0;
}

/// Bytes per megabyte for the file size cap.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Image extensions accepted by the directory frame source.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

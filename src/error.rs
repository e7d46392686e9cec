//! Error types for wildcam.

/// Result type alias for wildcam operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for wildcam.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Model file does not exist.
    #[error("model file does not exist: {path}")]
    ModelFileNotFound {
        /// Path to the missing model file.
        path: std::path::PathBuf,
    },

    /// Failed to read a labels file.
    #[error("failed to read labels file '{path}'")]
    LabelsRead {
        /// Path to the labels file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Labels file is not a JSON array or index map.
    #[error("failed to parse labels file '{path}'")]
    LabelsParse {
        /// Path to the labels file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Model could not be loaded. The session stays unusable until a new load succeeds.
    #[error("failed to load model: {reason}")]
    ModelLoad {
        /// Description of the load failure.
        reason: String,
    },

    /// Inference was requested before a model finished loading.
    #[error("model is not loaded")]
    ModelNotReady,

    /// A single inference call failed.
    #[error("inference failed: {reason}")]
    Inference {
        /// Description of the inference failure.
        reason: String,
    },

    /// Tensor data does not match its declared shape.
    #[error("tensor has {actual} elements but shape {shape:?} requires {expected}")]
    TensorShape {
        /// Declared shape.
        shape: Vec<usize>,
        /// Element count implied by the shape.
        expected: usize,
        /// Element count actually supplied.
        actual: usize,
    },

    /// Pixel buffer does not match the frame dimensions.
    #[error("frame {width}x{height} needs {expected} bytes, got {actual}")]
    FrameSize {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
        /// Byte count implied by the dimensions.
        expected: usize,
        /// Byte count actually supplied.
        actual: usize,
    },

    /// Frame source or recorder is unavailable.
    #[error("capture hardware unavailable: {reason}")]
    CaptureHardware {
        /// Description of the hardware failure.
        reason: String,
    },

    /// Requested capture state change is not valid from the current state.
    #[error("invalid capture transition: {reason}")]
    InvalidTransition {
        /// Description of the rejected transition.
        reason: String,
    },

    /// Key-frame classification failed for a clip.
    #[error("classification failed: {reason}")]
    Classification {
        /// Description of the classification failure.
        reason: String,
    },

    /// Clip upload failed.
    #[error("upload failed: {reason}")]
    Upload {
        /// Description of the upload failure.
        reason: String,
    },

    /// The inference worker went away before answering.
    #[error("inference worker closed")]
    WorkerClosed,

    /// Failed to decode an image file.
    #[error("failed to decode image '{path}'")]
    ImageDecode {
        /// Path to the image file.
        path: std::path::PathBuf,
        /// Underlying image error.
        #[source]
        source: image::ImageError,
    },

    /// Failed to encode a frame as an image.
    #[error("failed to encode image: {reason}")]
    ImageEncode {
        /// Description of the encoding failure.
        reason: String,
    },

    /// Failed to create output directory.
    #[error("failed to create output directory '{path}'")]
    OutputDirCreateFailed {
        /// Path to the directory.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a clip artifact.
    #[error("failed to write clip file '{path}'")]
    ClipWrite {
        /// Path to the file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize JSON output.
    #[error("failed to serialize JSON")]
    JsonSerialize {
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Whether this error only affects the current frame or call.
    ///
    /// The capture loop logs and continues on these instead of stopping.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Inference { .. } | Self::TensorShape { .. } | Self::ModelNotReady
        )
    }
}

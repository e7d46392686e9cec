//! CLI argument definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// On-device animal detection and clip recording for camera traps.
#[derive(Debug, Parser)]
#[command(name = "wildcam")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Model and runtime options shared by all commands.
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the capture loop over a directory of frames.
    Capture(CaptureArgs),
    /// Run the detector on images and print detections as JSON lines.
    Detect {
        /// Image files to analyze.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Run the species classifier on one image and print the top results.
    Classify {
        /// Image file (typically a crop around one animal).
        input: PathBuf,
    },
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show available execution providers.
    Providers,
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Options shared by every command.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Path to the detector ONNX model (overrides config).
    #[arg(long, global = true, env = "WILDCAM_DETECTOR_MODEL")]
    pub detector_model: Option<PathBuf>,

    /// Path to the detector labels file (overrides config).
    #[arg(long, global = true, env = "WILDCAM_DETECTOR_LABELS")]
    pub detector_labels: Option<PathBuf>,

    /// Path to the species classifier ONNX model (overrides config).
    #[arg(long, global = true, env = "WILDCAM_CLASSIFIER_MODEL")]
    pub classifier_model: Option<PathBuf>,

    /// Path to the species classifier labels file (overrides config).
    #[arg(long, global = true, env = "WILDCAM_CLASSIFIER_LABELS")]
    pub classifier_labels: Option<PathBuf>,

    /// Minimum detection confidence (0.0-1.0).
    #[arg(short = 'c', long, global = true, value_parser = parse_confidence,
          env = "WILDCAM_CONF_THRESHOLD")]
    pub conf_threshold: Option<f32>,

    /// Run inference inline instead of on a worker thread.
    #[arg(long, global = true)]
    pub direct: bool,

    /// Prefer GPU execution providers.
    #[arg(long, global = true, conflicts_with = "cpu")]
    pub gpu: bool,

    /// Force CPU inference.
    #[arg(long, global = true, conflicts_with = "gpu")]
    pub cpu: bool,

    /// Suppress progress output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace+ORT info, -vvv: trace+ORT debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Arguments for the capture command.
#[derive(Debug, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct CaptureArgs {
    /// Directory of still frames, played back in name order.
    pub source: PathBuf,

    /// Start over at the first frame when the directory is exhausted.
    #[arg(long = "loop")]
    pub looping: bool,

    /// Do not start recordings on detections.
    #[arg(long)]
    pub no_auto_record: bool,

    /// Keep clips in memory instead of storing them.
    #[arg(long)]
    pub no_upload: bool,

    /// Skip second-pass species classification.
    #[arg(long)]
    pub no_classify: bool,

    /// Directory for stored clips (overrides config).
    #[arg(short, long, env = "WILDCAM_CLIPS_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Capture loop frame rate.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=120))]
    pub fps: Option<u32>,

    /// Device id stamped on clips (overrides config and hostname).
    #[arg(long, env = "WILDCAM_DEVICE_ID")]
    pub device_id: Option<String>,
}

/// Parse and validate confidence value.
fn parse_confidence(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(format!(
            "confidence must be between 0.0 and 1.0, got {value}"
        ));
    }

    Ok(value)
}

//! Wildcam - camera-trap animal detection and clip recording.
//!
//! Frames from a camera become detections, detections drive clip recording,
//! and recorded key frames get a second-pass species classification before
//! the clip is handed to storage.

#![warn(missing_docs)]

pub mod capture;
pub mod cli;
pub mod clip;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod inference;
pub mod runtime;
pub mod tensor;

use clap::Parser;
use cli::{CaptureArgs, Cli, Command, CommonArgs};
use config::{
    Config, ExecutionMode, InferenceDevice, config_file_path, load_default_config,
    save_default_config, validate_config,
};
use inference::{ExecutionProvider, default_engine};
use runtime::{ExecutionContext, InferencePipeline, LoadRequest, LoadSettings, ModelRole};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub use error::{Error, Result};

/// Main entry point for the wildcam CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.common.verbose, cli.common.quiet);

    // Ctrl+C stops the capture loop cleanly; a second one exits immediately.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        if *shutdown_tx.borrow() {
            std::process::exit(130); // 128 + SIGINT(2)
        }
        shutdown_tx.send_replace(true);
    }) {
        warn!("Failed to install Ctrl+C handler: {e}");
    }

    // Load configuration
    let config = load_default_config()?;

    handle_command(cli.command, &cli.common, config, shutdown_rx)
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    // ORT logging is suppressed by default because GPU fallback is expected in auto mode.
    let filter_str = if quiet {
        "warn,ort=off".to_string()
    } else {
        match verbose {
            0 => "info,ort=off".to_string(),
            1 => "debug,ort=warn".to_string(),
            2 => "trace,ort=info".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_command(
    command: Command,
    common: &CommonArgs,
    config: Config,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    match command {
        Command::Config { action } => handle_config_command(action),
        Command::Providers => {
            handle_providers_command();
            Ok(())
        }
        Command::Detect { inputs } => {
            let config = apply_common_overrides(config, common)?;
            block_on(detect_images(&inputs, &config, !common.quiet))
        }
        Command::Classify { input } => {
            let config = apply_common_overrides(config, common)?;
            block_on(classify_image(&input, &config))
        }
        Command::Capture(args) => {
            let mut config = apply_common_overrides(config, common)?;
            apply_capture_overrides(&mut config, &args);
            validate_config(&config)?;
            block_on(run_capture(&args, config, shutdown, !common.quiet))
        }
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

/// Apply model and runtime flags on top of the file configuration.
pub fn apply_common_overrides(mut config: Config, common: &CommonArgs) -> Result<Config> {
    if let Some(path) = &common.detector_model {
        config.detector.model = Some(path.clone());
    }
    if let Some(path) = &common.detector_labels {
        config.detector.labels = Some(path.clone());
    }
    if let Some(path) = &common.classifier_model {
        config.classifier.model = Some(path.clone());
    }
    if let Some(path) = &common.classifier_labels {
        config.classifier.labels = Some(path.clone());
    }
    if let Some(conf) = common.conf_threshold {
        config.detector.conf_threshold = conf;
    }
    if common.gpu {
        config.inference.device = InferenceDevice::Gpu;
    } else if common.cpu {
        config.inference.device = InferenceDevice::Cpu;
    }
    if common.direct {
        config.inference.execution = ExecutionMode::Direct;
    }
    validate_config(&config)?;
    Ok(config)
}

fn apply_capture_overrides(config: &mut Config, args: &CaptureArgs) {
    if args.no_auto_record {
        config.capture.auto_record = false;
    }
    if args.no_upload {
        config.capture.auto_upload = false;
    }
    if args.no_classify {
        config.classifier.enabled = false;
    }
    if let Some(dir) = &args.output_dir {
        config.output.clips_dir = Some(dir.clone());
    }
    if let Some(fps) = args.fps {
        config.capture.target_fps = fps;
    }
    if let Some(device_id) = &args.device_id {
        config.capture.device_id = Some(device_id.clone());
    }
}

fn require_model(path: Option<&PathBuf>, role: &str, flag: &str) -> Result<PathBuf> {
    let path = path.ok_or_else(|| Error::ConfigValidation {
        message: format!("no {role} model configured; pass {flag} or set it in the config file"),
    })?;
    if !path.exists() {
        return Err(Error::ModelFileNotFound { path: path.clone() });
    }
    Ok(path.clone())
}

/// Create an execution context and load the detector into it.
async fn load_detector(config: &Config) -> Result<(Arc<ExecutionContext>, u32)> {
    let model = require_model(config.detector.model.as_ref(), "detector", "--detector-model")?;
    let pipeline = InferencePipeline::new(
        ModelRole::Detector,
        default_engine()?,
        config.inference.device,
    );
    let context = Arc::new(ExecutionContext::new(config.inference.execution, pipeline)?);
    let ready = context
        .load(LoadRequest {
            model,
            labels: config.detector.labels.clone(),
            prefer_backend: None,
            config: LoadSettings {
                input_size: Some(config.detector.input_size),
                conf_threshold: Some(config.detector.conf_threshold),
                iou_threshold: Some(config.detector.iou_threshold),
                top_k: Some(config.detector.top_k),
            },
        })
        .await?;
    info!("Detector ready ({} labels)", ready.labels.len());
    Ok((context, ready.input_size))
}

/// Create an execution context for the classifier and try to load it.
///
/// A failed load is returned alongside the context: the capture loop keeps
/// running and clips record the classification failure.
async fn load_classifier(config: &Config) -> Result<(Arc<ExecutionContext>, Result<()>)> {
    let model = require_model(
        config.classifier.model.as_ref(),
        "classifier",
        "--classifier-model",
    )?;
    let pipeline = InferencePipeline::new(
        ModelRole::Classifier,
        default_engine()?,
        config.inference.device,
    );
    let context = Arc::new(ExecutionContext::new(config.inference.execution, pipeline)?);
    let loaded = context
        .load(LoadRequest {
            model,
            labels: config.classifier.labels.clone(),
            prefer_backend: None,
            config: LoadSettings {
                input_size: Some(config.classifier.input_size),
                top_k: Some(config.classifier.top_k),
                ..LoadSettings::default()
            },
        })
        .await
        .map(|ready| info!("Classifier ready ({} labels)", ready.labels.len()));
    Ok((context, loaded))
}

async fn detect_images(
    inputs: &[PathBuf],
    config: &Config,
    progress_enabled: bool,
) -> Result<()> {
    use crate::cli::progress;

    let spinner = progress::create_spinner("Loading detector model...", progress_enabled);
    let loaded = load_detector(config).await;
    progress::clear_progress(spinner);
    let (detector, input_size) = loaded?;

    let pb = progress::create_file_progress(inputs.len(), progress_enabled);
    let mut failed = 0usize;

    for path in inputs {
        match detect_one(&detector, path, input_size).await {
            Ok(line) => {
                if let Some(pb) = &pb {
                    pb.println(&line);
                } else {
                    println!("{line}");
                }
            }
            Err(e) => {
                failed += 1;
                warn!("{}: {e}", path.display());
            }
        }
        progress::inc_progress(pb.as_ref());
    }

    progress::finish_progress(pb, "done");
    detector.shutdown();

    if failed == inputs.len() && !inputs.is_empty() {
        return Err(Error::Inference {
            reason: format!("all {failed} image(s) failed"),
        });
    }
    Ok(())
}

async fn detect_one(detector: &ExecutionContext, path: &Path, input_size: u32) -> Result<String> {
    let frame = frame::load_frame(path)?;
    let (width, height) = (frame.width(), frame.height());
    let detections = detector.detect(frame).await?;
    let line = serde_json::json!({
        "file": path.display().to_string(),
        "width": width,
        "height": height,
        "inputSize": input_size,
        "detections": detections,
    });
    serde_json::to_string(&line).map_err(|e| Error::JsonSerialize { source: e })
}

async fn classify_image(input: &Path, config: &Config) -> Result<()> {
    let (classifier, loaded) = load_classifier(config).await?;
    loaded?;
    let frame = frame::load_frame(input)?;
    let results = classifier.classify(frame).await?;
    classifier.shutdown();

    let species =
        inference::select_species(&results, "animal", config.classifier.acceptance_threshold);
    let output = serde_json::json!({
        "file": input.display().to_string(),
        "species": species,
        "results": results,
    });
    let json =
        serde_json::to_string_pretty(&output).map_err(|e| Error::JsonSerialize { source: e })?;
    println!("{json}");
    Ok(())
}

/// Load the detector and, when enabled and configured, the classifier.
async fn load_capture_models(
    config: &Config,
) -> Result<((Arc<ExecutionContext>, u32), Option<Arc<ExecutionContext>>)> {
    let detector = load_detector(config).await?;

    if !config.classifier.enabled {
        return Ok((detector, None));
    }
    if config.classifier.model.is_none() {
        warn!("No classifier model configured, skipping species classification");
        return Ok((detector, None));
    }
    let (context, loaded) = load_classifier(config).await?;
    if let Err(e) = loaded {
        warn!("Classifier unavailable, clips will keep live counts: {e}");
    }
    Ok((detector, Some(context)))
}

async fn run_capture(
    args: &CaptureArgs,
    config: Config,
    shutdown: watch::Receiver<bool>,
    progress_enabled: bool,
) -> Result<()> {
    use crate::capture::CaptureDriver;
    use crate::cli::progress;
    use crate::clip::{LocalClipStore, format_counts};

    let source = frame::ImageDirSource::open(&args.source, args.looping)?;

    let spinner = progress::create_spinner("Loading models...", progress_enabled);
    let models = load_capture_models(&config).await;
    progress::clear_progress(spinner);
    let ((detector, input_size), classifier) = models?;

    let (_settings_tx, settings_rx) = watch::channel(config.capture.clone());
    let clips_dir = config.output.resolved_clips_dir();
    let store = LocalClipStore::new(&clips_dir);

    let mut driver = CaptureDriver::new(
        Box::new(source),
        Arc::clone(&detector),
        input_size,
        settings_rx,
    )
    .with_uploader(Arc::new(store))
    .with_shutdown(shutdown);
    if let Some(context) = &classifier {
        driver = driver.with_classifier(Arc::clone(context), config.classifier.clone());
    }

    let summary = driver.run().await?;

    detector.shutdown();
    if let Some(context) = &classifier {
        context.shutdown();
    }

    println!(
        "Captured {} frame(s), {} detected, {} dropped while busy",
        summary.frames_captured, summary.frames_detected, summary.frames_dropped
    );
    for clip in &summary.clips {
        let location = match &clip.upload {
            clip::UploadStatus::Success { urls } => urls.video_url.clone(),
            clip::UploadStatus::Error { reason } => format!("upload failed: {reason}"),
            _ => "not stored".to_string(),
        };
        println!(
            "  {}  {:.1}s  {}  {}",
            clip.id,
            clip.duration().num_milliseconds() as f64 / 1000.0,
            format_counts(&clip.species_counts),
            location
        );
    }
    if summary.clips.is_empty() {
        println!("No clips recorded.");
    } else if config.capture.auto_upload {
        println!("Clips stored in {}", clips_dir.display());
    }
    Ok(())
}

fn handle_providers_command() {
    let (available, note) = match default_engine() {
        Ok(engine) => (engine.available_providers(), None),
        Err(e) => (vec![ExecutionProvider::Cpu], Some(e.to_string())),
    };

    println!("Available execution providers:");
    println!();

    for provider in &available {
        println!("  ✓ {}", provider.metadata().description);
    }

    println!();
    println!("To use a specific provider:");
    println!("  --gpu       Prefer a GPU provider (if available)");
    println!("  --cpu       Use CPU only");
    println!("  (default)   Auto-select (GPU if available, fallback to CPU)");

    if let Some(note) = note {
        println!();
        println!("Note: {note}");
    }
}

fn handle_config_command(action: cli::ConfigAction) -> Result<()> {
    use cli::ConfigAction;

    match action {
        ConfigAction::Init => {
            let path = config_file_path()?;
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                let config = Config::default();
                let saved_path = save_default_config(&config)?;
                println!("Created configuration file: {}", saved_path.display());
                println!("\nNext steps:");
                println!("  Set detector.model and classifier.model, then run:");
                println!("  wildcam capture <DIR>");
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_default_config()?;
            println!("{config:#?}");
            Ok(())
        }
        ConfigAction::Path => {
            let path = config_file_path()?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

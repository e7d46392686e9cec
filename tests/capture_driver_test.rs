//! End-to-end capture loop runs on paused time with scripted models.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{
    ScriptedEngine, dark_frame, fixed_classifier_script, loaded_context, red_detector_script,
    red_frame, write_labels,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use wildcam::capture::{CaptureCommand, CaptureDriver, CaptureEvent};
use wildcam::clip::{ClassificationStatus, LocalClipStore, UploadStatus};
use wildcam::config::{CaptureConfig, ClassifierConfig, InferenceDevice};
use wildcam::error::Result;
use wildcam::frame::{FrameSource, PixelFrame, VecFrameSource};
use wildcam::runtime::{ExecutionContext, InferencePipeline, ModelRole};

const DETECTOR_INPUT: u32 = 32;

fn capture_config() -> CaptureConfig {
    CaptureConfig {
        device_id: Some("trail-cam-7".to_string()),
        target_fps: 10,
        process_every_n: 1,
        silence_timeout_ms: 1000,
        ..CaptureConfig::default()
    }
}

/// One second of an animal, then three seconds of nothing.
fn visit() -> VecFrameSource {
    let frames = std::iter::repeat_n(red_frame(64), 10)
        .chain(std::iter::repeat_n(dark_frame(64), 30));
    VecFrameSource::new(frames)
}

struct Endless(PixelFrame);

impl FrameSource for Endless {
    fn next_frame(&mut self) -> Result<Option<PixelFrame>> {
        Ok(Some(self.0.clone()))
    }
}

async fn detector() -> Arc<ExecutionContext> {
    loaded_context(
        ModelRole::Detector,
        ScriptedEngine::new(red_detector_script()),
        None,
        DETECTOR_INPUT,
    )
    .await
}

fn drain(mut events: mpsc::UnboundedReceiver<CaptureEvent>) -> Vec<CaptureEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_visit_produces_one_classified_uploaded_clip() {
    let dir = TempDir::new().unwrap();
    let species = write_labels(dir.path(), "species.json", &["blank", "red deer", "fox"]);
    let classifier = loaded_context(
        ModelRole::Classifier,
        ScriptedEngine::new(fixed_classifier_script()),
        Some(&species),
        24,
    )
    .await;
    let clips_dir = dir.path().join("clips");

    let (_settings_tx, settings) = watch::channel(capture_config());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let summary = CaptureDriver::new(Box::new(visit()), detector().await, DETECTOR_INPUT, settings)
        .with_classifier(classifier, ClassifierConfig::default())
        .with_uploader(Arc::new(LocalClipStore::new(&clips_dir)))
        .with_events(events_tx)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.frames_captured, 40);
    assert_eq!(summary.detection_errors, 0);
    assert_eq!(summary.clips.len(), 1);

    let clip = &summary.clips[0];
    assert_eq!(clip.device_id, "trail-cam-7");
    assert_eq!(clip.frames_with_animals, 10);
    assert_eq!(clip.classification, ClassificationStatus::Complete);
    assert_eq!(clip.species_counts.get("red deer"), 1);
    assert_eq!(clip.species_counts.get("class_0"), 0);
    assert!(clip.thumbnail.is_some());
    assert!(clip.duration() >= chrono::TimeDelta::seconds(1));

    let UploadStatus::Success { urls } = &clip.upload else {
        panic!("upload did not succeed: {:?}", clip.upload);
    };
    assert!(urls.video_url.starts_with("file://"));
    assert!(urls.thumbnail_url.is_some());

    let day_dir = LocalClipStore::new(&clips_dir).day_dir(clip.started_at);
    assert!(day_dir.join(format!("{}.mjpeg", clip.id)).is_file());
    assert!(day_dir.join(format!("{}.jpg", clip.id)).is_file());
    assert!(day_dir.join(format!("{}.json", clip.id)).is_file());

    let events = drain(events_rx);
    let id = clip.id.clone();
    assert_eq!(
        events,
        vec![
            CaptureEvent::RecordingStarted {
                clip_id: id.clone()
            },
            CaptureEvent::ClipReady {
                clip_id: id.clone()
            },
            CaptureEvent::ClipClassified {
                clip_id: id.clone(),
                status: ClassificationStatus::Complete,
            },
            CaptureEvent::ClipUploaded {
                clip_id: id,
                status: clip.upload.clone(),
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_classifier_keeps_live_counts() {
    // Never loaded: the classifier is not ready when the clip closes.
    let pipeline = InferencePipeline::new(
        ModelRole::Classifier,
        Arc::new(ScriptedEngine::failing()),
        InferenceDevice::Cpu,
    );
    let classifier = Arc::new(ExecutionContext::direct(pipeline));

    let (_settings_tx, settings) = watch::channel(CaptureConfig {
        auto_upload: false,
        ..capture_config()
    });
    let summary = CaptureDriver::new(Box::new(visit()), detector().await, DETECTOR_INPUT, settings)
        .with_classifier(classifier, ClassifierConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.clips.len(), 1);
    let clip = &summary.clips[0];
    assert!(matches!(clip.classification, ClassificationStatus::Failed(_)));
    assert_eq!(clip.species_counts.get("class_0"), 1);
    assert_eq!(clip.upload, UploadStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_quiet_scene_records_nothing() {
    let frames = VecFrameSource::new(std::iter::repeat_n(dark_frame(32), 50));
    let (_settings_tx, settings) = watch::channel(capture_config());
    let summary = CaptureDriver::new(Box::new(frames), detector().await, DETECTOR_INPUT, settings)
        .run()
        .await
        .unwrap();
    assert!(summary.clips.is_empty());
    assert_eq!(summary.frames_detected, 50);
}

#[tokio::test(start_paused = true)]
async fn test_detect_every_nth_frame() {
    let frames = VecFrameSource::new(std::iter::repeat_n(dark_frame(32), 30));
    let (_settings_tx, settings) = watch::channel(CaptureConfig {
        process_every_n: 3,
        ..capture_config()
    });
    let summary = CaptureDriver::new(Box::new(frames), detector().await, DETECTOR_INPUT, settings)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.frames_captured, 30);
    assert_eq!(summary.frames_detected, 10);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_active_recording() {
    let (_settings_tx, settings) = watch::channel(CaptureConfig {
        auto_upload: false,
        ..capture_config()
    });
    let (shutdown_tx, shutdown) = watch::channel(false);
    let driver = CaptureDriver::new(
        Box::new(Endless(red_frame(32))),
        detector().await,
        DETECTOR_INPUT,
        settings,
    )
    .with_shutdown(shutdown);

    let handle = tokio::spawn(driver.run());
    tokio::time::sleep(Duration::from_secs(3)).await;
    shutdown_tx.send_replace(true);

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.clips.len(), 1);
    assert!(summary.clips[0].frames_with_animals > 10);
    assert_eq!(summary.clips[0].classification, ClassificationStatus::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_manual_commands_drive_recording() {
    let (_settings_tx, settings) = watch::channel(CaptureConfig {
        auto_record: false,
        auto_upload: false,
        ..capture_config()
    });
    let (commands_tx, commands) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown) = watch::channel(false);
    let driver = CaptureDriver::new(
        Box::new(Endless(red_frame(32))),
        detector().await,
        DETECTOR_INPUT,
        settings,
    )
    .with_commands(commands)
    .with_shutdown(shutdown);

    let handle = tokio::spawn(driver.run());
    tokio::time::sleep(Duration::from_millis(500)).await;
    commands_tx.send(CaptureCommand::StartRecording).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    commands_tx.send(CaptureCommand::StopRecording).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown_tx.send_replace(true);

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.clips.len(), 1);
    let clip = &summary.clips[0];
    assert!(clip.frames_with_animals > 0);
    assert!(!clip.media.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_settings_update_applies_while_running() {
    let (settings_tx, settings) = watch::channel(CaptureConfig {
        auto_record: false,
        auto_upload: false,
        ..capture_config()
    });
    let (shutdown_tx, shutdown) = watch::channel(false);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let driver = CaptureDriver::new(
        Box::new(Endless(red_frame(32))),
        detector().await,
        DETECTOR_INPUT,
        settings,
    )
    .with_shutdown(shutdown)
    .with_events(events_tx);

    let handle = tokio::spawn(driver.run());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(events.try_recv().is_err());

    settings_tx.send_replace(CaptureConfig {
        auto_upload: false,
        ..capture_config()
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(matches!(
        events.try_recv(),
        Ok(CaptureEvent::RecordingStarted { .. })
    ));
    shutdown_tx.send_replace(true);

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.clips.len(), 1);
}

//! The capture loop.
//!
//! One task ticks at the configured frame rate. Each tick pulls a frame,
//! feeds the recorder, and every Nth frame goes to the detector if no
//! detection is already in flight. Classification and upload run as
//! separate tasks and report back by clip id, so the loop never waits on
//! them.

use super::classify::classify_key_frames;
use super::controller::{CaptureController, FinishedRecording, Transition};
use super::counts::SpeciesCounts;
use super::recorder::{MjpegRecorderFactory, RecorderFactory};
use crate::clip::{
    ClassificationStatus, Clip, ClipAssembler, ClipUploader, UploadResult, UploadStatus,
};
use crate::config::{CaptureConfig, ClassifierConfig};
use crate::error::{Error, Result};
use crate::frame::{FrameSource, PixelFrame};
use crate::inference::Detection;
use crate::runtime::ExecutionContext;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Requests accepted while the loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    /// Start a recording now.
    StartRecording,
    /// Stop the active recording.
    StopRecording,
}

/// Notifications emitted while the loop runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A recording started.
    RecordingStarted {
        /// New clip id.
        clip_id: String,
    },
    /// A recording stopped and its clip exists with live counts.
    ClipReady {
        /// Clip id.
        clip_id: String,
    },
    /// Classification of a clip settled.
    ClipClassified {
        /// Clip id.
        clip_id: String,
        /// Outcome.
        status: ClassificationStatus,
    },
    /// Upload of a clip settled.
    ClipUploaded {
        /// Clip id.
        clip_id: String,
        /// Outcome.
        status: UploadStatus,
    },
}

/// What a capture run produced.
#[derive(Debug, Clone, Default)]
pub struct CaptureSummary {
    /// Frames pulled from the source.
    pub frames_captured: u64,
    /// Frames the detector finished.
    pub frames_detected: u64,
    /// Frames skipped because a detection was in flight.
    pub frames_dropped: u64,
    /// Detector calls that failed.
    pub detection_errors: u64,
    /// Every clip, in id order.
    pub clips: Vec<Clip>,
}

enum TaskOutcome {
    Classified {
        clip_id: String,
        outcome: Result<Option<SpeciesCounts>>,
    },
    Uploaded {
        clip_id: String,
        outcome: Result<UploadResult>,
    },
}

type DetectTask = JoinHandle<(PixelFrame, Result<Vec<Detection>>)>;

struct Classifier {
    context: Arc<ExecutionContext>,
    config: Arc<ClassifierConfig>,
}

/// Drives a frame source through detection, recording and clip handoff.
pub struct CaptureDriver {
    source: Box<dyn FrameSource>,
    detector: Arc<ExecutionContext>,
    detector_input_size: u32,
    settings: watch::Receiver<CaptureConfig>,
    classifier: Option<Classifier>,
    uploader: Option<Arc<dyn ClipUploader>>,
    recorders: Box<dyn RecorderFactory>,
    shutdown: Option<watch::Receiver<bool>>,
    commands: Option<mpsc::UnboundedReceiver<CaptureCommand>>,
    events: Option<mpsc::UnboundedSender<CaptureEvent>>,
}

impl CaptureDriver {
    /// Driver over `source` using a loaded detector whose boxes live in a
    /// `detector_input_size` square.
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Arc<ExecutionContext>,
        detector_input_size: u32,
        settings: watch::Receiver<CaptureConfig>,
    ) -> Self {
        Self {
            source,
            detector,
            detector_input_size,
            settings,
            classifier: None,
            uploader: None,
            recorders: Box::new(MjpegRecorderFactory),
            shutdown: None,
            commands: None,
            events: None,
        }
    }

    /// Classify key frames of every finished clip.
    #[must_use]
    pub fn with_classifier(
        mut self,
        context: Arc<ExecutionContext>,
        config: ClassifierConfig,
    ) -> Self {
        self.classifier = Some(Classifier {
            context,
            config: Arc::new(config),
        });
        self
    }

    /// Hand finished clips to `uploader` when auto-upload is on.
    #[must_use]
    pub fn with_uploader(mut self, uploader: Arc<dyn ClipUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Use a different clip encoder.
    #[must_use]
    pub fn with_recorder(mut self, recorders: Box<dyn RecorderFactory>) -> Self {
        self.recorders = recorders;
        self
    }

    /// Stop the loop once the value becomes `true`.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Accept manual start/stop commands.
    #[must_use]
    pub fn with_commands(mut self, commands: mpsc::UnboundedReceiver<CaptureCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Report lifecycle events.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<CaptureEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run until the source ends or shutdown is signalled, then wait for
    /// outstanding classification and upload tasks.
    pub async fn run(mut self) -> Result<CaptureSummary> {
        let config = self.settings.borrow_and_update().clone();
        let mut interval = frame_interval(&config);
        let mut state = LoopState::new(
            CaptureController::new(config.clone(), self.recorders),
            ClipAssembler::new(config.resolved_device_id()),
            self.classifier,
            self.uploader,
            self.events,
            self.detector_input_size,
        );
        let mut in_flight: Option<DetectTask> = None;
        let mut tick: u64 = 0;

        info!(
            "Capture loop started: {} fps, detecting every {} frame(s)",
            config.target_fps, config.process_every_n
        );

        loop {
            interval.tick().await;
            if self.shutdown.as_ref().is_some_and(|s| *s.borrow()) {
                info!("Shutdown requested, stopping capture loop");
                break;
            }

            if self.settings.has_changed().unwrap_or(false) {
                let config = self.settings.borrow_and_update().clone();
                if config.frame_interval() != state.controller.config().frame_interval() {
                    interval = frame_interval(&config);
                }
                debug!("Capture settings updated");
                state.controller.set_config(config);
            }

            let now = clock_now();

            if let Some(commands) = self.commands.as_mut() {
                while let Ok(command) = commands.try_recv() {
                    state.command(command, now);
                }
            }

            if in_flight.as_ref().is_some_and(JoinHandle::is_finished)
                && let Some(task) = in_flight.take()
            {
                state.settle_detection(task.await, now);
            }

            state.drain_outcomes();

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Frame source exhausted");
                    break;
                }
                Err(e) => {
                    warn!("Frame capture failed: {e}");
                    continue;
                }
            };
            state.summary.frames_captured += 1;

            match state.controller.record_frame(&frame, now) {
                Ok(Some(finished)) => state.finished(finished),
                Ok(None) => {}
                Err(e) => warn!("Recording failed: {e}"),
            }

            let every = u64::from(state.controller.config().process_every_n.max(1));
            if tick % every == 0 {
                if in_flight.is_none() {
                    let detector = Arc::clone(&self.detector);
                    in_flight = Some(tokio::spawn(async move {
                        let result = detector.detect(frame.clone()).await;
                        (frame, result)
                    }));
                } else {
                    debug!("Detector busy, dropping frame");
                    state.summary.frames_dropped += 1;
                }
            }
            tick += 1;

            match state.controller.poll_silence(now) {
                Ok(Some(finished)) => state.finished(finished),
                Ok(None) => {}
                Err(e) => warn!("Recording failed: {e}"),
            }
        }

        if let Some(task) = in_flight.take() {
            state.settle_detection(task.await, clock_now());
        }
        match state.controller.finish(clock_now()) {
            Ok(Some(finished)) => state.finished(finished),
            Ok(None) => {}
            Err(e) => warn!("Recording failed: {e}"),
        }
        state.drain_remaining().await;

        let mut summary = state.summary;
        summary.clips = state.assembler.clips().cloned().collect();
        info!(
            "Capture loop finished: {} frame(s), {} clip(s)",
            summary.frames_captured,
            summary.clips.len()
        );
        Ok(summary)
    }
}

fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn frame_interval(config: &CaptureConfig) -> Interval {
    let mut interval = tokio::time::interval(config.frame_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

struct LoopState {
    controller: CaptureController,
    assembler: ClipAssembler,
    classifier: Option<Classifier>,
    uploader: Option<Arc<dyn ClipUploader>>,
    events: Option<mpsc::UnboundedSender<CaptureEvent>>,
    detector_input_size: u32,
    outcome_tx: mpsc::UnboundedSender<TaskOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<TaskOutcome>,
    outstanding: usize,
    summary: CaptureSummary,
}

impl LoopState {
    fn new(
        controller: CaptureController,
        assembler: ClipAssembler,
        classifier: Option<Classifier>,
        uploader: Option<Arc<dyn ClipUploader>>,
        events: Option<mpsc::UnboundedSender<CaptureEvent>>,
        detector_input_size: u32,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            controller,
            assembler,
            classifier,
            uploader,
            events,
            detector_input_size,
            outcome_tx,
            outcome_rx,
            outstanding: 0,
            summary: CaptureSummary::default(),
        }
    }

    fn emit(&self, event: CaptureEvent) {
        if let Some(events) = &self.events {
            // Nobody listening is fine.
            events.send(event).ok();
        }
    }

    fn command(&mut self, command: CaptureCommand, now: Instant) {
        match command {
            CaptureCommand::StartRecording => match self.controller.start_recording(now) {
                Ok(clip_id) => self.emit(CaptureEvent::RecordingStarted { clip_id }),
                Err(e) => warn!("Cannot start recording: {e}"),
            },
            CaptureCommand::StopRecording => match self.controller.stop_recording(now) {
                Ok(finished) => self.finished(finished),
                Err(e) => warn!("Cannot stop recording: {e}"),
            },
        }
    }

    fn settle_detection(
        &mut self,
        joined: std::result::Result<(PixelFrame, Result<Vec<Detection>>), tokio::task::JoinError>,
        now: Instant,
    ) {
        let (frame, detections) = match joined {
            Ok((frame, Ok(detections))) => (frame, detections),
            Ok((_, Err(e))) => {
                self.summary.detection_errors += 1;
                if e.is_transient() {
                    debug!("Detection failed: {e}");
                } else {
                    warn!("Detection failed: {e}");
                }
                return;
            }
            Err(e) => {
                self.summary.detection_errors += 1;
                warn!("Detection task failed: {e}");
                return;
            }
        };
        self.summary.frames_detected += 1;
        if !detections.is_empty() {
            debug!("{} detection(s)", detections.len());
        }

        match self.controller.observe(&frame, &detections, now) {
            Ok(Transition::Started { clip_id }) => {
                self.emit(CaptureEvent::RecordingStarted { clip_id });
            }
            Ok(Transition::Stopped(finished)) => self.finished(*finished),
            Ok(Transition::Unchanged) => {}
            Err(e) => warn!("Recording did not start: {e}"),
        }
    }

    fn finished(&mut self, mut recording: FinishedRecording) {
        let key_frames = std::mem::take(&mut recording.key_frames);
        let classifier = self
            .classifier
            .as_ref()
            .filter(|c| c.config.enabled && !key_frames.is_empty());

        let clip_id = self
            .assembler
            .assemble(recording, classifier.is_some())
            .id
            .clone();
        self.emit(CaptureEvent::ClipReady {
            clip_id: clip_id.clone(),
        });

        if let Some(classifier) = classifier {
            let context = Arc::clone(&classifier.context);
            let config = Arc::clone(&classifier.config);
            let tx = self.outcome_tx.clone();
            let input_size = self.detector_input_size;
            debug!("Classifying {} key frame(s) of {clip_id}", key_frames.len());
            tokio::spawn(async move {
                let outcome = classify_key_frames(&context, &key_frames, &config, input_size).await;
                tx.send(TaskOutcome::Classified { clip_id, outcome }).ok();
            });
            self.outstanding += 1;
        } else {
            self.maybe_upload(&clip_id);
        }
    }

    fn maybe_upload(&mut self, clip_id: &str) {
        if !self.controller.config().auto_upload {
            return;
        }
        let Some(uploader) = self.uploader.clone() else {
            return;
        };
        let request = match self.assembler.begin_upload(clip_id) {
            Ok(request) => request,
            Err(e) => {
                warn!("Cannot upload {clip_id}: {e}");
                return;
            }
        };

        let tx = self.outcome_tx.clone();
        let clip_id = clip_id.to_string();
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || uploader.upload(&request))
                .await
                .unwrap_or_else(|e| {
                    Err(Error::Upload {
                        reason: e.to_string(),
                    })
                });
            tx.send(TaskOutcome::Uploaded { clip_id, outcome }).ok();
        });
        self.outstanding += 1;
    }

    fn settle_outcome(&mut self, outcome: TaskOutcome) {
        self.outstanding = self.outstanding.saturating_sub(1);
        match outcome {
            TaskOutcome::Classified { clip_id, outcome } => {
                match self.assembler.apply_classification(&clip_id, outcome) {
                    Ok(clip) => {
                        let status = clip.classification.clone();
                        self.emit(CaptureEvent::ClipClassified {
                            clip_id: clip_id.clone(),
                            status,
                        });
                        self.maybe_upload(&clip_id);
                    }
                    Err(e) => warn!("Dropping classification for {clip_id}: {e}"),
                }
            }
            TaskOutcome::Uploaded { clip_id, outcome } => {
                match self.assembler.complete_upload(&clip_id, outcome) {
                    Ok(clip) => {
                        let status = clip.upload.clone();
                        self.emit(CaptureEvent::ClipUploaded { clip_id, status });
                    }
                    Err(e) => warn!("Dropping upload result for {clip_id}: {e}"),
                }
            }
        }
    }

    fn drain_outcomes(&mut self) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.settle_outcome(outcome);
        }
    }

    async fn drain_remaining(&mut self) {
        while self.outstanding > 0 {
            let Some(outcome) = self.outcome_rx.recv().await else {
                break;
            };
            self.settle_outcome(outcome);
        }
    }
}

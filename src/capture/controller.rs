//! Recording state machine.
//!
//! The controller is synchronous and clock-agnostic: every operation takes
//! the current [`Instant`], so the capture driver and the tests decide what
//! time it is.

use super::counts::SpeciesCounts;
use super::keyframes::{KeyFrame, KeyFrameSampler};
use super::recorder::{Recorder, RecorderFactory, encode_jpeg};
use crate::clip::clip_id;
use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::frame::PixelFrame;
use crate::inference::Detection;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Whether a recording is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Waiting for a trigger.
    Idle,
    /// A recording is active.
    Recording,
}

/// Why a recording ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No detection for longer than the silence timeout.
    Silence,
    /// The encoded clip reached the size cap.
    SizeCap,
    /// Stopped on request.
    Manual,
    /// The frame source ran dry or the loop was shut down.
    EndOfStream,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Silence => "silence",
            Self::SizeCap => "size cap",
            Self::Manual => "manual",
            Self::EndOfStream => "end of stream",
        };
        f.write_str(text)
    }
}

/// State owned by one active recording. Created fresh on every start.
pub struct RecordingSession {
    clip_id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    recorder: Box<dyn Recorder>,
    last_detection: Option<Instant>,
    species_counts: SpeciesCounts,
    frames_with_animals: u32,
    key_frames: KeyFrameSampler,
    thumbnail: Option<PixelFrame>,
    last_frame: Option<PixelFrame>,
}

impl fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSession")
            .field("clip_id", &self.clip_id)
            .field("started_at", &self.started_at)
            .field("frames_with_animals", &self.frames_with_animals)
            .field("species_counts", &self.species_counts)
            .field("key_frames", &self.key_frames.len())
            .finish_non_exhaustive()
    }
}

impl RecordingSession {
    /// Identifier of the clip being recorded.
    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }

    /// Wall-clock start.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Running per-species maximum.
    pub const fn species_counts(&self) -> &SpeciesCounts {
        &self.species_counts
    }

    /// Frames with at least one qualifying detection.
    pub const fn frames_with_animals(&self) -> u32 {
        self.frames_with_animals
    }

    /// Key frames kept so far.
    pub fn key_frame_count(&self) -> usize {
        self.key_frames.len()
    }

    /// Encoded bytes so far.
    pub fn encoded_size(&self) -> u64 {
        self.recorder.encoded_size()
    }

    fn account(&mut self, frame: &PixelFrame, detections: &[Detection], now: Instant) {
        self.last_detection = Some(now);
        self.frames_with_animals += 1;
        self.species_counts
            .merge_max(&SpeciesCounts::from_detections(detections));
        let offset = now.saturating_duration_since(self.started);
        if self.key_frames.offer(frame, detections, offset) {
            debug!("Key frame at {:.1}s", offset.as_secs_f32());
        }
        if self.thumbnail.is_none() {
            self.thumbnail = Some(frame.clone());
        }
    }
}

/// A recording that has just stopped.
#[derive(Debug, Clone)]
pub struct FinishedRecording {
    /// Clip identifier assigned at start.
    pub clip_id: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub ended_at: DateTime<Utc>,
    /// Encoded media.
    pub media: Bytes,
    /// Encoded thumbnail.
    pub thumbnail: Option<Bytes>,
    /// Live counts (running maximum).
    pub species_counts: SpeciesCounts,
    /// Frames with at least one qualifying detection.
    pub frames_with_animals: u32,
    /// Frames kept for classification.
    pub key_frames: Vec<KeyFrame>,
    /// Why the recording ended.
    pub reason: StopReason,
}

/// Outcome of feeding detections to the controller.
#[derive(Debug)]
pub enum Transition {
    /// Nothing changed.
    Unchanged,
    /// A recording started.
    Started {
        /// Identifier of the new clip.
        clip_id: String,
    },
    /// The active recording stopped.
    Stopped(Box<FinishedRecording>),
}

/// Decides when to record and collects per-recording state.
pub struct CaptureController {
    config: CaptureConfig,
    recorders: Box<dyn RecorderFactory>,
    session: Option<RecordingSession>,
    next_seq: u64,
}

impl fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureController")
            .field("state", &self.state())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl CaptureController {
    /// Idle controller.
    pub fn new(config: CaptureConfig, recorders: Box<dyn RecorderFactory>) -> Self {
        Self {
            config,
            recorders,
            session: None,
            next_seq: 1,
        }
    }

    /// Current state.
    pub const fn state(&self) -> CaptureState {
        if self.session.is_some() {
            CaptureState::Recording
        } else {
            CaptureState::Idle
        }
    }

    /// Whether a recording is active.
    pub const fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// The active recording.
    pub const fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    /// Current settings.
    pub const fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Replace the settings. An active recording keeps its key-frame window.
    pub fn set_config(&mut self, config: CaptureConfig) {
        self.config = config;
    }

    fn begin(&mut self, now: Instant) -> Result<String> {
        let recorder = self
            .recorders
            .create(&self.config)
            .map_err(|e| match e {
                Error::CaptureHardware { .. } => e,
                other => Error::CaptureHardware {
                    reason: other.to_string(),
                },
            })?;

        let started_at = Utc::now();
        let id = clip_id(started_at, self.next_seq);
        self.next_seq += 1;

        info!("Recording started: {id}");
        self.session = Some(RecordingSession {
            clip_id: id.clone(),
            started_at,
            started: now,
            recorder,
            last_detection: None,
            species_counts: SpeciesCounts::new(),
            frames_with_animals: 0,
            key_frames: KeyFrameSampler::new(self.config.key_frame_interval()),
            thumbnail: None,
            last_frame: None,
        });
        Ok(id)
    }

    /// Start recording on request.
    ///
    /// With auto-record on, the silence timer starts now so the clip still
    /// closes if nothing is ever detected.
    pub fn start_recording(&mut self, now: Instant) -> Result<String> {
        if self.session.is_some() {
            return Err(Error::InvalidTransition {
                reason: "a recording is already active".to_string(),
            });
        }
        let id = self.begin(now)?;
        if self.config.auto_record
            && let Some(session) = self.session.as_mut()
        {
            session.last_detection = Some(now);
        }
        Ok(id)
    }

    /// Stop recording on request.
    pub fn stop_recording(&mut self, now: Instant) -> Result<FinishedRecording> {
        if self.session.is_none() {
            return Err(Error::InvalidTransition {
                reason: "no recording is active".to_string(),
            });
        }
        self.stop(now, StopReason::Manual)
    }

    /// Stop the active recording, if any, because input ended.
    pub fn finish(&mut self, now: Instant) -> Result<Option<FinishedRecording>> {
        if self.session.is_none() {
            return Ok(None);
        }
        self.stop(now, StopReason::EndOfStream).map(Some)
    }

    /// Append a captured frame to the active recording.
    ///
    /// Encoder failures on a single frame are logged and skipped. Reaching
    /// the size cap stops the recording.
    pub fn record_frame(
        &mut self,
        frame: &PixelFrame,
        now: Instant,
    ) -> Result<Option<FinishedRecording>> {
        let cap = self.config.max_file_size_bytes();
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        if let Err(e) = session.recorder.push(frame) {
            warn!("Dropping frame from {}: {e}", session.clip_id);
            return Ok(None);
        }
        session.last_frame = Some(frame.clone());
        if session.recorder.encoded_size() >= cap {
            return self.stop(now, StopReason::SizeCap).map(Some);
        }
        Ok(None)
    }

    /// Feed detector output for a frame.
    ///
    /// Only detections whose label passes the target filter count. The first
    /// qualifying detection starts a recording when auto-record is on; the
    /// triggering frame is counted in the new recording. A frame without
    /// qualifying detections may end the recording by silence.
    pub fn observe(
        &mut self,
        frame: &PixelFrame,
        detections: &[Detection],
        now: Instant,
    ) -> Result<Transition> {
        let qualifying: Vec<Detection> = detections
            .iter()
            .filter(|d| self.config.is_target_label(d.label()))
            .cloned()
            .collect();

        if qualifying.is_empty() {
            return Ok(match self.poll_silence(now)? {
                Some(finished) => Transition::Stopped(Box::new(finished)),
                None => Transition::Unchanged,
            });
        }

        let mut transition = Transition::Unchanged;
        if self.session.is_none() {
            if !self.config.auto_record {
                return Ok(Transition::Unchanged);
            }
            let clip_id = self.begin(now)?;
            transition = Transition::Started { clip_id };
        }
        if let Some(session) = self.session.as_mut() {
            session.account(frame, &qualifying, now);
        }
        Ok(transition)
    }

    /// Stop the recording if the last detection is older than the silence
    /// timeout.
    ///
    /// Silence only ends recordings while auto-record is on. Otherwise a
    /// recording runs until it is stopped, hits the size cap or input ends.
    pub fn poll_silence(&mut self, now: Instant) -> Result<Option<FinishedRecording>> {
        if !self.config.auto_record {
            return Ok(None);
        }
        let timeout = self.config.silence_timeout();
        let silent = self
            .session
            .as_ref()
            .and_then(|s| s.last_detection)
            .is_some_and(|last| now.saturating_duration_since(last) > timeout);
        if silent {
            self.stop(now, StopReason::Silence).map(Some)
        } else {
            Ok(None)
        }
    }

    fn stop(&mut self, now: Instant, reason: StopReason) -> Result<FinishedRecording> {
        let session = self.session.take().ok_or_else(|| Error::InvalidTransition {
            reason: "no recording is active".to_string(),
        })?;

        let elapsed = now.saturating_duration_since(session.started);
        let ended_at =
            session.started_at + TimeDelta::from_std(elapsed).unwrap_or_else(|_| TimeDelta::zero());
        let media = session.recorder.finish()?;

        let thumbnail = session
            .thumbnail
            .or(session.last_frame)
            .and_then(|frame| match encode_jpeg(&frame, self.config.jpeg_quality) {
                Ok(jpeg) => Some(jpeg),
                Err(e) => {
                    warn!("Thumbnail for {} failed: {e}", session.clip_id);
                    None
                }
            });

        info!(
            "Recording stopped ({reason}): {} after {:.1}s, {} frame(s) with animals",
            session.clip_id,
            elapsed.as_secs_f32(),
            session.frames_with_animals
        );

        Ok(FinishedRecording {
            clip_id: session.clip_id,
            started_at: session.started_at,
            ended_at,
            media,
            thumbnail,
            species_counts: session.species_counts,
            frames_with_animals: session.frames_with_animals,
            key_frames: session.key_frames.into_frames(),
            reason,
        })
    }
}

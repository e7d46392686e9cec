//! Live capture: recording decisions, key frames and the capture loop.

mod classify;
mod controller;
mod counts;
mod driver;
mod keyframes;
mod recorder;

pub use classify::classify_key_frames;
pub use controller::{
    CaptureController, CaptureState, FinishedRecording, RecordingSession, StopReason, Transition,
};
pub use counts::SpeciesCounts;
pub use driver::{CaptureCommand, CaptureDriver, CaptureEvent, CaptureSummary};
pub use keyframes::{KeyFrame, KeyFrameSampler};
pub use recorder::{MjpegRecorder, MjpegRecorderFactory, Recorder, RecorderFactory, encode_jpeg};

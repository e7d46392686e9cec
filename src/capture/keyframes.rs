//! Key-frame sampling during a recording.

use crate::frame::PixelFrame;
use crate::inference::Detection;
use std::time::Duration;

/// A frame kept for second-pass classification.
#[derive(Debug, Clone)]
pub struct KeyFrame {
    /// Snapshot of the frame. Shares pixels with the original.
    pub frame: PixelFrame,
    /// Detections found on this frame.
    pub detections: Vec<Detection>,
    /// Time since the recording started.
    pub offset: Duration,
}

/// Keeps at most one key frame per time window.
#[derive(Debug)]
pub struct KeyFrameSampler {
    interval: Duration,
    last_window: Option<u128>,
    frames: Vec<KeyFrame>,
}

impl KeyFrameSampler {
    /// Sampler with one slot per `interval`. A zero interval keeps every frame.
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_window: None,
            frames: Vec::new(),
        }
    }

    fn window(&self, offset: Duration) -> u128 {
        let interval = self.interval.as_millis();
        if interval == 0 {
            return offset.as_nanos();
        }
        offset.as_millis() / interval
    }

    /// Keep the frame if its window has no key frame yet. Returns whether it
    /// was kept.
    pub fn offer(&mut self, frame: &PixelFrame, detections: &[Detection], offset: Duration) -> bool {
        let window = self.window(offset);
        if self.last_window.is_some_and(|last| last >= window) {
            return false;
        }
        self.last_window = Some(window);
        self.frames.push(KeyFrame {
            frame: frame.clone(),
            detections: detections.to_vec(),
            offset,
        });
        true
    }

    /// Number of key frames kept.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing was kept.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Take the kept key frames.
    pub fn into_frames(self) -> Vec<KeyFrame> {
        self.frames
    }
}

//! Inference on the calling task.

use super::messages::{LoadRequest, ReadyPayload};
use super::pipeline::InferencePipeline;
use crate::error::Result;
use crate::frame::PixelFrame;
use crate::inference::{Classification, Detection};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Runs the pipeline inline behind a mutex.
///
/// Useful when no extra thread is wanted (tests, single-shot CLI commands).
/// Inference blocks the caller for the duration of the model run.
#[derive(Debug)]
pub struct DirectContext {
    pipeline: Mutex<InferencePipeline>,
}

impl DirectContext {
    /// Wrap a pipeline.
    pub const fn new(pipeline: InferencePipeline) -> Self {
        Self {
            pipeline: Mutex::new(pipeline),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InferencePipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load or refresh the model.
    pub fn load(&self, request: &LoadRequest) -> Result<ReadyPayload> {
        self.lock().load(request)
    }

    /// Whether a session exists.
    pub fn is_ready(&self) -> bool {
        self.lock().is_loaded()
    }

    /// Run detection.
    pub fn detect(&self, frame: &PixelFrame) -> Result<Vec<Detection>> {
        self.lock().detect(frame)
    }

    /// Run classification.
    pub fn classify(&self, frame: &PixelFrame) -> Result<Vec<Classification>> {
        self.lock().classify(frame)
    }
}

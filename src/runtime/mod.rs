//! Execution contexts that own a model pipeline.
//!
//! Callers talk to an [`ExecutionContext`] and never see which backend runs
//! the model: the worker backend moves the pipeline onto its own thread and
//! correlates requests by id, the direct backend runs it inline.

mod direct;
pub mod messages;
mod pipeline;
mod worker;

pub use direct::DirectContext;
pub use messages::{
    Envelope, ErrorCode, ErrorPayload, InferenceOutput, LoadRequest, LoadSettings, ReadyPayload,
    Request, Response,
};
pub use pipeline::{InferencePipeline, ModelRole};
pub use worker::{SessionState, WorkerContext};

use crate::config::ExecutionMode;
use crate::error::{Error, Result};
use crate::frame::PixelFrame;
use crate::inference::{Classification, Detection};
use std::sync::atomic::{AtomicBool, Ordering};

/// A model pipeline behind one of the two execution backends.
#[derive(Debug)]
pub enum ExecutionContext {
    /// Dedicated inference thread.
    Worker(WorkerContext),
    /// Inline execution.
    Direct {
        /// The wrapped pipeline.
        context: DirectContext,
        /// Set once [`ExecutionContext::shutdown`] ran.
        closed: AtomicBool,
    },
}

impl ExecutionContext {
    /// Wrap a pipeline in the requested backend. The worker backend needs a
    /// Tokio runtime.
    pub fn new(mode: ExecutionMode, pipeline: InferencePipeline) -> Result<Self> {
        match mode {
            ExecutionMode::Worker => {
                let name = match pipeline.role() {
                    ModelRole::Detector => "detector",
                    ModelRole::Classifier => "classifier",
                };
                Ok(Self::Worker(WorkerContext::spawn(pipeline, name)?))
            }
            ExecutionMode::Direct => Ok(Self::direct(pipeline)),
        }
    }

    /// Inline backend.
    pub const fn direct(pipeline: InferencePipeline) -> Self {
        Self::Direct {
            context: DirectContext::new(pipeline),
            closed: AtomicBool::new(false),
        }
    }

    fn direct_context<'a>(
        context: &'a DirectContext,
        closed: &AtomicBool,
    ) -> Result<&'a DirectContext> {
        if closed.load(Ordering::Acquire) {
            Err(Error::WorkerClosed)
        } else {
            Ok(context)
        }
    }

    /// Load or refresh the model, resolving once it is ready or has failed.
    pub async fn load(&self, request: LoadRequest) -> Result<ReadyPayload> {
        match self {
            Self::Worker(worker) => worker.load(request).await,
            Self::Direct { context, closed } => {
                Self::direct_context(context, closed)?.load(&request)
            }
        }
    }

    /// Whether the model is ready for inference.
    pub fn is_ready(&self) -> bool {
        match self {
            Self::Worker(worker) => worker.is_ready(),
            Self::Direct { context, closed } => {
                !closed.load(Ordering::Acquire) && context.is_ready()
            }
        }
    }

    /// Run detection on a frame.
    pub async fn detect(&self, frame: PixelFrame) -> Result<Vec<Detection>> {
        match self {
            Self::Worker(worker) => worker.detect(frame).await,
            Self::Direct { context, closed } => {
                Self::direct_context(context, closed)?.detect(&frame)
            }
        }
    }

    /// Run classification on a frame.
    pub async fn classify(&self, frame: PixelFrame) -> Result<Vec<Classification>> {
        match self {
            Self::Worker(worker) => worker.classify(frame).await,
            Self::Direct { context, closed } => {
                Self::direct_context(context, closed)?.classify(&frame)
            }
        }
    }

    /// Release the backend. Later calls fail with [`Error::WorkerClosed`].
    pub fn shutdown(&self) {
        match self {
            Self::Worker(worker) => worker.shutdown(),
            Self::Direct { closed, .. } => closed.store(true, Ordering::Release),
        }
    }
}

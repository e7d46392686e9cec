//! Model session plus pre- and post-processing for one model role.

use super::messages::{
    ErrorPayload, InferenceOutput, LoadRequest, ReadyPayload, Request, Response,
};
use crate::config::InferenceDevice;
use crate::constants::{classifier, detector};
use crate::error::{Error, Result};
use crate::frame::PixelFrame;
use crate::inference::decode::decode_tensor;
use crate::inference::classify::decode_classifier_tensor;
use crate::inference::provider::device_for_backend;
use crate::inference::{
    Classification, DecodeSettings, Detection, InferenceEngine, Labels, ModelSession, run_single,
    select_providers,
};
use crate::tensor::{TensorBuilder, TensorLayout};
use std::sync::Arc;
use tracing::{debug, info};

/// What a pipeline's model does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Object detector: planar input, box output.
    Detector,
    /// Species classifier: interleaved input, score vector output.
    Classifier,
}

impl ModelRole {
    const fn layout(self) -> TensorLayout {
        match self {
            Self::Detector => TensorLayout::Planar,
            Self::Classifier => TensorLayout::Interleaved,
        }
    }

    const fn default_input_size(self) -> u32 {
        match self {
            Self::Detector => detector::INPUT_SIZE,
            Self::Classifier => classifier::INPUT_SIZE,
        }
    }

    const fn default_top_k(self) -> usize {
        match self {
            Self::Detector => detector::TOP_K,
            Self::Classifier => classifier::TOP_K,
        }
    }
}

/// Owns one model session, its labels and its tensor pool.
///
/// The pipeline is single-threaded: the worker backend moves it onto its own
/// thread, the direct backend guards it with a mutex.
pub struct InferencePipeline {
    role: ModelRole,
    engine: Arc<dyn InferenceEngine>,
    device: InferenceDevice,
    session: Option<Box<dyn ModelSession>>,
    labels: Labels,
    settings: DecodeSettings,
    builder: TensorBuilder,
}

impl std::fmt::Debug for InferencePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferencePipeline")
            .field("role", &self.role)
            .field("device", &self.device)
            .field("loaded", &self.session.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl InferencePipeline {
    /// Unloaded pipeline for a model role.
    pub fn new(role: ModelRole, engine: Arc<dyn InferenceEngine>, device: InferenceDevice) -> Self {
        let input_size = role.default_input_size();
        let settings = DecodeSettings {
            input_size,
            top_k: role.default_top_k(),
            ..DecodeSettings::default()
        };
        Self {
            role,
            engine,
            device,
            session: None,
            labels: Labels::default(),
            settings,
            builder: TensorBuilder::new(input_size, role.layout()),
        }
    }

    /// Model role.
    pub const fn role(&self) -> ModelRole {
        self.role
    }

    /// Whether a session exists.
    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// Current decode settings.
    pub const fn settings(&self) -> &DecodeSettings {
        &self.settings
    }

    /// Create the session, or reuse the existing one and refresh settings.
    ///
    /// A failed first load leaves the pipeline unloaded. Later loads never
    /// replace a working session; they only update labels and thresholds.
    pub fn load(&mut self, request: &LoadRequest) -> Result<ReadyPayload> {
        let labels = match &request.labels {
            Some(path) => Some(Labels::from_file(path)?),
            None => None,
        };

        if self.session.is_some() {
            info!("Session already loaded, reusing");
        } else {
            let device = device_for_backend(request.prefer_backend.as_deref(), self.device);
            let providers = select_providers(device, &self.engine.available_providers());
            info!("Loading model: {}", request.model.display());
            let session = self.engine.create(&request.model, &providers)?;
            debug!(
                "Model inputs: {:?}, outputs: {:?}",
                session.input_names(),
                session.output_names()
            );
            self.session = Some(session);
        }

        if let Some(labels) = labels {
            self.labels = labels;
        }

        let config = &request.config;
        let input_size = config.input_size.unwrap_or(self.settings.input_size);
        self.settings.input_size = input_size;
        self.builder.set_size(input_size);
        if let Some(conf) = config.conf_threshold {
            self.settings.conf_threshold = conf;
        }
        if let Some(iou) = config.iou_threshold {
            self.settings.iou_threshold = iou;
        }
        if let Some(top_k) = config.top_k {
            self.settings.top_k = top_k;
        }

        Ok(ReadyPayload {
            input_size,
            labels: self.labels.names().to_vec(),
        })
    }

    /// Run the detector on a frame. Zero-sized frames yield no detections.
    pub fn detect(&mut self, frame: &PixelFrame) -> Result<Vec<Detection>> {
        if self.role != ModelRole::Detector {
            return Err(Error::Inference {
                reason: "classifier pipeline cannot run detection".to_string(),
            });
        }
        let session = self.session.as_deref_mut().ok_or(Error::ModelNotReady)?;
        let Some(tensor) = self.builder.build(frame) else {
            debug!("Skipping empty frame");
            return Ok(Vec::new());
        };
        let output = run_single(session, tensor)?;
        Ok(decode_tensor(&output, &self.settings, &self.labels))
    }

    /// Run the classifier on a frame (typically a crop around one detection).
    pub fn classify(&mut self, frame: &PixelFrame) -> Result<Vec<Classification>> {
        if self.role != ModelRole::Classifier {
            return Err(Error::Inference {
                reason: "detector pipeline cannot run classification".to_string(),
            });
        }
        let session = self.session.as_deref_mut().ok_or(Error::ModelNotReady)?;
        let Some(tensor) = self.builder.build(frame) else {
            return Ok(Vec::new());
        };
        let output = run_single(session, tensor)?;
        Ok(decode_classifier_tensor(
            &output,
            &self.labels,
            self.settings.top_k,
        ))
    }

    /// Serve one request.
    pub fn handle(&mut self, request: Request) -> Response {
        let outcome = match request {
            Request::Load(load) => self.load(&load).map(Response::Ready),
            Request::Detect(frame) => self
                .detect(&frame)
                .map(|d| Response::Result(InferenceOutput::Detections(d))),
            Request::Classify(frame) => self
                .classify(&frame)
                .map(|c| Response::Result(InferenceOutput::Classifications(c))),
        };
        outcome.unwrap_or_else(|e| Response::Error(ErrorPayload::from(&e)))
    }
}

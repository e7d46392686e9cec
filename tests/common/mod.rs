//! Shared helpers for integration tests: an in-memory engine whose model
//! output is computed by a closure.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use wildcam::config::InferenceDevice;
use wildcam::error::{Error, Result};
use wildcam::frame::PixelFrame;
use wildcam::inference::{ExecutionProvider, InferenceEngine, ModelSession};
use wildcam::runtime::{
    ExecutionContext, InferencePipeline, LoadRequest, LoadSettings, ModelRole,
};
use wildcam::tensor::Tensor;

/// Model output as a function of the model input.
pub type Script = Arc<dyn Fn(&Tensor) -> Result<Tensor> + Send + Sync>;

/// Engine that hands out sessions running `script`.
pub struct ScriptedEngine {
    script: Script,
    pub sessions_created: Arc<AtomicUsize>,
    fail_load: bool,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            sessions_created: Arc::new(AtomicUsize::new(0)),
            fail_load: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            script: Arc::new(|_: &Tensor| -> Result<Tensor> { unreachable!() }),
            sessions_created: Arc::new(AtomicUsize::new(0)),
            fail_load: true,
        }
    }
}

struct ScriptedSession {
    script: Script,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl ModelSession for ScriptedSession {
    fn input_names(&self) -> &[String] {
        &self.inputs
    }

    fn output_names(&self) -> &[String] {
        &self.outputs
    }

    fn run(&mut self, _input_name: &str, input: &Tensor) -> Result<HashMap<String, Tensor>> {
        let output = (self.script)(input)?;
        Ok(HashMap::from([(self.outputs[0].clone(), output)]))
    }
}

impl InferenceEngine for ScriptedEngine {
    fn create(
        &self,
        model: &Path,
        _providers: &[ExecutionProvider],
    ) -> Result<Box<dyn ModelSession>> {
        if self.fail_load {
            return Err(Error::ModelLoad {
                reason: format!("cannot open {}", model.display()),
            });
        }
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
            inputs: vec!["images".to_string()],
            outputs: vec!["output0".to_string()],
        }))
    }
}

/// Red frames contain an animal, anything else is empty.
pub fn red_frame(size: u32) -> PixelFrame {
    PixelFrame::filled(size, size, [255, 0, 0, 255])
}

pub fn dark_frame(size: u32) -> PixelFrame {
    PixelFrame::filled(size, size, [0, 0, 0, 255])
}

/// Detector that reports one box covering the middle of the input whenever
/// the first input value (top-left red channel) is bright.
pub fn red_detector_script() -> Script {
    Arc::new(|input: &Tensor| {
        let size = input.shape()[2] as f32;
        if input.data()[0] > 0.5 {
            Tensor::new(
                vec![1, 1, 6],
                vec![size * 0.1, size * 0.1, size * 0.9, size * 0.9, 0.9, 0.0],
            )
        } else {
            Tensor::new(vec![1, 0, 6], Vec::new())
        }
    })
}

/// Classifier that always favours class 1.
pub fn fixed_classifier_script() -> Script {
    Arc::new(|_: &Tensor| Tensor::new(vec![1, 3], vec![0.05, 0.9, 0.05]))
}

/// Pipeline with a scripted engine, loaded through a direct context.
pub async fn loaded_context(
    role: ModelRole,
    engine: ScriptedEngine,
    labels: Option<&Path>,
    input_size: u32,
) -> Arc<ExecutionContext> {
    let pipeline = InferencePipeline::new(role, Arc::new(engine), InferenceDevice::Cpu);
    let context = Arc::new(ExecutionContext::direct(pipeline));
    context
        .load(LoadRequest {
            model: "scripted.onnx".into(),
            labels: labels.map(Path::to_path_buf),
            prefer_backend: None,
            config: LoadSettings {
                input_size: Some(input_size),
                ..LoadSettings::default()
            },
        })
        .await
        .unwrap();
    context
}

pub fn write_labels(dir: &Path, name: &str, labels: &[&str]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string(labels).unwrap()).unwrap();
    path
}

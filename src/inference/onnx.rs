//! ONNX Runtime adapter.

use super::engine::{InferenceEngine, ModelSession};
use super::provider::ExecutionProvider;
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use ort::execution_providers::{self as ep, ExecutionProvider as _, ExecutionProviderDispatch};
use ort::session::Session;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Creates ONNX Runtime sessions.
#[derive(Debug, Default)]
pub struct OnnxEngine;

impl OnnxEngine {
    /// New engine handle. The runtime library is loaded on first use.
    pub const fn new() -> Self {
        Self
    }
}

fn load_error(e: impl std::fmt::Display) -> Error {
    Error::ModelLoad {
        reason: e.to_string(),
    }
}

fn inference_error(e: impl std::fmt::Display) -> Error {
    Error::Inference {
        reason: e.to_string(),
    }
}

fn is_available(provider: ExecutionProvider) -> bool {
    let available = match provider {
        ExecutionProvider::Cpu => return true,
        ExecutionProvider::TensorRt => ep::TensorRTExecutionProvider::default().is_available(),
        ExecutionProvider::Cuda => ep::CUDAExecutionProvider::default().is_available(),
        ExecutionProvider::DirectMl => ep::DirectMLExecutionProvider::default().is_available(),
        ExecutionProvider::CoreMl => ep::CoreMLExecutionProvider::default().is_available(),
        ExecutionProvider::Rocm => ep::ROCmExecutionProvider::default().is_available(),
        ExecutionProvider::OpenVino => ep::OpenVINOExecutionProvider::default().is_available(),
    };
    available.unwrap_or(false)
}

fn dispatch(provider: ExecutionProvider) -> ExecutionProviderDispatch {
    match provider {
        ExecutionProvider::TensorRt => ep::TensorRTExecutionProvider::default().build(),
        ExecutionProvider::Cuda => ep::CUDAExecutionProvider::default().build(),
        ExecutionProvider::DirectMl => ep::DirectMLExecutionProvider::default().build(),
        ExecutionProvider::CoreMl => ep::CoreMLExecutionProvider::default().build(),
        ExecutionProvider::Rocm => ep::ROCmExecutionProvider::default().build(),
        ExecutionProvider::OpenVino => ep::OpenVINOExecutionProvider::default().build(),
        ExecutionProvider::Cpu => ep::CPUExecutionProvider::default().build(),
    }
}

impl InferenceEngine for OnnxEngine {
    fn create(
        &self,
        model: &Path,
        providers: &[ExecutionProvider],
    ) -> Result<Box<dyn ModelSession>> {
        if !model.exists() {
            return Err(Error::ModelFileNotFound {
                path: model.to_path_buf(),
            });
        }

        debug!(
            "Creating ONNX session for {} with providers {:?}",
            model.display(),
            providers
        );
        let session = Session::builder()
            .map_err(load_error)?
            .with_execution_providers(
                providers
                    .iter()
                    .copied()
                    .map(dispatch)
                    .collect::<Vec<_>>(),
            )
            .map_err(load_error)?
            .commit_from_file(model)
            .map_err(load_error)?;

        let input_names = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
        info!("Loaded ONNX model: {}", model.display());

        Ok(Box::new(OnnxSession {
            session,
            input_names,
            output_names,
        }))
    }

    fn available_providers(&self) -> Vec<ExecutionProvider> {
        super::provider::GPU_PRIORITY
            .iter()
            .copied()
            .filter(|p| is_available(*p))
            .chain(std::iter::once(ExecutionProvider::Cpu))
            .collect()
    }
}

struct OnnxSession {
    session: Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl ModelSession for OnnxSession {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }

    fn run(&mut self, input_name: &str, input: &Tensor) -> Result<HashMap<String, Tensor>> {
        let shape: Vec<i64> = input
            .shape()
            .iter()
            .map(|&d| i64::try_from(d).unwrap_or(i64::MAX))
            .collect();
        let data = input.data().to_vec().into_boxed_slice();
        let value = ort::value::Tensor::from_array((shape, data)).map_err(inference_error)?;

        let outputs = self
            .session
            .run(ort::inputs![input_name => value])
            .map_err(inference_error)?;

        let mut result = HashMap::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let (shape, data) = outputs[name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(inference_error)?;
            let dims = shape
                .iter()
                .map(|&d| usize::try_from(d).unwrap_or(0))
                .collect();
            result.insert(name.clone(), Tensor::new(dims, data.to_vec())?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_fails_before_runtime_load() {
        let engine = OnnxEngine::new();
        let result = engine.create(
            Path::new("/nonexistent/detector.onnx"),
            &[ExecutionProvider::Cpu],
        );
        assert!(matches!(result, Err(Error::ModelFileNotFound { .. })));
    }
}

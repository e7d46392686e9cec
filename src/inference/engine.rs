//! Model execution seam.
//!
//! The pipeline only needs "run model M on tensor T, get named tensors back".
//! [`InferenceEngine`] creates sessions and [`ModelSession`] runs them; the
//! ONNX Runtime adapter lives behind the `onnx` feature and tests plug in
//! scripted engines.

use super::provider::ExecutionProvider;
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A loaded model that maps named input tensors to named output tensors.
pub trait ModelSession: Send {
    /// Model input names in declaration order.
    fn input_names(&self) -> &[String];

    /// Model output names in declaration order.
    fn output_names(&self) -> &[String];

    /// Run the model on one input tensor.
    fn run(&mut self, input_name: &str, input: &Tensor) -> Result<HashMap<String, Tensor>>;
}

/// Factory for model sessions.
pub trait InferenceEngine: Send + Sync {
    /// Load a model using the first provider in `providers` that works.
    fn create(
        &self,
        model: &Path,
        providers: &[ExecutionProvider],
    ) -> Result<Box<dyn ModelSession>>;

    /// Providers this engine can use on this machine.
    fn available_providers(&self) -> Vec<ExecutionProvider> {
        vec![ExecutionProvider::Cpu]
    }
}

/// Run a single-input, single-output model and return its first output.
pub fn run_single(session: &mut dyn ModelSession, input: &Tensor) -> Result<Tensor> {
    let input_name = session
        .input_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::Inference {
            reason: "model declares no inputs".to_string(),
        })?;
    let output_name = session
        .output_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::Inference {
            reason: "model declares no outputs".to_string(),
        })?;

    let mut outputs = session.run(&input_name, input)?;
    outputs.remove(&output_name).ok_or_else(|| Error::Inference {
        reason: format!("model produced no '{output_name}' output"),
    })
}

/// The engine compiled into this build.
#[cfg(feature = "onnx")]
pub fn default_engine() -> Result<Arc<dyn InferenceEngine>> {
    Ok(Arc::new(super::onnx::OnnxEngine::new()))
}

/// The engine compiled into this build.
#[cfg(not(feature = "onnx"))]
pub fn default_engine() -> Result<Arc<dyn InferenceEngine>> {
    Err(Error::ModelLoad {
        reason: "built without the `onnx` feature; rebuild with --features onnx".to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Echo {
        inputs: Vec<String>,
        outputs: Vec<String>,
    }

    impl ModelSession for Echo {
        fn input_names(&self) -> &[String] {
            &self.inputs
        }

        fn output_names(&self) -> &[String] {
            &self.outputs
        }

        fn run(&mut self, _input_name: &str, input: &Tensor) -> Result<HashMap<String, Tensor>> {
            Ok(self
                .outputs
                .iter()
                .map(|name| (name.clone(), input.clone()))
                .collect())
        }
    }

    #[test]
    fn test_run_single_uses_first_output() {
        let mut session = Echo {
            inputs: vec!["images".to_string()],
            outputs: vec!["output0".to_string(), "aux".to_string()],
        };
        let input = Tensor::new(vec![1, 2], vec![0.5, 0.25]).unwrap();
        let out = run_single(&mut session, &input).unwrap();
        assert_eq!(out.data(), &[0.5, 0.25]);
    }

    #[test]
    fn test_run_single_without_inputs_fails() {
        let mut session = Echo {
            inputs: Vec::new(),
            outputs: vec!["output0".to_string()],
        };
        let input = Tensor::new(vec![1], vec![0.0]).unwrap();
        assert!(matches!(
            run_single(&mut session, &input),
            Err(Error::Inference { .. })
        ));
    }
}

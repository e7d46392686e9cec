//! Request and response envelopes exchanged with an inference pipeline.
//!
//! On the wire each message is a JSON object
//! `{"type": ..., "payload": ..., "id": ...}`. `load` and its `ready` answer
//! carry no id; `detect`/`classify` requests carry one and get exactly one
//! `result` or `error` back with the same id.

use crate::error::{Error, Result};
use crate::frame::PixelFrame;
use crate::inference::{Classification, Detection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Model settings sent with a load request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSettings {
    /// Square model input edge.
    pub input_size: Option<u32>,
    /// Minimum detection score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conf_threshold: Option<f32>,
    /// NMS overlap threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iou_threshold: Option<f32>,
    /// Maximum results returned.
    #[serde(rename = "topk", skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

/// Load (or refresh) the model of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    /// Model file.
    #[serde(rename = "modelUrl")]
    pub model: PathBuf,
    /// Labels file.
    #[serde(rename = "labelsUrl", default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<PathBuf>,
    /// Backend hint such as `"webgpu"` or `"cpu"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer_backend: Option<String>,
    /// Decoding settings.
    #[serde(default)]
    pub config: LoadSettings,
}

/// Sent once a model is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    /// Input edge the pipeline resizes frames to.
    pub input_size: u32,
    /// Class labels in index order.
    pub labels: Vec<String>,
}

/// Payload of a successful inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InferenceOutput {
    /// Detector output.
    Detections(Vec<Detection>),
    /// Classifier output.
    Classifications(Vec<Classification>),
}

/// Failure category carried in an error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The model could not be loaded.
    ModelLoad,
    /// No model has been loaded yet.
    NotReady,
    /// One inference call failed.
    Inference,
}

/// Payload of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Failure category.
    pub code: ErrorCode,
    /// Human-readable reason.
    pub message: String,
}

impl From<&Error> for ErrorPayload {
    fn from(error: &Error) -> Self {
        let code = match error {
            Error::ModelNotReady => ErrorCode::NotReady,
            Error::ModelLoad { .. }
            | Error::ModelFileNotFound { .. }
            | Error::LabelsRead { .. }
            | Error::LabelsParse { .. } => ErrorCode::ModelLoad,
            _ => ErrorCode::Inference,
        };
        Self {
            code,
            message: error.to_string(),
        }
    }
}

impl From<ErrorPayload> for Error {
    fn from(payload: ErrorPayload) -> Self {
        match payload.code {
            ErrorCode::NotReady => Self::ModelNotReady,
            ErrorCode::ModelLoad => Self::ModelLoad {
                reason: payload.message,
            },
            ErrorCode::Inference => Self::Inference {
                reason: payload.message,
            },
        }
    }
}

/// Messages a pipeline accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Request {
    /// Create or refresh the model session.
    Load(LoadRequest),
    /// Run the detector on a frame.
    Detect(PixelFrame),
    /// Run the classifier on a frame.
    Classify(PixelFrame),
}

/// Messages a pipeline produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Response {
    /// Model loaded.
    Ready(ReadyPayload),
    /// Inference finished.
    Result(InferenceOutput),
    /// Load or inference failed.
    Error(ErrorPayload),
}

/// A message plus its optional correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    /// The message.
    pub message: T,
    /// Correlation id, absent for load/ready traffic.
    pub id: Option<u64>,
}

impl<T> Envelope<T> {
    /// Message with a correlation id.
    pub const fn with_id(message: T, id: u64) -> Self {
        Self {
            message,
            id: Some(id),
        }
    }

    /// Message without a correlation id.
    pub const fn unsolicited(message: T) -> Self {
        Self { message, id: None }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Wire form: the tagged message with `id` added alongside `type`/`payload`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut value =
            serde_json::to_value(&self.message).map_err(|e| Error::JsonSerialize { source: e })?;
        if let (Some(id), Some(object)) = (self.id, value.as_object_mut()) {
            object.insert("id".to_string(), serde_json::Value::from(id));
        }
        Ok(value)
    }
}

impl<T: serde::de::DeserializeOwned> Envelope<T> {
    /// Parse the wire form produced by [`Envelope::to_json`].
    pub fn from_json(mut value: serde_json::Value) -> Result<Self> {
        let id = value
            .as_object_mut()
            .and_then(|object| object.remove("id"))
            .and_then(|id| id.as_u64());
        let message =
            serde_json::from_value(value).map_err(|e| Error::JsonSerialize { source: e })?;
        Ok(Self { message, id })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::inference::BoundingBox;
    use serde_json::json;

    #[test]
    fn test_load_request_wire_names() {
        let value = json!({
            "type": "load",
            "payload": {
                "modelUrl": "/models/md.onnx",
                "labelsUrl": "/models/labels.json",
                "preferBackend": "webgpu",
                "config": {"inputSize": 640, "confThreshold": 0.2, "topk": 50}
            }
        });
        let envelope: Envelope<Request> = Envelope::from_json(value).unwrap();
        assert_eq!(envelope.id, None);
        let Request::Load(load) = envelope.message else {
            panic!("expected load");
        };
        assert_eq!(load.model, PathBuf::from("/models/md.onnx"));
        assert_eq!(load.prefer_backend.as_deref(), Some("webgpu"));
        assert_eq!(load.config.input_size, Some(640));
        assert_eq!(load.config.top_k, Some(50));
        assert_eq!(load.config.iou_threshold, None);
    }

    #[test]
    fn test_result_carries_id() {
        let det = Detection::new(BoundingBox::new(1.0, 2.0, 3.0, 4.0), 0.5, 0, "animal");
        let envelope = Envelope::with_id(
            Response::Result(InferenceOutput::Detections(vec![det])),
            7,
        );
        let value = envelope.to_json().unwrap();
        assert_eq!(value["type"], "result");
        assert_eq!(value["id"], 7);
        assert_eq!(value["payload"][0]["label"], "animal");

        let back: Envelope<Response> = Envelope::from_json(value).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_ready_has_no_id() {
        let envelope = Envelope::unsolicited(Response::Ready(ReadyPayload {
            input_size: 640,
            labels: vec!["animal".to_string()],
        }));
        let value = envelope.to_json().unwrap();
        assert_eq!(value["type"], "ready");
        assert_eq!(value["payload"]["inputSize"], 640);
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_error_payload_round_trips_category() {
        let payload = ErrorPayload::from(&Error::ModelNotReady);
        assert_eq!(payload.code, ErrorCode::NotReady);
        assert!(matches!(Error::from(payload), Error::ModelNotReady));
    }
}

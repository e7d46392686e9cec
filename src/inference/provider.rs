//! Execution provider metadata and selection.

use crate::config::InferenceDevice;
use serde::Serialize;
use tracing::{info, warn};

/// Hardware backend for a model session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// NVIDIA `TensorRT`.
    TensorRt,
    /// NVIDIA CUDA.
    Cuda,
    /// Windows `DirectML`.
    DirectMl,
    /// Apple `CoreML`.
    CoreMl,
    /// AMD `ROCm`.
    Rocm,
    /// Intel `OpenVINO`.
    OpenVino,
    /// Plain CPU execution, always available.
    Cpu,
}

/// GPU providers in the order they are tried.
///
/// Specialized accelerators (`oneDNN`, QNN, ACL) are left out of automatic
/// selection because they target specific hardware.
pub const GPU_PRIORITY: [ExecutionProvider; 6] = [
    ExecutionProvider::TensorRt,
    ExecutionProvider::Cuda,
    ExecutionProvider::DirectMl,
    ExecutionProvider::CoreMl,
    ExecutionProvider::Rocm,
    ExecutionProvider::OpenVino,
];

/// Metadata for an execution provider.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProviderMetadata {
    /// CLI identifier (e.g., "cuda", "tensorrt").
    pub id: &'static str,
    /// Display name (e.g., "CUDA", "`TensorRT`").
    pub name: &'static str,
    /// Full description for human output.
    pub description: &'static str,
}

impl ExecutionProvider {
    /// Get metadata for this provider.
    #[must_use]
    pub const fn metadata(self) -> ProviderMetadata {
        match self {
            Self::Cpu => ProviderMetadata {
                id: "cpu",
                name: "CPU",
                description: "CPU (always available)",
            },
            Self::Cuda => ProviderMetadata {
                id: "cuda",
                name: "CUDA",
                description: "CUDA (NVIDIA GPU acceleration)",
            },
            Self::TensorRt => ProviderMetadata {
                id: "tensorrt",
                name: "TensorRT",
                description: "TensorRT (NVIDIA optimized inference)",
            },
            Self::DirectMl => ProviderMetadata {
                id: "directml",
                name: "DirectML",
                description: "DirectML (Windows GPU acceleration)",
            },
            Self::CoreMl => ProviderMetadata {
                id: "coreml",
                name: "CoreML",
                description: "CoreML (Apple GPU/Neural Engine)",
            },
            Self::Rocm => ProviderMetadata {
                id: "rocm",
                name: "ROCm",
                description: "ROCm (AMD GPU acceleration)",
            },
            Self::OpenVino => ProviderMetadata {
                id: "openvino",
                name: "OpenVINO",
                description: "OpenVINO (Intel optimization)",
            },
        }
    }

    /// Whether this provider runs on an accelerator.
    pub const fn is_gpu(self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

/// Map a client backend hint (`"webgpu"`, `"wasm"`, `"cpu"`, ...) onto a device.
///
/// Unknown or missing hints keep the configured default.
pub fn device_for_backend(hint: Option<&str>, default: InferenceDevice) -> InferenceDevice {
    match hint.map(|h| h.trim().to_ascii_lowercase()).as_deref() {
        Some("gpu" | "webgpu" | "cuda" | "tensorrt" | "directml" | "coreml") => InferenceDevice::Gpu,
        Some("cpu" | "wasm") => InferenceDevice::Cpu,
        Some("auto") => InferenceDevice::Auto,
        _ => default,
    }
}

/// Build the provider list for a session: the preferred GPU first when one
/// is available, CPU always last.
///
/// Missing GPUs are never fatal. Auto mode falls back quietly; explicit GPU
/// requests log a warning.
pub fn select_providers(
    device: InferenceDevice,
    available: &[ExecutionProvider],
) -> Vec<ExecutionProvider> {
    let gpu = GPU_PRIORITY.iter().copied().find(|p| available.contains(p));

    match (device, gpu) {
        (InferenceDevice::Cpu, _) => {
            info!("Requested device: CPU");
            vec![ExecutionProvider::Cpu]
        }
        (InferenceDevice::Auto, Some(provider)) => {
            info!("Auto mode: {} available, attempting GPU", provider.metadata().name);
            vec![provider, ExecutionProvider::Cpu]
        }
        (InferenceDevice::Auto, None) => {
            info!("Auto mode: No GPU providers available, using CPU");
            vec![ExecutionProvider::Cpu]
        }
        (InferenceDevice::Gpu, Some(provider)) => {
            info!("--gpu: Selected {} provider", provider.metadata().name);
            vec![provider, ExecutionProvider::Cpu]
        }
        (InferenceDevice::Gpu, None) => {
            warn!("GPU requested but no GPU providers available, using CPU");
            vec![ExecutionProvider::Cpu]
        }
    }
}

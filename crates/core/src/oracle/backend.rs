//! Inference session construction: device selection from `gpu_ids` plus the
//! CUDA / TensorRT execution provider chain.
//!
//! Provides [`InferenceBackend`], [`DeviceSelection`] and [`build_session`].

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Execution provider preference when a GPU is selected.
///
/// `Tensorrt` registers TRT first with CUDA as fallback, so a missing TensorRT
/// runtime degrades to CUDA instead of failing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    #[default]
    Cuda,
    Tensorrt,
}

impl InferenceBackend {
    /// Parse from string (case-insensitive). Returns `Cuda` for unknown values.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "tensorrt" | "trt" => Self::Tensorrt,
            _ => Self::Cuda,
        }
    }
}

impl std::fmt::Display for InferenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda => write!(f, "cuda"),
            Self::Tensorrt => write!(f, "tensorrt"),
        }
    }
}

/// Devices named by a `gpu_ids` string such as `"0"`, `"0,1"` or `"-1"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSelection {
    Cpu,
    Gpu(Vec<i32>),
}

impl DeviceSelection {
    pub fn parse(gpu_ids: &str) -> Result<Self> {
        let mut ids = Vec::new();
        for part in gpu_ids.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let id: i32 = part
                .parse()
                .with_context(|| format!("invalid GPU id '{part}' in '{gpu_ids}'"))?;
            if id < 0 {
                if id != -1 {
                    bail!("invalid GPU id {id}; use -1 for CPU");
                }
                return Ok(Self::Cpu);
            }
            ids.push(id);
        }
        if ids.is_empty() {
            bail!("gpu_ids must name at least one device or -1 for CPU");
        }
        Ok(Self::Gpu(ids))
    }

    /// Device the session binds to. Inference is synchronous, so only the
    /// first listed GPU is used.
    pub fn primary_device(&self) -> Option<i32> {
        match self {
            Self::Cpu => None,
            Self::Gpu(ids) => ids.first().copied(),
        }
    }
}

pub struct SessionConfig<'a> {
    pub model_path: &'a Path,
    pub backend: InferenceBackend,
    pub devices: &'a DeviceSelection,
    pub trt_cache_dir: Option<&'a Path>,
}

/// Build an `ort::Session` for the requested device.
///
/// - `DeviceSelection::Cpu`: no execution providers, ORT's CPU path.
/// - `Gpu` + `Cuda`: CUDA EP on the primary device.
/// - `Gpu` + `Tensorrt`: TRT EP with engine caching, CUDA EP as fallback.
pub fn build_session(config: &SessionConfig<'_>) -> Result<Session> {
    if !config.model_path.is_file() {
        bail!("model file not found: {}", config.model_path.display());
    }

    let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    let started = Instant::now();

    let session = match (config.devices.primary_device(), config.backend) {
        (None, _) => {
            debug!(backend = "cpu", "Building session on CPU");
            builder.commit_from_file(config.model_path).with_context(|| {
                format!("Failed to load ONNX model: {}", config.model_path.display())
            })?
        }
        (Some(device_id), InferenceBackend::Tensorrt) => {
            let cache_dir = config
                .trt_cache_dir
                .unwrap_or_else(|| Path::new("trt_cache"));
            if let Err(e) = std::fs::create_dir_all(cache_dir) {
                warn!(
                    dir = %cache_dir.display(),
                    error = %e,
                    "Failed to create TRT cache directory"
                );
            }
            let cache_path = cache_dir.to_string_lossy().to_string();

            info!(
                device_id,
                cache_dir = %cache_dir.display(),
                "Initializing TensorRT session (first run may take several minutes)"
            );

            builder
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_engine_cache(true)
                        .with_engine_cache_path(&cache_path)
                        .with_fp16(true)
                        .with_device_id(device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                ])?
                .commit_from_file(config.model_path)
                .with_context(|| {
                    format!("Failed to load ONNX model: {}", config.model_path.display())
                })?
        }
        (Some(device_id), InferenceBackend::Cuda) => {
            let cuda = CUDAExecutionProvider::default();
            if !cuda.is_available().unwrap_or(false) {
                warn!("CUDA EP is not available, inference will fall back to CPU");
            }

            debug!(backend = "cuda", device_id, "Building session with CUDA EP");

            builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build()])?
                .commit_from_file(config.model_path)
                .with_context(|| {
                    format!("Failed to load ONNX model: {}", config.model_path.display())
                })?
        }
    };

    info!(
        model = %config.model_path.display(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Inference session ready"
    );
    Ok(session)
}

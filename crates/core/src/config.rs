use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::oracle::backend::InferenceBackend;
use crate::oracle::rife::OracleOptions;
use crate::oracle::ModelName;

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_DATA_DIR: &str = "FRAMEWEAVE_DATA_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    pub search: SearchConfig,
    pub dedupe: DedupeConfig,
    pub output: OutputConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    pub models_dir: PathBuf,
    pub model_name: ModelName,
    pub gpu_ids: String,
    pub use_time_step: bool,
    pub backend: InferenceBackend,
    pub half_precision: bool,
    pub trt_cache_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Bisection depth used to reach non-dyadic targets.
    pub precision: u32,
    pub keep_samples: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DedupeConfig {
    /// Largest 8x8 block luma SAD still counted as a duplicate.
    pub threshold: u32,
    /// Largest group size, keep frame included. `0` is unlimited.
    pub max_dupes: usize,
    pub tune_min: u32,
    pub tune_max: u32,
    pub tune_step: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub extension: String,
    pub base_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProgressConfig {
    pub enabled: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            model_name: ModelName::Ours,
            gpu_ids: "0".to_string(),
            use_time_step: false,
            backend: InferenceBackend::Cuda,
            half_precision: false,
            trt_cache_dir: PathBuf::from("trt_cache"),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            precision: 10,
            keep_samples: false,
        }
    }
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            threshold: 2000,
            max_dupes: 0,
            tune_min: 0,
            tune_max: 5000,
            tune_step: 250,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            extension: "png".to_string(),
            base_filename: "interpolated_frames".to_string(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl OracleConfig {
    /// Oracle options with relative paths resolved against `base`.
    pub fn to_options(&self, base: &Path) -> OracleOptions {
        OracleOptions {
            models_dir: resolve_relative_to(base, &self.models_dir),
            model_name: self.model_name,
            gpu_ids: self.gpu_ids.clone(),
            use_time_step: self.use_time_step,
            backend: self.backend,
            half_precision: self.half_precision,
            trt_cache_dir: Some(resolve_relative_to(base, &self.trt_cache_dir)),
        }
    }
}

impl AppConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config TOML: {}", path.display()))
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .context("config path does not have a parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {}", parent.display()))?;

        let encoded = toml::to_string_pretty(self).context("failed to serialize config TOML")?;
        fs::write(path, encoded)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

/// Resolve the data directory with 3-tier priority:
/// 1. CLI override if provided
/// 2. FRAMEWEAVE_DATA_DIR environment variable
/// 3. Default: ./data
pub fn data_dir(cli_override: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }

    if let Some(env_dir) = env::var_os(ENV_DATA_DIR) {
        return PathBuf::from(env_dir);
    }

    PathBuf::from("data")
}

/// Returns the path to config.toml within the given data directory.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Initialize the data directory structure on first run:
/// - Creates data_dir if missing
/// - Writes default config.toml only if file doesn't exist
pub fn initialize_data_dir(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
    }

    let cfg_path = config_path(data_dir);
    if !cfg_path.exists() {
        AppConfig::default().save_to_path(&cfg_path)?;
    }

    Ok(())
}

/// Resolve a path relative to a base directory.
/// Returns the path as-is if absolute, otherwise joins it to base.
pub fn resolve_relative_to(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

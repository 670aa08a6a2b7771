//! Text embedding trait and loading options

use mailclass_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Trait for sentence embedding models
pub trait TextEmbedder: Send + Sync {
    /// Encode one text into a fixed-length vector
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Output vector width
    fn dimension(&self) -> usize;

    /// Model identifier the embedder was built from
    fn model_name(&self) -> &str;
}

/// Device to run embedding inference on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    /// CPU inference (always available)
    #[default]
    Cpu,
    /// CUDA GPU inference
    Cuda,
    /// Metal (Apple Silicon)
    Metal,
}

impl FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "cuda:0" | "gpu" => Ok(Self::Cuda),
            "metal" | "mps" => Ok(Self::Metal),
            other => Err(Error::config(format!("unknown device '{}'", other))),
        }
    }
}

/// Options for building an embedder from a model name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderOptions {
    /// Device to load the weights on
    pub device: DeviceSpec,

    /// Where downloaded Hugging Face models are cached
    pub cache_dir: PathBuf,

    /// Git revision used for Hugging Face downloads
    pub revision: String,
}

impl Default for EmbedderOptions {
    fn default() -> Self {
        Self {
            device: DeviceSpec::Cpu,
            cache_dir: default_cache_dir(),
            revision: "main".to_string(),
        }
    }
}

impl EmbedderOptions {
    /// Set device
    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.device = device;
        self
    }

    /// Set model cache directory
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set Hugging Face revision
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }
}

/// Default model cache: `~/.cache/mailclass/models`
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache/mailclass/models")
}

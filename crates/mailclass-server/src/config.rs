//! Server configuration

use crate::cli::Cli;
use mailclass_classifiers::embedder::default_cache_dir;
use mailclass_classifiers::{DeviceSpec, EmbedderOptions, DEFAULT_MODEL_PATH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Artifact bundle path
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Device for the embedding model
    #[serde(default)]
    pub device: DeviceSpec,

    /// Cache directory for downloaded embedding models
    #[serde(default = "default_cache_dir")]
    pub model_cache_dir: PathBuf,

    /// Hugging Face revision of the embedding model
    #[serde(default = "default_revision")]
    pub model_revision: String,

    /// Maximum accepted request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Load models before accepting requests
    #[serde(default = "default_true")]
    pub warm_up: bool,
}

impl ServerConfig {
    /// Load configuration from file and CLI/environment overrides
    pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(cli);
        Ok(config)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(model_path) = &cli.model_path {
            self.model_path = model_path.clone();
        }

        if let Some(listen) = &cli.listen {
            self.listen = listen.clone();
        }

        if let Some(port) = cli.port {
            self.port = port;
        }

        if let Some(device) = cli.device {
            self.device = device;
        }

        if let Some(cache_dir) = &cli.model_cache_dir {
            self.model_cache_dir = cache_dir.clone();
        }

        if cli.no_warm_up {
            self.warm_up = false;
        }
    }

    /// Options for building the embedding model
    pub fn embedder_options(&self) -> EmbedderOptions {
        EmbedderOptions::default()
            .with_device(self.device)
            .with_cache_dir(self.model_cache_dir.clone())
            .with_revision(self.model_revision.clone())
    }

    /// `listen:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            listen: default_listen(),
            port: default_port(),
            device: DeviceSpec::default(),
            model_cache_dir: default_cache_dir(),
            model_revision: default_revision(),
            max_body_bytes: default_max_body_bytes(),
            warm_up: true,
        }
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_PATH)
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

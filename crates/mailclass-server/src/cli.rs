use clap::Parser;
use mailclass_classifiers::DeviceSpec;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mailclass-server")]
#[command(author, version, about = "Email spam and category prediction service", long_about = None)]
pub struct Cli {
    /// Configuration file path (ignored if missing)
    #[arg(short, long, default_value = "mailclass.yaml", env = "MAILCLASS_CONFIG")]
    pub config: String,

    /// Artifact bundle path
    #[arg(short, long, env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Embedding device: cpu, cuda or metal
    #[arg(short, long, env = "MAILCLASS_DEVICE", value_parser = parse_device)]
    pub device: Option<DeviceSpec>,

    /// Cache directory for downloaded embedding models
    #[arg(long, env = "MAILCLASS_MODEL_CACHE")]
    pub model_cache_dir: Option<PathBuf>,

    /// Skip loading models at startup; the first request loads them
    #[arg(long)]
    pub no_warm_up: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

fn parse_device(s: &str) -> Result<DeviceSpec, String> {
    s.parse().map_err(|e: mailclass_core::Error| e.to_string())
}

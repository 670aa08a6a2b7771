//! Sentence-transformer embeddings with Candle
//!
//! Loads a BERT-family sentence-transformer (for example
//! `sentence-transformers/all-MiniLM-L6-v2`) from a local directory or the
//! Hugging Face Hub, and reproduces its encode pipeline: tokenize, run the
//! backbone, pool, and optionally L2-normalize.

use crate::embedder::{DeviceSpec, EmbedderOptions, TextEmbedder};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use mailclass_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokenizers::{Tokenizer, TruncationParams};

const DEFAULT_MAX_SEQ_LENGTH: usize = 256;

/// Files every model directory must provide
const REQUIRED_FILES: [&str; 1] = ["config.json"];

/// Files fetched when present; sentence-transformers metadata lives here
const OPTIONAL_FILES: [&str; 3] = [
    "modules.json",
    "sentence_bert_config.json",
    "1_Pooling/config.json",
];

/// How token embeddings are reduced to one sentence vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolingStrategy {
    /// Attention-masked mean over tokens
    Mean,
    /// First ([CLS]) token
    Cls,
}

impl PoolingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Cls => "cls",
        }
    }
}

#[derive(Debug, Deserialize)]
struct PoolingConfig {
    #[serde(default)]
    pooling_mode_cls_token: bool,
    #[serde(default)]
    pooling_mode_mean_tokens: bool,
}

#[derive(Debug, Deserialize)]
struct SentenceBertConfig {
    max_seq_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    #[serde(rename = "type")]
    kind: String,
}

/// Candle-backed sentence-transformer
pub struct SentenceTransformerEmbedder {
    name: String,
    tokenizer: Tokenizer,
    model: BertModel,
    device: Device,
    pooling: PoolingStrategy,
    normalize: bool,
    dimension: usize,
}

impl SentenceTransformerEmbedder {
    /// Build an embedder from a model name.
    ///
    /// An existing directory is loaded as-is; anything else is treated as a
    /// Hugging Face repo id and downloaded into the options' cache directory.
    pub fn load(model_name: &str, options: &EmbedderOptions) -> Result<Self> {
        let model_dir = resolve_model_dir(model_name, options)?;
        Self::load_from_dir(model_name, &model_dir, options.device)
    }

    /// Build an embedder from a local sentence-transformers directory
    pub fn load_from_dir(name: &str, model_dir: &Path, device: DeviceSpec) -> Result<Self> {
        tracing::info!(model = name, dir = %model_dir.display(), "Loading sentence-transformer");

        let bert_config: BertConfig = parse_json_config(&model_dir.join("config.json"))?;
        let device = create_device(device)?;

        let max_seq_length = read_max_seq_length(model_dir)?;
        let tokenizer = load_tokenizer(model_dir, max_seq_length)?;
        let vb = load_var_builder(model_dir, &device)?;
        let model = load_bert_backbone(&vb, &bert_config)?;

        let pooling = read_pooling(model_dir)?;
        let normalize = read_normalize(model_dir)?;

        tracing::info!(
            model = name,
            pooling = pooling.as_str(),
            normalize,
            dimension = bert_config.hidden_size,
            max_seq_length,
            "Loaded sentence-transformer"
        );

        Ok(Self {
            name: name.to_string(),
            tokenizer,
            model,
            device,
            pooling,
            normalize,
            dimension: bert_config.hidden_size,
        })
    }

    fn forward(&self, text: &str) -> candle_core::Result<(Tensor, Vec<u32>)> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(candle_core::Error::msg)?;

        let attention_mask = encoding.get_attention_mask().to_vec();
        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;
        let mask = Tensor::new(attention_mask.as_slice(), &self.device)?.unsqueeze(0)?;

        let hidden_states = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&mask))?;

        Ok((hidden_states, attention_mask))
    }
}

impl TextEmbedder for SentenceTransformerEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let (hidden_states, attention_mask) = self
            .forward(text)
            .map_err(|e| Error::embedding(format!("Model forward pass failed: {}", e)))?;

        let mut embedding = match self.pooling {
            PoolingStrategy::Cls => hidden_states
                .i((0, 0))
                .and_then(|cls| cls.to_vec1::<f32>())
                .map_err(|e| Error::embedding(format!("Failed to extract CLS token: {}", e)))?,
            PoolingStrategy::Mean => {
                let tokens: Vec<Vec<f32>> = hidden_states
                    .squeeze(0)
                    .and_then(|t| t.to_vec2::<f32>())
                    .map_err(|e| {
                        Error::embedding(format!("Failed to read token embeddings: {}", e))
                    })?;
                mean_pool(&tokens, &attention_mask)
            }
        };

        if self.normalize {
            l2_normalize(&mut embedding);
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

fn resolve_model_dir(model_name: &str, options: &EmbedderOptions) -> Result<PathBuf> {
    let local = Path::new(model_name);
    if local.is_dir() {
        return Ok(local.to_path_buf());
    }

    download_from_huggingface(model_name, options)
}

fn download_from_huggingface(repo_id: &str, options: &EmbedderOptions) -> Result<PathBuf> {
    tracing::info!(
        repo = repo_id,
        revision = %options.revision,
        cache = %options.cache_dir.display(),
        "Fetching embedding model from HuggingFace"
    );

    std::fs::create_dir_all(&options.cache_dir).map_err(|e| {
        Error::embedding(format!(
            "Failed to create model cache {}: {}",
            options.cache_dir.display(),
            e
        ))
    })?;

    let api = ApiBuilder::new()
        .with_cache_dir(options.cache_dir.clone())
        .with_progress(false)
        .build()
        .map_err(|e| Error::embedding(format!("Failed to initialize HuggingFace API: {}", e)))?;

    let repo = api.repo(Repo::with_revision(
        repo_id.to_string(),
        RepoType::Model,
        options.revision.clone(),
    ));

    let mut model_dir = None;
    for file in REQUIRED_FILES {
        let path = repo.get(file).map_err(|e| {
            Error::embedding(format!("Failed to download {} from {}: {}", file, repo_id, e))
        })?;
        model_dir = path.parent().map(Path::to_path_buf);
    }

    let weights = ["model.safetensors", "pytorch_model.bin"];
    if !weights.iter().any(|file| repo.get(file).is_ok()) {
        return Err(Error::embedding(format!(
            "No model weights found in {} (tried model.safetensors, pytorch_model.bin)",
            repo_id
        )));
    }

    let tokenizers = ["tokenizer.json", "vocab.txt"];
    if !tokenizers.iter().any(|file| repo.get(file).is_ok()) {
        return Err(Error::embedding(format!(
            "No tokenizer found in {} (tried tokenizer.json, vocab.txt)",
            repo_id
        )));
    }

    for file in OPTIONAL_FILES {
        if let Err(e) = repo.get(file) {
            tracing::debug!(repo = repo_id, file, error = %e, "Optional file not available");
        }
    }

    let model_dir =
        model_dir.ok_or_else(|| Error::embedding("Invalid HuggingFace cache path"))?;
    tracing::info!(dir = %model_dir.display(), "Embedding model available");
    Ok(model_dir)
}

fn create_device(device: DeviceSpec) -> Result<Device> {
    match device {
        DeviceSpec::Cpu => Ok(Device::Cpu),
        DeviceSpec::Cuda => Device::new_cuda(0)
            .map_err(|e| Error::embedding(format!("Failed to initialize CUDA: {}", e))),
        DeviceSpec::Metal => Device::new_metal(0)
            .map_err(|e| Error::embedding(format!("Failed to initialize Metal: {}", e))),
    }
}

fn parse_json_config<T: DeserializeOwned>(config_path: &Path) -> Result<T> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        Error::embedding(format!(
            "Failed to read config {}: {}",
            config_path.display(),
            e
        ))
    })?;

    serde_json::from_str(&config_str).map_err(|e| {
        Error::embedding(format!(
            "Failed to parse config {}: {}",
            config_path.display(),
            e
        ))
    })
}

fn parse_optional_config<T: DeserializeOwned>(config_path: &Path) -> Result<Option<T>> {
    if config_path.exists() {
        parse_json_config(config_path).map(Some)
    } else {
        Ok(None)
    }
}

fn read_max_seq_length(model_dir: &Path) -> Result<usize> {
    let config: Option<SentenceBertConfig> =
        parse_optional_config(&model_dir.join("sentence_bert_config.json"))?;
    Ok(config
        .and_then(|c| c.max_seq_length)
        .unwrap_or(DEFAULT_MAX_SEQ_LENGTH))
}

fn read_pooling(model_dir: &Path) -> Result<PoolingStrategy> {
    let config: Option<PoolingConfig> =
        parse_optional_config(&model_dir.join("1_Pooling").join("config.json"))?;

    Ok(match config {
        Some(c) if c.pooling_mode_cls_token && !c.pooling_mode_mean_tokens => PoolingStrategy::Cls,
        _ => PoolingStrategy::Mean,
    })
}

fn read_normalize(model_dir: &Path) -> Result<bool> {
    let modules: Option<Vec<ModuleEntry>> = parse_optional_config(&model_dir.join("modules.json"))?;
    Ok(modules
        .unwrap_or_default()
        .iter()
        .any(|m| m.kind.ends_with(".Normalize")))
}

fn load_tokenizer(model_dir: &Path, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = build_tokenizer(model_dir)?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| Error::embedding(format!("Failed to configure truncation: {}", e)))?;
    tokenizer.with_padding(None);

    Ok(tokenizer)
}

fn build_tokenizer(model_dir: &Path) -> Result<Tokenizer> {
    let tokenizer_json_path = model_dir.join("tokenizer.json");
    if tokenizer_json_path.exists() {
        tracing::debug!("Loading tokenizer from tokenizer.json");
        return Tokenizer::from_file(&tokenizer_json_path)
            .map_err(|e| Error::embedding(format!("Failed to load tokenizer.json: {}", e)));
    }

    let vocab_path = model_dir.join("vocab.txt");
    if vocab_path.exists() {
        tracing::debug!("Building tokenizer from vocab.txt");

        use tokenizers::models::wordpiece::WordPiece;
        use tokenizers::normalizers::BertNormalizer;
        use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
        use tokenizers::processors::bert::BertProcessing;

        let wordpiece = WordPiece::from_file(vocab_path.to_string_lossy().as_ref())
            .unk_token("[UNK]".to_string())
            .build()
            .map_err(|e| Error::embedding(format!("Failed to build WordPiece model: {}", e)))?;

        let mut tokenizer = Tokenizer::new(wordpiece);
        tokenizer.with_normalizer(Some(BertNormalizer::default()));
        tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
        tokenizer.with_post_processor(Some(BertProcessing::new(
            ("[SEP]".to_string(), 102),
            ("[CLS]".to_string(), 101),
        )));

        return Ok(tokenizer);
    }

    Err(Error::embedding(format!(
        "No tokenizer found in {} (tried tokenizer.json, vocab.txt)",
        model_dir.display()
    )))
}

fn load_var_builder(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is not modified while the model is alive
        return unsafe {
            VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)
        }
        .map_err(|e| Error::embedding(format!("Failed to load SafeTensors weights: {}", e)));
    }

    let pytorch = model_dir.join("pytorch_model.bin");
    if pytorch.exists() {
        return VarBuilder::from_pth(&pytorch, DType::F32, device)
            .map_err(|e| Error::embedding(format!("Failed to load PyTorch weights: {}", e)));
    }

    Err(Error::embedding(format!(
        "No weights in {} (tried model.safetensors, pytorch_model.bin)",
        model_dir.display()
    )))
}

fn load_bert_backbone(vb: &VarBuilder, config: &BertConfig) -> Result<BertModel> {
    let mut errors = Vec::new();

    for prefix in ["", "bert"] {
        let vb_prefix = if prefix.is_empty() {
            vb.clone()
        } else {
            vb.pp(prefix)
        };
        let label = if prefix.is_empty() { "<root>" } else { prefix };

        match BertModel::load(vb_prefix, config) {
            Ok(model) => {
                tracing::debug!("Loaded BERT backbone from '{}'", label);
                return Ok(model);
            }
            Err(e) => errors.push(format!("{}: {}", label, e)),
        }
    }

    Err(Error::embedding(format!(
        "Failed to load BERT backbone with tried prefixes [{}]",
        errors.join(" | ")
    )))
}

/// Attention-masked mean of token embeddings.
///
/// Falls back to an unmasked mean when the mask selects no tokens.
pub(crate) fn mean_pool(tokens: &[Vec<f32>], attention_mask: &[u32]) -> Vec<f32> {
    let Some(first) = tokens.first() else {
        return Vec::new();
    };

    let mut pooled = vec![0.0f32; first.len()];
    let mut count = 0usize;

    for (idx, token) in tokens.iter().enumerate() {
        if attention_mask.get(idx).copied().unwrap_or(0) == 0 {
            continue;
        }
        count += 1;
        for (acc, value) in pooled.iter_mut().zip(token) {
            *acc += value;
        }
    }

    if count == 0 {
        count = tokens.len();
        for token in tokens {
            for (acc, value) in pooled.iter_mut().zip(token) {
                *acc += value;
            }
        }
    }

    for value in &mut pooled {
        *value /= count as f32;
    }

    pooled
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    // Matches torch.nn.functional.normalize's epsilon
    let norm = norm.max(1e-12);
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

//! Loading the artifact bundle and its embedding model

use crate::bundle::ArtifactBundle;
use crate::embedder::{EmbedderOptions, TextEmbedder};
use async_trait::async_trait;
use mailclass_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default bundle location inside the service container
pub const DEFAULT_MODEL_PATH: &str = "/app/models/email_models.json";

/// Everything a prediction needs, loaded together
#[derive(Clone)]
pub struct LoadedModels {
    /// Classifiers and category labels
    pub bundle: ArtifactBundle,

    /// Encoder built from `bundle.emb_model_name`
    pub embedder: Arc<dyn TextEmbedder>,
}

impl LoadedModels {
    /// Pair a bundle with an embedder, checking the bundle and the embedding width
    pub fn new(bundle: ArtifactBundle, embedder: Arc<dyn TextEmbedder>) -> Result<Self> {
        bundle.validate()?;

        let expected = bundle.expected_embedding_dim();
        if embedder.dimension() != expected {
            return Err(Error::artifact(format!(
                "embedding model '{}' produces {} dimensions, classifiers expect {}",
                embedder.model_name(),
                embedder.dimension(),
                expected
            )));
        }

        Ok(Self { bundle, embedder })
    }
}

impl std::fmt::Debug for LoadedModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModels")
            .field("embedding_model", &self.embedder.model_name())
            .field("embedding_dim", &self.embedder.dimension())
            .field("categories", &self.bundle.categories)
            .finish()
    }
}

/// Source of the models served by the prediction endpoint
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the bundle and build its embedder
    async fn load(&self) -> Result<LoadedModels>;

    /// Human-readable description of where models come from
    fn describe(&self) -> String;
}

/// Loads a JSON artifact bundle from disk and the sentence-transformer it names
pub struct BundleLoader {
    bundle_path: PathBuf,
    options: EmbedderOptions,
}

impl BundleLoader {
    /// Create a loader for the bundle at `bundle_path`
    pub fn new(bundle_path: impl Into<PathBuf>, options: EmbedderOptions) -> Self {
        Self {
            bundle_path: bundle_path.into(),
            options,
        }
    }

    fn load_blocking(bundle_path: &Path, options: &EmbedderOptions) -> Result<LoadedModels> {
        let bundle = ArtifactBundle::from_file(bundle_path)?;
        let embedder = build_embedder(&bundle.emb_model_name, options)?;
        LoadedModels::new(bundle, embedder)
    }
}

#[async_trait]
impl ModelLoader for BundleLoader {
    async fn load(&self) -> Result<LoadedModels> {
        let bundle_path = self.bundle_path.clone();
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || Self::load_blocking(&bundle_path, &options))
            .await
            .map_err(|e| Error::internal(format!("Model loading task failed: {}", e)))?
    }

    fn describe(&self) -> String {
        format!("bundle {}", self.bundle_path.display())
    }
}

#[cfg(feature = "ml-models")]
fn build_embedder(model_name: &str, options: &EmbedderOptions) -> Result<Arc<dyn TextEmbedder>> {
    let embedder = crate::sentence_transformer::SentenceTransformerEmbedder::load(model_name, options)?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "ml-models"))]
fn build_embedder(model_name: &str, _options: &EmbedderOptions) -> Result<Arc<dyn TextEmbedder>> {
    Err(Error::embedding(format!(
        "Embedding model '{}' requires the 'ml-models' feature",
        model_name
    )))
}

//! Model server and shared application state

use mailclass_classifiers::{inference, LoadedModels, ModelLoader};
use mailclass_core::{Error, PredictRequest, Prediction, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

/// Holds the loaded models and serves predictions.
///
/// Starts unloaded. The first successful `ensure_loaded` stores the models
/// for the rest of the process; concurrent callers wait on that single load.
/// The load runs in its own task, so a caller that goes away does not abandon
/// it. A failed load leaves the server unloaded so the next call retries.
pub struct ModelServer {
    loader: Arc<dyn ModelLoader>,
    models: Arc<OnceCell<Arc<LoadedModels>>>,
}

impl ModelServer {
    /// Create an unloaded server backed by `loader`
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            models: Arc::new(OnceCell::new()),
        }
    }

    /// Load the models if they are not loaded yet
    pub async fn ensure_loaded(&self) -> Result<Arc<LoadedModels>> {
        if let Some(models) = self.models.get() {
            return Ok(models.clone());
        }

        let models = self.models.clone();
        let loader = self.loader.clone();

        tokio::spawn(async move {
            models
                .get_or_try_init(|| load_models(loader))
                .await
                .cloned()
        })
        .await
        .map_err(|e| Error::internal(format!("Model loading task failed: {}", e)))?
    }

    /// Best-effort startup load.
    ///
    /// Failure is logged and swallowed; requests will retry the load.
    /// Returns whether the models are loaded afterwards.
    pub async fn warm_up(&self) -> bool {
        match self.ensure_loaded().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Model load failed at startup: {}", e);
                false
            }
        }
    }

    /// Whether models have been loaded
    pub fn is_loaded(&self) -> bool {
        self.models.initialized()
    }

    /// Classify one email, loading the models first if needed
    pub async fn predict(&self, request: PredictRequest) -> Result<Prediction> {
        let models = self.ensure_loaded().await?;

        // Embedding is CPU bound
        let prediction = tokio::task::spawn_blocking(move || inference::predict(&models, &request))
            .await
            .map_err(|e| Error::internal(format!("Prediction task failed: {}", e)))??;

        debug!(
            spam_probability = prediction.spam_probability,
            predicted_category = %prediction.predicted_category,
            "Prediction complete"
        );

        Ok(prediction)
    }
}

async fn load_models(loader: Arc<dyn ModelLoader>) -> Result<Arc<LoadedModels>> {
    let start = Instant::now();
    info!("Loading models from {}", loader.describe());

    match loader.load().await {
        Ok(models) => {
            metrics::counter!("mailclass_model_loads_total", "outcome" => "success").increment(1);
            info!(
                embedding_model = models.embedder.model_name(),
                embedding_dim = models.embedder.dimension(),
                categories = models.bundle.categories.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Models loaded"
            );
            Ok(Arc::new(models))
        }
        Err(e) => {
            metrics::counter!("mailclass_model_loads_total", "outcome" => "failure").increment(1);
            Err(e)
        }
    }
}

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Model server
    pub server: Arc<ModelServer>,

    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Prometheus metrics handle for rendering, if a recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Create application state
    pub fn new(
        server: Arc<ModelServer>,
        config: ServerConfig,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            server,
            config: Arc::new(config),
            metrics_handle,
        }
    }
}

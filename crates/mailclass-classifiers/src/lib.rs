//! mailclass Classifiers
//!
//! Everything needed to turn an email into a spam probability and a
//! category distribution:
//! - Meta-features: subject/body length, URL count, HTML flag
//! - Sentence embeddings from a BERT-family sentence-transformer (Candle)
//! - Linear probabilistic classifiers read from an artifact bundle
//!
//! The embedding model runs on CPU by default.

pub mod bundle;
pub mod classifier;
pub mod embedder;
pub mod features;
pub mod inference;
pub mod model_loader;
#[cfg(feature = "ml-models")]
pub mod sentence_transformer;

pub use bundle::ArtifactBundle;
pub use classifier::{argmax, ClassifierSpec, LinearClassifier, ProbabilisticClassifier};
pub use embedder::{DeviceSpec, EmbedderOptions, TextEmbedder};
pub use features::{meta_features, MetaFeatures, META_FEATURE_COUNT};
pub use inference::{feature_row, predict};
pub use model_loader::{BundleLoader, LoadedModels, ModelLoader, DEFAULT_MODEL_PATH};
#[cfg(feature = "ml-models")]
pub use sentence_transformer::{PoolingStrategy, SentenceTransformerEmbedder};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bundle::ArtifactBundle;
    pub use crate::classifier::{argmax, ProbabilisticClassifier};
    pub use crate::embedder::TextEmbedder;
    pub use crate::features::{meta_features, MetaFeatures};
    pub use crate::model_loader::{LoadedModels, ModelLoader};
}

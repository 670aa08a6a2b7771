//! Artifact bundle: embedding model reference, the two trained classifiers
//! and the category labels

use crate::classifier::{ClassifierSpec, ProbabilisticClassifier};
use crate::features::META_FEATURE_COUNT;
use mailclass_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pretrained models loaded once at startup.
///
/// Field names follow the layout written by the training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    /// Sentence-transformer identifier (Hugging Face repo id or local directory)
    pub emb_model_name: String,

    /// Binary spam classifier; class 1 is spam
    pub spam_clf: ClassifierSpec,

    /// Multi-class category classifier
    pub category_clf: ClassifierSpec,

    /// Category labels, index-aligned with `category_clf` output
    pub categories: Vec<String>,

    /// Embedding width the classifiers were trained against, if recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dim: Option<usize>,
}

impl ArtifactBundle {
    /// Read and validate a bundle from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::artifact(format!(
                "Failed to read artifact bundle {}: {}",
                path.display(),
                e
            ))
        })?;

        let bundle = Self::from_json(&content).map_err(|e| match e {
            Error::Artifact(msg) => Error::artifact(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;

        tracing::debug!(
            path = %path.display(),
            embedding_model = %bundle.emb_model_name,
            categories = bundle.categories.len(),
            "Parsed artifact bundle"
        );

        Ok(bundle)
    }

    /// Parse and validate a bundle from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let mut bundle: Self = serde_json::from_str(json)
            .map_err(|e| Error::artifact(format!("Failed to parse artifact bundle: {}", e)))?;
        bundle.spam_clf.set_default_name("spam_clf");
        bundle.category_clf.set_default_name("category_clf");
        bundle.validate()?;
        Ok(bundle)
    }

    /// Check the structural invariants the server relies on
    pub fn validate(&self) -> Result<()> {
        if self.emb_model_name.trim().is_empty() {
            return Err(Error::artifact("emb_model_name is empty"));
        }

        self.spam_clf.validate()?;
        self.category_clf.validate()?;

        let spam = self.spam_clf();
        if spam.n_classes() != 2 {
            return Err(Error::artifact(format!(
                "spam classifier must be binary, found {} classes",
                spam.n_classes()
            )));
        }

        let category = self.category_clf();
        if category.n_classes() != self.categories.len() {
            return Err(Error::artifact(format!(
                "category classifier has {} classes but {} category labels are listed",
                category.n_classes(),
                self.categories.len()
            )));
        }

        if spam.n_features() != category.n_features() {
            return Err(Error::artifact(format!(
                "spam classifier expects {} features but category classifier expects {}",
                spam.n_features(),
                category.n_features()
            )));
        }

        if spam.n_features() <= META_FEATURE_COUNT {
            return Err(Error::artifact(format!(
                "classifiers expect {} features, leaving no room for an embedding",
                spam.n_features()
            )));
        }

        if let Some(dim) = self.embedding_dim {
            if dim + META_FEATURE_COUNT != spam.n_features() {
                return Err(Error::artifact(format!(
                    "embedding_dim {} plus {} meta-features does not match classifier width {}",
                    dim,
                    META_FEATURE_COUNT,
                    spam.n_features()
                )));
            }
        }

        Ok(())
    }

    /// Spam classifier
    pub fn spam_clf(&self) -> &dyn ProbabilisticClassifier {
        self.spam_clf.as_classifier()
    }

    /// Category classifier
    pub fn category_clf(&self) -> &dyn ProbabilisticClassifier {
        self.category_clf.as_classifier()
    }

    /// Embedding width implied by the classifier input width.
    ///
    /// Zero when the classifiers are too narrow to hold any embedding.
    pub fn expected_embedding_dim(&self) -> usize {
        self.spam_clf()
            .n_features()
            .saturating_sub(META_FEATURE_COUNT)
    }
}

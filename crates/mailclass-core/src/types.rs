//! Wire types for the prediction endpoint

use serde::{Deserialize, Serialize};

/// An email to classify.
///
/// Both fields are optional on the wire and default to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Email subject line
    #[serde(default)]
    pub subject: String,

    /// Email body (plain text or HTML)
    #[serde(default)]
    pub body: String,
}

impl PredictRequest {
    /// Create a new request
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Text handed to the embedding model: subject, a blank line, then body
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.subject, self.body)
    }
}

/// Classifier output for a single email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Probability mass of the positive ("spam") class, in [0, 1]
    pub spam_probability: f64,

    /// Category labels in the order stored in the artifact bundle
    pub categories: Vec<String>,

    /// Per-category probabilities, index-aligned with `categories`
    pub category_probs: Vec<f64>,

    /// Label with the highest probability (lowest index wins ties)
    pub predicted_category: String,
}

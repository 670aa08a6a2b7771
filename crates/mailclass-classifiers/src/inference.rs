//! Single-email inference: embed, append meta-features, run both classifiers

use crate::classifier::argmax;
use crate::features::{meta_features, META_FEATURE_COUNT};
use crate::model_loader::LoadedModels;
use mailclass_core::{Error, PredictRequest, Prediction, Result};

/// Classifier input row: embedding dimensions first, then the meta-features
pub fn feature_row(embedding: &[f32], subject: &str, body: &str) -> Vec<f64> {
    let meta = meta_features(subject, body).to_row();

    let mut row = Vec::with_capacity(embedding.len() + META_FEATURE_COUNT);
    row.extend(embedding.iter().map(|&v| f64::from(v)));
    row.extend_from_slice(&meta);
    row
}

/// Run the full prediction for one email.
///
/// Blocking: the embedding forward pass runs on the calling thread.
pub fn predict(models: &LoadedModels, request: &PredictRequest) -> Result<Prediction> {
    let embedding = models.embedder.encode(&request.embedding_text())?;
    let row = feature_row(&embedding, &request.subject, &request.body);

    let bundle = &models.bundle;

    let spam_probs = bundle.spam_clf().predict_proba(&row)?;
    let spam_probability = spam_probs.get(1).copied().ok_or_else(|| {
        Error::classifier(format!(
            "spam classifier returned {} probabilities, expected 2",
            spam_probs.len()
        ))
    })?;

    let category_probs = bundle.category_clf().predict_proba(&row)?;
    if category_probs.len() != bundle.categories.len() {
        return Err(Error::classifier(format!(
            "category classifier returned {} probabilities for {} categories",
            category_probs.len(),
            bundle.categories.len()
        )));
    }

    let top = argmax(&category_probs)
        .ok_or_else(|| Error::classifier("category classifier returned no probabilities"))?;

    Ok(Prediction {
        spam_probability,
        categories: bundle.categories.clone(),
        predicted_category: bundle.categories[top].clone(),
        category_probs,
    })
}

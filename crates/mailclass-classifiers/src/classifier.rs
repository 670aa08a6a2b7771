//! Probabilistic classifier trait and the linear (logistic regression) model
//! stored in artifact bundles

use mailclass_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Trait for classifiers that produce a probability per class
pub trait ProbabilisticClassifier: Send + Sync {
    /// Class probabilities for a single input row, in class order
    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>>;

    /// Number of classes the classifier was trained on
    fn n_classes(&self) -> usize;

    /// Expected input row width
    fn n_features(&self) -> usize;

    /// Get the classifier name
    fn name(&self) -> &str;
}

/// Per-column standardization applied before the linear model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                // Zero-variance columns are only centered
                if *scale == 0.0 {
                    x - mean
                } else {
                    (x - mean) / scale
                }
            })
            .collect()
    }
}

/// Fitted logistic regression.
///
/// `coef` holds a single row for a binary model (decision function for the
/// second class) or one row per class for a multinomial model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearClassifier {
    #[serde(default)]
    pub name: String,

    pub coef: Vec<Vec<f64>>,

    pub intercept: Vec<f64>,

    /// Class labels as trained (informational; ordering matches the output)
    #[serde(default)]
    pub classes: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<StandardScaler>,
}

impl LinearClassifier {
    /// Create a classifier from coefficients and intercepts
    pub fn new(coef: Vec<Vec<f64>>, intercept: Vec<f64>) -> Result<Self> {
        let clf = Self {
            name: String::new(),
            coef,
            intercept,
            classes: Vec::new(),
            scaler: None,
        };
        clf.validate()?;
        Ok(clf)
    }

    /// Set the classifier name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach an input scaler
    pub fn with_scaler(mut self, scaler: StandardScaler) -> Result<Self> {
        self.scaler = Some(scaler);
        self.validate()?;
        Ok(self)
    }

    /// Check that the fitted parameters are shape-consistent
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.coef.first() else {
            return Err(Error::artifact(format!(
                "classifier '{}' has no coefficient rows",
                self.name
            )));
        };
        let width = first.len();

        if let Some((idx, row)) = self
            .coef
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != width)
        {
            return Err(Error::artifact(format!(
                "classifier '{}' coefficient row {} has width {}, expected {}",
                self.name,
                idx,
                row.len(),
                width
            )));
        }

        if self.intercept.len() != self.coef.len() {
            return Err(Error::artifact(format!(
                "classifier '{}' has {} intercepts for {} coefficient rows",
                self.name,
                self.intercept.len(),
                self.coef.len()
            )));
        }

        if !self.classes.is_empty() && self.classes.len() != self.n_classes() {
            return Err(Error::artifact(format!(
                "classifier '{}' lists {} classes but its coefficients describe {}",
                self.name,
                self.classes.len(),
                self.n_classes()
            )));
        }

        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != width || scaler.scale.len() != width {
                return Err(Error::artifact(format!(
                    "classifier '{}' scaler has {}/{} columns, expected {}",
                    self.name,
                    scaler.mean.len(),
                    scaler.scale.len(),
                    width
                )));
            }
        }

        Ok(())
    }

    fn decision_function(&self, row: &[f64]) -> Vec<f64> {
        let scaled;
        let x = match &self.scaler {
            Some(scaler) => {
                scaled = scaler.transform(row);
                scaled.as_slice()
            }
            None => row,
        };

        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(weights, bias)| dot(weights, x) + bias)
            .collect()
    }
}

impl ProbabilisticClassifier for LinearClassifier {
    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(Error::classifier(format!(
                "classifier '{}' expects {} features, got {}",
                self.name,
                self.n_features(),
                row.len()
            )));
        }

        let scores = self.decision_function(row);
        if scores.len() == 1 {
            let positive = sigmoid(scores[0]);
            Ok(vec![1.0 - positive, positive])
        } else {
            Ok(softmax(&scores))
        }
    }

    fn n_classes(&self) -> usize {
        match self.coef.len() {
            1 => 2,
            n => n,
        }
    }

    fn n_features(&self) -> usize {
        self.coef.first().map(Vec::len).unwrap_or(0)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Serialized classifier, tagged by model family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    LogisticRegression(LinearClassifier),
}

impl ClassifierSpec {
    /// Borrow the classifier behind the tag
    pub fn as_classifier(&self) -> &dyn ProbabilisticClassifier {
        match self {
            Self::LogisticRegression(clf) => clf,
        }
    }

    /// Validate the fitted parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::LogisticRegression(clf) => clf.validate(),
        }
    }

    pub(crate) fn set_default_name(&mut self, name: &str) {
        match self {
            Self::LogisticRegression(clf) if clf.name.is_empty() => clf.name = name.to_string(),
            Self::LogisticRegression(_) => {}
        }
    }
}

/// Index of the largest probability.
///
/// Ties resolve to the lowest index. A NaN entry counts as the maximum, so
/// the first NaN wins, matching `numpy.argmax`.
pub fn argmax(values: &[f64]) -> Option<usize> {
    if let Some(idx) = values.iter().position(|v| v.is_nan()) {
        return Some(idx);
    }

    let mut best: Option<(usize, f64)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }

    best.map(|(idx, _)| idx)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_binary_predict_proba() {
        let clf = LinearClassifier::new(vec![vec![1.0, -1.0]], vec![0.0]).unwrap();
        assert_eq!(clf.n_classes(), 2);
        assert_eq!(clf.n_features(), 2);

        let probs = clf.predict_proba(&[1.0, 1.0]).unwrap();
        assert!(approx(probs[0], 0.5));
        assert!(approx(probs[1], 0.5));

        let probs = clf.predict_proba(&[3.0, 0.0]).unwrap();
        assert!(approx(probs[1], 1.0 / (1.0 + (-3.0f64).exp())));
        assert!(approx(probs[0] + probs[1], 1.0));
    }

    #[test]
    fn test_sigmoid_is_stable_for_large_inputs() {
        let clf = LinearClassifier::new(vec![vec![1.0]], vec![0.0]).unwrap();
        let probs = clf.predict_proba(&[-1000.0]).unwrap();
        assert!(probs[1] >= 0.0 && probs[1] < 1e-300);
        let probs = clf.predict_proba(&[1000.0]).unwrap();
        assert!(approx(probs[1], 1.0));
    }

    #[test]
    fn test_multinomial_predict_proba() {
        let clf = LinearClassifier::new(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 0.0]],
            vec![0.0, 0.0, 0.0],
        )
        .unwrap();
        assert_eq!(clf.n_classes(), 3);

        let probs = clf.predict_proba(&[2.0, 1.0]).unwrap();
        let z = 2.0f64.exp() + 1.0f64.exp() + 1.0;
        assert!(approx(probs[0], 2.0f64.exp() / z));
        assert!(approx(probs[1], 1.0f64.exp() / z));
        assert!(approx(probs[2], 1.0 / z));
        assert!(approx(probs.iter().sum::<f64>(), 1.0));
    }

    #[test]
    fn test_softmax_handles_large_scores() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!(approx(probs[0], 0.5));
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_scaler_applied() {
        let clf = LinearClassifier::new(vec![vec![1.0, 1.0]], vec![0.0])
            .unwrap()
            .with_scaler(StandardScaler {
                mean: vec![10.0, 5.0],
                scale: vec![2.0, 0.0],
            })
            .unwrap();

        // (12 - 10) / 2 + (5 - 5) = 1
        let probs = clf.predict_proba(&[12.0, 5.0]).unwrap();
        assert!(approx(probs[1], sigmoid(1.0)));
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let clf = LinearClassifier::new(vec![vec![1.0, 2.0]], vec![0.0]).unwrap();
        let err = clf.predict_proba(&[1.0]).unwrap_err();
        assert!(matches!(err, Error::Classifier(_)));
    }

    #[test]
    fn test_validate_shapes() {
        assert!(LinearClassifier::new(vec![], vec![]).is_err());
        assert!(LinearClassifier::new(vec![vec![1.0], vec![1.0, 2.0]], vec![0.0, 0.0]).is_err());
        assert!(LinearClassifier::new(vec![vec![1.0]], vec![0.0, 1.0]).is_err());

        let bad_scaler = LinearClassifier::new(vec![vec![1.0, 2.0]], vec![0.0])
            .unwrap()
            .with_scaler(StandardScaler {
                mean: vec![0.0],
                scale: vec![1.0],
            });
        assert!(bad_scaler.is_err());
    }

    #[test]
    fn test_spec_deserialization() {
        let json = r#"{
            "kind": "logistic_regression",
            "coef": [[0.5, -0.5]],
            "intercept": [0.1],
            "classes": [0, 1]
        }"#;
        let spec: ClassifierSpec = serde_json::from_str(json).unwrap();
        spec.validate().unwrap();
        assert_eq!(spec.as_classifier().n_classes(), 2);
        assert_eq!(spec.as_classifier().n_features(), 2);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{"kind": "random_forest", "trees": []}"#;
        assert!(serde_json::from_str::<ClassifierSpec>(json).is_err());
    }

    #[test]
    fn test_argmax_first_index_on_ties() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_first_nan_wins() {
        assert_eq!(argmax(&[f64::NAN, 0.3, 0.1]), Some(0));
        assert_eq!(argmax(&[0.3, f64::NAN, 0.4]), Some(1));
        assert_eq!(argmax(&[0.9, f64::NAN, f64::NAN]), Some(1));
    }
}

//! Classifier Adapter
//!
//! Wraps a pre-fitted probabilistic classifier and its label encoder. Both are
//! loaded once at startup and shared read-only by every request.

pub mod labels;
pub mod xgboost;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::features::{FeatureVector, FEATURE_DIM};
pub use labels::LabelEncoder;
pub use xgboost::GradientBoostedTrees;

/// Errors loading or validating model artifacts
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("malformed JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported model: {0}")]
    Unsupported(String),

    #[error("invalid model: {0}")]
    Invalid(String),

    #[error("classifier expects {actual} features, extractor produces {expected}")]
    FeatureCountMismatch { expected: usize, actual: usize },

    #[error("label encoder has {labels} labels, classifier has {classes} classes")]
    LabelCountMismatch { labels: usize, classes: usize },
}

impl ArtifactError {
    /// Attach the file path to a bare JSON error
    pub fn with_path(self, path: &Path) -> Self {
        match self {
            ArtifactError::Json(source) => ArtifactError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        }
    }
}

/// Errors during inference
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("feature vector has {actual} values, expected {expected}")]
    FeatureLength { expected: usize, actual: usize },

    #[error("classifier returned {actual} probabilities for {expected} classes")]
    DistributionLength { expected: usize, actual: usize },

    #[error("classifier returned a non-finite probability")]
    NonFiniteProbability,

    #[error("no label for class index {0}")]
    UnknownClass(usize),
}

/// Anything that yields a per-class probability distribution
pub trait ProbabilisticClassifier: Send + Sync {
    /// Short model family name for diagnostics
    fn kind(&self) -> &'static str;

    fn num_classes(&self) -> usize;

    fn num_features(&self) -> usize;

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f64>, ClassifierError>;
}

/// Predicted emotion and its confidence as a percentage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: String,
    /// Probability × 100, rounded to two decimals, in `[0, 100]`
    pub confidence: f64,
}

/// Loaded model description for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub kind: String,
    pub classes: Vec<String>,
    pub num_features: usize,
}

/// Classifier plus label encoder, validated against each other
#[derive(Clone)]
pub struct ClassifierAdapter {
    model: Arc<dyn ProbabilisticClassifier>,
    labels: LabelEncoder,
}

impl ClassifierAdapter {
    pub fn new(model: Arc<dyn ProbabilisticClassifier>, labels: LabelEncoder) -> Result<Self, ArtifactError> {
        if model.num_features() != FEATURE_DIM {
            return Err(ArtifactError::FeatureCountMismatch {
                expected: FEATURE_DIM,
                actual: model.num_features(),
            });
        }
        if labels.len() != model.num_classes() {
            return Err(ArtifactError::LabelCountMismatch {
                labels: labels.len(),
                classes: model.num_classes(),
            });
        }
        Ok(Self { model, labels })
    }

    /// Load an XGBoost JSON model and a label encoder from disk
    pub fn load(classifier_path: &Path, label_encoder_path: &Path) -> Result<Self, ArtifactError> {
        let model = GradientBoostedTrees::from_path(classifier_path)?;
        let labels = LabelEncoder::from_path(label_encoder_path)?;
        let adapter = Self::new(Arc::new(model), labels)?;

        info!(
            classifier = %classifier_path.display(),
            labels = %label_encoder_path.display(),
            classes = ?adapter.labels.classes(),
            "Model and label encoder loaded"
        );
        Ok(adapter)
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            kind: self.model.kind().to_string(),
            classes: self.labels.classes().to_vec(),
            num_features: self.model.num_features(),
        }
    }

    /// Most probable label; ties go to the lowest class index
    pub fn predict(&self, features: &FeatureVector) -> Result<PredictionResult, ClassifierError> {
        if features.len() != self.model.num_features() {
            return Err(ClassifierError::FeatureLength {
                expected: self.model.num_features(),
                actual: features.len(),
            });
        }

        let proba = self.model.predict_proba(features.as_slice())?;
        if proba.len() != self.labels.len() {
            return Err(ClassifierError::DistributionLength {
                expected: self.labels.len(),
                actual: proba.len(),
            });
        }
        if proba.iter().any(|p| !p.is_finite()) {
            return Err(ClassifierError::NonFiniteProbability);
        }

        let best = argmax_first(&proba);
        let label = self
            .labels
            .inverse_transform(best)
            .ok_or(ClassifierError::UnknownClass(best))?
            .to_string();

        Ok(PredictionResult {
            label,
            confidence: to_percentage(proba[best]),
        })
    }
}

impl std::fmt::Debug for ClassifierAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierAdapter")
            .field("kind", &self.model.kind())
            .field("classes", &self.labels.classes())
            .finish()
    }
}

fn argmax_first(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn to_percentage(probability: f64) -> f64 {
    let percent = (probability * 100.0).clamp(0.0, 100.0);
    (percent * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClassifier {
        proba: Vec<f64>,
        features: usize,
    }

    impl ProbabilisticClassifier for FixedClassifier {
        fn kind(&self) -> &'static str {
            "fixed"
        }

        fn num_classes(&self) -> usize {
            self.proba.len()
        }

        fn num_features(&self) -> usize {
            self.features
        }

        fn predict_proba(&self, _features: &[f32]) -> Result<Vec<f64>, ClassifierError> {
            Ok(self.proba.clone())
        }
    }

    fn adapter(proba: Vec<f64>, labels: &[&str]) -> ClassifierAdapter {
        let labels = LabelEncoder::new(labels.iter().map(|s| s.to_string()).collect()).unwrap();
        ClassifierAdapter::new(
            Arc::new(FixedClassifier {
                proba,
                features: FEATURE_DIM,
            }),
            labels,
        )
        .unwrap()
    }

    fn zeros() -> FeatureVector {
        FeatureVector::from_values(vec![0.0; FEATURE_DIM])
    }

    #[test]
    fn test_predict_picks_max_and_rounds() {
        let adapter = adapter(vec![0.1, 0.723456, 0.176544], &["angry", "calm", "sad"]);

        let result = adapter.predict(&zeros()).unwrap();

        assert_eq!(result.label, "calm");
        assert_eq!(result.confidence, 72.35);
    }

    #[test]
    fn test_tie_goes_to_first_index() {
        let adapter = adapter(vec![0.25, 0.375, 0.375], &["a", "b", "c"]);
        assert_eq!(adapter.predict(&zeros()).unwrap().label, "b");
    }

    #[test]
    fn test_confidence_bounds() {
        let certain = adapter(vec![1.0, 0.0], &["x", "y"]).predict(&zeros()).unwrap();
        assert_eq!(certain.confidence, 100.0);
    }

    #[test]
    fn test_wrong_vector_length_is_rejected() {
        let adapter = adapter(vec![0.5, 0.5], &["x", "y"]);
        let result = adapter.predict(&FeatureVector::from_values(vec![0.0; 10]));
        assert!(matches!(result, Err(ClassifierError::FeatureLength { .. })));
    }

    #[test]
    fn test_nan_probability_is_rejected() {
        let adapter = adapter(vec![f64::NAN, 0.5], &["x", "y"]);
        assert!(matches!(
            adapter.predict(&zeros()),
            Err(ClassifierError::NonFiniteProbability)
        ));
    }

    #[test]
    fn test_label_count_must_match_classes() {
        let labels = LabelEncoder::new(vec!["only".to_string()]).unwrap();
        let result = ClassifierAdapter::new(
            Arc::new(FixedClassifier {
                proba: vec![0.5, 0.5],
                features: FEATURE_DIM,
            }),
            labels,
        );
        assert!(matches!(
            result,
            Err(ArtifactError::LabelCountMismatch { labels: 1, classes: 2 })
        ));
    }

    #[test]
    fn test_feature_count_must_match_extractor() {
        let labels = LabelEncoder::new(vec!["a".to_string(), "b".to_string()]).unwrap();
        let result = ClassifierAdapter::new(
            Arc::new(FixedClassifier {
                proba: vec![0.5, 0.5],
                features: 180,
            }),
            labels,
        );
        assert!(matches!(
            result,
            Err(ArtifactError::FeatureCountMismatch { expected: 208, actual: 180 })
        ));
    }

    #[test]
    fn test_load_missing_files_fails() {
        let result = ClassifierAdapter::load(Path::new("/nonexistent/model.json"), Path::new("/nonexistent/labels.json"));
        assert!(matches!(result, Err(ArtifactError::Io { .. })));
    }
}

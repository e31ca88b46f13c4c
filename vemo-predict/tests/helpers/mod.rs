//! Shared integration test helpers
#![allow(dead_code)]

pub mod audio_generator;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use vemo_predict::config::ServiceConfig;
use vemo_predict::{build_inference_service, AppState};

/// Labels of the fixture model, in class-index order
pub const FIXTURE_LABELS: [&str; 3] = ["angry", "calm", "happy"];

/// Multipart boundary used by [`multipart_body`]
pub const BOUNDARY: &str = "vemo-test-boundary";

/// Three-class softprob model over the 208-value feature vector
///
/// One stump per class. Class 0 and 2 split on the first MFCC, class 1 on
/// the zero-crossing rate, so every input resolves to some label.
pub fn fixture_model_json() -> String {
    let stump = |feature: u32, threshold: f32, lo: f32, hi: f32| {
        json!({
            "left_children": [1, -1, -1],
            "right_children": [2, -1, -1],
            "split_indices": [feature, 0, 0],
            "split_conditions": [threshold, lo, hi],
            "default_left": [1, 0, 0],
            "split_type": [0, 0, 0],
            "base_weights": [0.0, lo, hi],
            "tree_param": {"num_nodes": "3", "num_feature": "208"}
        })
    };

    json!({
        "learner": {
            "attributes": {},
            "feature_names": [],
            "feature_types": [],
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "gbtree_model_param": {"num_parallel_tree": "1", "num_trees": "3"},
                    "iteration_indptr": [0, 3],
                    "tree_info": [0, 1, 2],
                    "trees": [
                        stump(0, -500.0, 1.2, -0.4),
                        stump(207, 0.05, 0.3, -0.2),
                        stump(0, -500.0, -0.4, 1.2)
                    ]
                }
            },
            "learner_model_param": {
                "base_score": "5E-1",
                "boost_from_average": "1",
                "num_class": "3",
                "num_feature": "208",
                "num_target": "1"
            },
            "objective": {
                "name": "multi:softprob",
                "softmax_multiclass_param": {"num_class": "3"}
            }
        },
        "version": [2, 0, 3]
    })
    .to_string()
}

pub fn fixture_labels_json() -> String {
    json!({ "classes": FIXTURE_LABELS }).to_string()
}

/// Scratch directories and artifacts for one test
///
/// The TempDir must stay alive for the duration of the test.
pub struct TestEnv {
    pub root: TempDir,
    pub staging_dir: PathBuf,
    pub classifier_path: PathBuf,
    pub labels_path: PathBuf,
}

impl TestEnv {
    /// Environment with valid model artifacts
    pub fn new() -> Self {
        let env = Self::without_model();
        std::fs::write(&env.classifier_path, fixture_model_json()).unwrap();
        std::fs::write(&env.labels_path, fixture_labels_json()).unwrap();
        env
    }

    /// Environment whose artifact paths do not exist
    pub fn without_model() -> Self {
        let root = TempDir::new().unwrap();
        let staging_dir = root.path().join("staging");
        let classifier_path = root.path().join("emotion_model.json");
        let labels_path = root.path().join("label_encoder.json");
        Self {
            root,
            staging_dir,
            classifier_path,
            labels_path,
        }
    }

    pub fn config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.audio.staging_dir = self.staging_dir.clone();
        config.model.classifier_path = self.classifier_path.clone();
        config.model.label_encoder_path = self.labels_path.clone();
        config
    }

    pub fn app_state(&self) -> AppState {
        self.app_state_with(self.config())
    }

    pub fn app_state_with(&self, config: ServiceConfig) -> AppState {
        let inference = build_inference_service(&config).unwrap();
        AppState::new(Arc::new(inference))
    }

    /// Entries currently in the staging directory
    pub fn staged_files(&self) -> usize {
        count_entries(&self.staging_dir)
    }
}

pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// One multipart part
pub struct Part<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content: &'a [u8],
}

/// Hand-built `multipart/form-data` body using [`BOUNDARY`]
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.file_name {
            Some(file_name) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name).as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

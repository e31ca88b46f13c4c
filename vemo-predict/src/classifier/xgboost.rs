//! Gradient-boosted tree ensembles in XGBoost's JSON model format
//!
//! Reads models written by `Booster.save_model("model.json")` (XGBoost 1.x
//! through 3.x). Supported boosters are `gbtree` and `dart`; supported
//! objectives are `multi:softprob`, `multi:softmax` and `binary:logistic`.
//! Only numerical splits are evaluated.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::{ArtifactError, ClassifierError, ProbabilisticClassifier};

#[derive(Debug, Deserialize)]
struct ModelFile {
    learner: LearnerJson,
}

#[derive(Debug, Deserialize)]
struct LearnerJson {
    gradient_booster: BoosterJson,
    learner_model_param: LearnerModelParam,
    objective: ObjectiveJson,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "name")]
enum BoosterJson {
    #[serde(rename = "gbtree")]
    GbTree { model: GbTreeModel },
    #[serde(rename = "dart")]
    Dart {
        gbtree: DartInner,
        weight_drop: Vec<f32>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DartInner {
    model: GbTreeModel,
}

#[derive(Debug, Deserialize)]
struct GbTreeModel {
    trees: Vec<TreeJson>,
    tree_info: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct TreeJson {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<u8>,
}

/// `default_left` is written as 0/1 by some versions and as booleans by others
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(u8),
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

/// Numeric parameters are stored as strings
#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    base_score: String,
    num_class: String,
    num_feature: String,
}

#[derive(Debug, Deserialize)]
struct ObjectiveJson {
    name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Objective {
    /// `multi:softprob` / `multi:softmax`
    Softmax,
    /// `binary:logistic`
    Logistic,
}

#[derive(Debug, Clone)]
struct Node {
    left: i32,
    right: i32,
    feature: usize,
    /// Split threshold, or the leaf value when `left == -1`
    value: f32,
    default_left: bool,
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_json(json: TreeJson, num_features: usize, position: usize) -> Result<Self, ArtifactError> {
        let n = json.left_children.len();
        let invalid = |what: &str| {
            ArtifactError::Invalid(format!("tree {}: {}", position, what))
        };

        if n == 0 {
            return Err(invalid("no nodes"));
        }
        if json.right_children.len() != n
            || json.split_indices.len() != n
            || json.split_conditions.len() != n
            || json.default_left.len() != n
        {
            return Err(invalid("node arrays have different lengths"));
        }
        if json.split_type.iter().any(|&t| t != 0) {
            return Err(ArtifactError::Unsupported(format!(
                "tree {} uses categorical splits",
                position
            )));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let left = json.left_children[i];
            let right = json.right_children[i];
            let feature = json.split_indices[i] as usize;

            if left != -1 {
                // Children are always allocated after their parent
                let valid_child = |c: i32| c > i as i32 && (c as usize) < n;
                if !valid_child(left) || !valid_child(right) {
                    return Err(invalid(&format!("node {} has invalid children", i)));
                }
                if feature >= num_features {
                    return Err(invalid(&format!(
                        "node {} splits on feature {} of {}",
                        i, feature, num_features
                    )));
                }
            }

            nodes.push(Node {
                left,
                right,
                feature,
                value: json.split_conditions[i],
                default_left: json.default_left[i].is_set(),
            });
        }

        Ok(Self { nodes })
    }

    fn leaf_value(&self, features: &[f32]) -> f32 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.left == -1 {
                return node.value;
            }
            let x = features[node.feature];
            let go_left = if x.is_nan() {
                node.default_left
            } else {
                x < node.value
            };
            idx = if go_left { node.left } else { node.right } as usize;
        }
    }
}

/// Tree ensemble evaluated on dense feature vectors
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    trees: Vec<Tree>,
    tree_groups: Vec<usize>,
    tree_weights: Vec<f32>,
    base_margin: Vec<f32>,
    num_groups: usize,
    num_features: usize,
    objective: Objective,
}

impl GradientBoostedTrees {
    pub fn from_path(path: &Path) -> Result<Self, ArtifactError> {
        let text = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json_str(&text).map_err(|e| e.with_path(path))?;
        debug!(
            path = %path.display(),
            trees = model.num_trees(),
            classes = model.num_classes(),
            "Loaded gradient-boosted tree model"
        );
        Ok(model)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ArtifactError> {
        let file: ModelFile = serde_json::from_str(text).map_err(ArtifactError::Json)?;
        let learner = file.learner;
        let params = learner.learner_model_param;

        let num_features = parse_count("num_feature", &params.num_feature)?;
        let num_class = parse_count("num_class", &params.num_class)?;

        let objective = match learner.objective.name.as_str() {
            "multi:softprob" | "multi:softmax" => Objective::Softmax,
            "binary:logistic" => Objective::Logistic,
            other => {
                return Err(ArtifactError::Unsupported(format!("objective '{}'", other)));
            }
        };

        let num_groups = match objective {
            Objective::Softmax if num_class < 2 => {
                return Err(ArtifactError::Invalid(format!(
                    "softmax objective with num_class {}",
                    num_class
                )));
            }
            Objective::Softmax => num_class,
            Objective::Logistic => 1,
        };

        let (model, weights) = match learner.gradient_booster {
            BoosterJson::GbTree { model } => {
                let weights = vec![1.0; model.trees.len()];
                (model, weights)
            }
            BoosterJson::Dart { gbtree, weight_drop } => (gbtree.model, weight_drop),
            BoosterJson::Other => {
                return Err(ArtifactError::Unsupported(
                    "booster (only gbtree and dart are supported)".to_string(),
                ));
            }
        };

        if model.trees.is_empty() {
            return Err(ArtifactError::Invalid("model has no trees".to_string()));
        }
        if model.tree_info.len() != model.trees.len() || weights.len() != model.trees.len() {
            return Err(ArtifactError::Invalid(format!(
                "{} trees but {} tree_info entries and {} weights",
                model.trees.len(),
                model.tree_info.len(),
                weights.len()
            )));
        }
        if let Some(&group) = model.tree_info.iter().find(|&&g| g >= num_groups) {
            return Err(ArtifactError::Invalid(format!(
                "tree assigned to output group {} of {}",
                group, num_groups
            )));
        }

        let base_score = parse_base_score(&params.base_score, num_groups)?;
        let base_margin = base_score
            .into_iter()
            .map(|p| match objective {
                Objective::Softmax => Ok(p),
                Objective::Logistic if p > 0.0 && p < 1.0 => Ok((p / (1.0 - p)).ln()),
                Objective::Logistic => Err(ArtifactError::Invalid(format!(
                    "base_score {} outside (0, 1) for binary:logistic",
                    p
                ))),
            })
            .collect::<Result<Vec<f32>, _>>()?;

        let trees = model
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, tree)| Tree::from_json(tree, num_features, i))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            tree_groups: model.tree_info,
            tree_weights: weights,
            base_margin,
            num_groups,
            num_features,
            objective,
        })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Raw per-group margins before the objective's link function
    pub fn margins(&self, features: &[f32]) -> Vec<f32> {
        let mut margins = self.base_margin.clone();
        for ((tree, &group), &weight) in self.trees.iter().zip(&self.tree_groups).zip(&self.tree_weights) {
            margins[group] += weight * tree.leaf_value(features);
        }
        margins
    }
}

impl ProbabilisticClassifier for GradientBoostedTrees {
    fn kind(&self) -> &'static str {
        "xgboost"
    }

    fn num_classes(&self) -> usize {
        match self.objective {
            Objective::Softmax => self.num_groups,
            Objective::Logistic => 2,
        }
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f64>, ClassifierError> {
        if features.len() != self.num_features {
            return Err(ClassifierError::FeatureLength {
                expected: self.num_features,
                actual: features.len(),
            });
        }

        let margins = self.margins(features);
        let proba = match self.objective {
            Objective::Softmax => softmax(&margins),
            Objective::Logistic => {
                let p = sigmoid(margins[0] as f64);
                vec![1.0 - p, p]
            }
        };
        Ok(proba)
    }
}

fn parse_count(name: &str, value: &str) -> Result<usize, ArtifactError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ArtifactError::Invalid(format!("{} is not a count: '{}'", name, value)))
}

/// Scalar (`"5E-1"`) or vector (`"[5E-1,5E-1]"`) encoding
fn parse_base_score(value: &str, num_groups: usize) -> Result<Vec<f32>, ArtifactError> {
    let trimmed = value.trim();
    let invalid = || ArtifactError::Invalid(format!("unparseable base_score '{}'", value));

    if trimmed.starts_with('[') {
        let scores: Vec<f32> = serde_json::from_str(trimmed).map_err(|_| invalid())?;
        match scores.len() {
            1 => Ok(vec![scores[0]; num_groups]),
            n if n == num_groups => Ok(scores),
            n => Err(ArtifactError::Invalid(format!(
                "base_score has {} entries for {} output groups",
                n, num_groups
            ))),
        }
    } else {
        let score: f32 = trimmed.parse().map_err(|_| invalid())?;
        Ok(vec![score; num_groups])
    }
}

fn softmax(margins: &[f32]) -> Vec<f64> {
    let max = margins.iter().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = margins.iter().map(|&m| (m as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

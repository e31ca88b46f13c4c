//! Class index <-> emotion label mapping

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::ArtifactError;

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    Object { classes: Vec<String> },
    List(Vec<String>),
}

/// Ordered label set, index `i` is classifier class `i`
///
/// Accepts `{"classes": [...]}` or a bare JSON array, i.e. the exported
/// `classes_` of a fitted label encoder.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Result<Self, ArtifactError> {
        if classes.is_empty() {
            return Err(ArtifactError::Invalid("label encoder has no classes".to_string()));
        }

        let mut index = HashMap::with_capacity(classes.len());
        for (i, label) in classes.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(ArtifactError::Invalid(format!("label {} is empty", i)));
            }
            if index.insert(label.clone(), i).is_some() {
                return Err(ArtifactError::Invalid(format!("duplicate label '{}'", label)));
            }
        }

        Ok(Self { classes, index })
    }

    pub fn from_path(path: &Path) -> Result<Self, ArtifactError> {
        let text = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|e| e.with_path(path))
    }

    pub fn from_json_str(text: &str) -> Result<Self, ArtifactError> {
        let classes = match serde_json::from_str(text).map_err(ArtifactError::Json)? {
            LabelFile::Object { classes } => classes,
            LabelFile::List(classes) => classes,
        };
        Self::new(classes)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Label -> class index
    pub fn transform(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Class index -> label
    pub fn inverse_transform(&self, class: usize) -> Option<&str> {
        self.classes.get(class).map(String::as_str)
    }
}

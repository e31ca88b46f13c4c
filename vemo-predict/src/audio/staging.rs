//! Per-request scratch files
//!
//! A [`RequestScope`] owns every file a request writes to disk. Files carry
//! unique names so concurrent requests never collide, and all of them are
//! removed when the scope is dropped, whichever way the request ended.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, warn};

use super::CANONICAL_EXTENSION;
use crate::models::UploadedAudio;

/// Staging errors
#[derive(Debug, Error)]
pub enum StagingError {
    /// Staging directory could not be created
    #[error("cannot create staging directory {dir}: {source}")]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scratch file could not be created or written
    #[error("cannot write staged file in {dir}: {source}")]
    Write {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Root directory for request scratch files
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Use `root` for scratch files, creating it if missing
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StagingError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StagingError::CreateDir {
            dir: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open a scope for one request
    pub fn scope(&self) -> RequestScope<'_> {
        RequestScope {
            area: self,
            files: Vec::new(),
        }
    }
}

/// Upload written to disk for the current request
#[derive(Debug, Clone)]
pub struct StagedUpload {
    path: PathBuf,
    extension: String,
    sniffed_extension: Option<String>,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lower-cased extension of the uploaded filename (no dot, may be empty)
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether the filename declares the canonical container
    pub fn is_canonical(&self) -> bool {
        self.extension == CANONICAL_EXTENSION
    }

    /// Decoder hint: the sniffed container type when the magic bytes are
    /// recognised, otherwise the declared extension
    pub fn decoder_hint(&self) -> Option<&str> {
        self.sniffed_extension
            .as_deref()
            .or_else(|| (!self.extension.is_empty()).then_some(self.extension.as_str()))
    }
}

/// Scratch files belonging to one request
pub struct RequestScope<'a> {
    area: &'a StagingArea,
    files: Vec<TempPath>,
}

impl RequestScope<'_> {
    /// Write the upload to a uniquely named file preserving its extension
    pub fn stage(&mut self, upload: &UploadedAudio) -> Result<StagedUpload, StagingError> {
        let extension = upload.extension();
        let suffix = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };

        let mut file = tempfile::Builder::new()
            .prefix("vemo-upload-")
            .suffix(&suffix)
            .tempfile_in(self.area.root())
            .map_err(|source| self.write_error(source))?;

        file.write_all(&upload.bytes)
            .and_then(|_| file.flush())
            .map_err(|source| self.write_error(source))?;

        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();
        self.files.push(temp_path);

        let sniffed_extension = infer::get(&upload.bytes)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Audio
                || kind.matcher_type() == infer::MatcherType::Video)
            .map(|kind| kind.extension().to_string());

        debug!(
            path = %path.display(),
            bytes = upload.bytes.len(),
            extension = %extension,
            sniffed = ?sniffed_extension,
            "Staged upload"
        );

        Ok(StagedUpload {
            path,
            extension,
            sniffed_extension,
        })
    }

    /// Reserve a uniquely named, empty file for canonical output
    pub fn reserve_canonical(&mut self) -> Result<PathBuf, StagingError> {
        let file = tempfile::Builder::new()
            .prefix("vemo-canonical-")
            .suffix(&format!(".{}", CANONICAL_EXTENSION))
            .tempfile_in(self.area.root())
            .map_err(|source| self.write_error(source))?;

        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();
        self.files.push(temp_path);
        Ok(path)
    }

    /// Number of files this scope owns
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn write_error(&self, source: std::io::Error) -> StagingError {
        StagingError::Write {
            dir: self.area.root().to_path_buf(),
            source,
        }
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        for temp_path in self.files.drain(..) {
            let path = temp_path.to_path_buf();
            match temp_path.close() {
                Ok(()) => debug!("Deleted temp file: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Temp file already gone: {}", path.display())
                }
                Err(e) => warn!("Cleanup error for {}: {}", path.display(), e),
            }
        }
    }
}

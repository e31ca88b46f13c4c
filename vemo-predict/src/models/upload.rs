//! Uploaded audio as received from a client

use std::path::Path;

/// Raw upload bytes plus the client-declared filename
///
/// Lives for one request only. The filename's extension is a hint for
/// decoding and for the canonical-container check, never authoritative.
#[derive(Debug, Clone)]
pub struct UploadedAudio {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedAudio {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Lower-cased extension without the dot, empty when absent
    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn has_file_name(&self) -> bool {
        !self.file_name.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_is_lowercased() {
        assert_eq!(UploadedAudio::new("Clip.M4A", vec![]).extension(), "m4a");
        assert_eq!(UploadedAudio::new("archive.tar.GZ", vec![]).extension(), "gz");
    }

    #[test]
    fn test_missing_extension_is_empty() {
        assert_eq!(UploadedAudio::new("recording", vec![]).extension(), "");
        assert_eq!(UploadedAudio::new(".hidden", vec![]).extension(), "");
    }

    #[test]
    fn test_blank_file_name() {
        assert!(!UploadedAudio::new("", vec![1]).has_file_name());
        assert!(!UploadedAudio::new("   ", vec![1]).has_file_name());
        assert!(UploadedAudio::new("a.wav", vec![]).has_file_name());
    }
}

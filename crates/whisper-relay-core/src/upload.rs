//! Uploaded audio materialised as a temporary file for the engine.
//!
//! The file belongs to exactly one request and is deleted when the `UploadedAudio` is
//! dropped: after a completed run, after an engine failure, and after the client went away.

use crate::error::{RelayError, RelayResult};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Suffix used when the upload's filename has no extension.
pub const DEFAULT_SUFFIX: &str = ".audio";

#[derive(Debug)]
pub struct UploadedAudio {
    file: NamedTempFile,
    filename: String,
    len: usize,
}

impl UploadedAudio {
    /// Write `bytes` to a fresh temporary file named after the upload's extension.
    pub fn materialize(filename: &str, bytes: &[u8]) -> RelayResult<Self> {
        Self::materialize_in(std::env::temp_dir(), filename, bytes)
    }

    /// Same as [`UploadedAudio::materialize`], inside `dir`.
    pub fn materialize_in(dir: impl AsRef<Path>, filename: &str, bytes: &[u8]) -> RelayResult<Self> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(RelayError::InvalidOptions("Missing filename".to_string()));
        }
        let suffix = suffix_for(filename);
        let mut file = tempfile::Builder::new()
            .prefix("relay-upload-")
            .suffix(&suffix)
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        tracing::debug!(
            target: "relay::upload",
            path = %file.path().display(),
            bytes = bytes.len(),
            "upload materialised"
        );
        Ok(Self {
            file,
            filename: filename.to_string(),
            len: bytes.len(),
        })
    }

    /// Path the engine reads from. Valid until `self` is dropped.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Original filename as sent by the client.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for UploadedAudio {
    fn drop(&mut self) {
        tracing::debug!(
            target: "relay::upload",
            path = %self.file.path().display(),
            "releasing upload"
        );
    }
}

/// File extension hint (with leading dot) for the temp file.
pub fn suffix_for(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| DEFAULT_SUFFIX.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_uses_extension_or_default() {
        assert_eq!(suffix_for("meeting.aac"), ".aac");
        assert_eq!(suffix_for("voice.memo.m4a"), ".m4a");
        assert_eq!(suffix_for("noext"), DEFAULT_SUFFIX);
    }

    #[test]
    fn file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let upload = UploadedAudio::materialize_in(dir.path(), "clip.wav", b"RIFF....").unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF....");
        assert!(path.to_string_lossy().ends_with(".wav"));
        assert_eq!(upload.filename(), "clip.wav");
        assert_eq!(upload.len(), 8);
        drop(upload);
        assert!(!path.exists());
    }

    #[test]
    fn missing_filename_is_invalid() {
        let res = UploadedAudio::materialize("  ", b"abc");
        assert!(matches!(res, Err(RelayError::InvalidOptions(_))));
    }
}

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use base64::Engine as _;
use tempfile::TempPath;

use crate::TtsError;

pub const MP3_CONTENT_TYPE: &str = "audio/mpeg";

/// Synthesized speech stored in a uniquely named temporary `.mp3` file.
///
/// The artifact owns its file: dropping it removes the file. Call
/// [`AudioArtifact::keep`] to detach the file from that lifetime.
#[derive(Debug)]
pub struct AudioArtifact {
    path: TempPath,
    size: u64,
}

impl AudioArtifact {
    /// Write `audio` to a fresh temp file in `dir`, or the system temp dir.
    pub(crate) fn write(audio: &[u8], dir: Option<&Path>) -> Result<Self, TtsError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("fairytale-").suffix(".mp3");
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(audio)?;
        file.flush()?;

        Ok(Self {
            path: file.into_temp_path(),
            size: audio.len() as u64,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> &'static str {
        MP3_CONTENT_TYPE
    }

    /// Size of the audio in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>, TtsError> {
        Ok(tokio::fs::read(self.path()).await?)
    }

    /// The audio, Base64 encoded for embedding in JSON.
    pub async fn to_base64(&self) -> Result<String, TtsError> {
        let bytes = self.read_bytes().await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Keep the file on disk after the artifact is gone and return its path.
    pub fn keep(self) -> Result<PathBuf, TtsError> {
        self.path.keep().map_err(|e| TtsError::Io(e.error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read_back() {
        let artifact = AudioArtifact::write(b"\xFF\xFBabc", None).unwrap();
        let name = artifact.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("fairytale-"));
        assert!(name.ends_with(".mp3"));
        assert_eq!(artifact.len(), 5);
        assert_eq!(artifact.content_type(), "audio/mpeg");
        assert_eq!(artifact.read_bytes().await.unwrap(), b"\xFF\xFBabc");
        assert_eq!(artifact.to_base64().await.unwrap(), "//thYmM=");
    }

    #[test]
    fn test_drop_removes_file() {
        let artifact = AudioArtifact::write(b"audio", None).unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn test_keep_detaches_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = AudioArtifact::write(b"audio", Some(dir.path())).unwrap();
        let kept = artifact.keep().unwrap();
        assert!(kept.exists());
        assert!(kept.starts_with(dir.path()));
    }

    #[test]
    fn test_unique_names() {
        let a = AudioArtifact::write(b"a", None).unwrap();
        let b = AudioArtifact::write(b"b", None).unwrap();
        assert_ne!(a.path(), b.path());
    }
}

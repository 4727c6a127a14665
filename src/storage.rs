//! # Upload Storage
//!
//! Every upload is copied to its own file inside the configured upload directory,
//! named `<uuid><original extension>`. Concurrent uploads share the directory but
//! never a path, so no locking is needed.
//!
//! ## Artifact lifecycle:
//! 1. **Allocated**: `UploadStore::allocate` picks a fresh path
//! 2. **Written**: `StoredArtifact::write` streams the upload into it
//! 3. **Transcribed**: the engine reads it
//! 4. **Released**: `StoredArtifact::release` deletes the file when
//!    `delete_after_transcription` is on, otherwise leaves it for inspection
//!
//! An artifact dropped before it is released (the request was cancelled) is
//! deleted on drop under the same policy. Whoever runs the engine owns the
//! artifact for the duration of the call, so the file cannot disappear underneath it.

use crate::config::FilesConfig;
use futures_util::{Stream, StreamExt};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A stored copy of one uploaded audio file.
///
/// Not `Clone`: exactly one request lifecycle owns each artifact, and releasing it
/// consumes it.
#[derive(Debug)]
pub struct StoredArtifact {
    path: PathBuf,
    /// Delete the file when the lifecycle ends; cleared once deletion was attempted
    pending_delete: bool,
}

impl StoredArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream `chunks` into the file and return the number of bytes written.
    ///
    /// The file is flushed before returning, so the engine sees the complete upload.
    pub async fn write<S, B, E>(&self, mut chunks: S) -> io::Result<u64>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let mut file = tokio::fs::File::create(&self.path).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            let bytes = chunk.as_ref();
            file.write_all(bytes).await?;
            written += bytes.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }

    /// End the artifact's lifecycle.
    ///
    /// Returns `Ok(true)` if the file was deleted, `Ok(false)` if retention is on or
    /// the file was never created. Deletion is attempted once; a failure is returned,
    /// not retried.
    pub async fn release(mut self) -> io::Result<bool> {
        if !self.pending_delete {
            tracing::debug!("Keeping stored upload {}", self);
            return Ok(false);
        }

        self.pending_delete = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!("Deleted stored upload {}", self);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Stored upload {} was never created", self);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for StoredArtifact {
    fn drop(&mut self) {
        if !self.pending_delete {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Deleted abandoned upload {}", self.path.display()),
            // Never written: the request ended before the copy started
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, "Failed to delete abandoned upload {}", self.path.display()),
        }
    }
}

impl fmt::Display for StoredArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// The upload directory plus its retention policy.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    delete_after_transcription: bool,
}

impl UploadStore {
    /// Open the upload directory, creating it if needed.
    pub fn new(config: &FilesConfig) -> io::Result<Self> {
        let dir = PathBuf::from(&config.dir_path);
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            delete_after_transcription: config.delete_after_transcription,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn deletes_after_transcription(&self) -> bool {
        self.delete_after_transcription
    }

    /// Choose a unique path for an upload, keeping the original file's extension.
    ///
    /// `"sample.wav"` becomes `<dir>/3f2b...-....wav`; names without an extension
    /// (including dotfiles like `.bashrc`) get none.
    pub fn allocate(&self, original_filename: &str) -> StoredArtifact {
        let extension = Path::new(original_filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        StoredArtifact {
            path: self.dir.join(format!("{}{}", Uuid::new_v4(), extension)),
            pending_delete: self.delete_after_transcription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn store(dir: &Path, delete_after_transcription: bool) -> UploadStore {
        UploadStore::new(&FilesConfig {
            dir_path: dir.to_string_lossy().into_owned(),
            delete_after_transcription,
        })
        .unwrap()
    }

    #[test]
    fn test_allocate_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);

        let artifact = store.allocate("sample.wav");
        assert_eq!(artifact.path().parent(), Some(dir.path()));
        assert_eq!(artifact.path().extension().unwrap(), "wav");

        let artifact = store.allocate("archive.tar.gz");
        assert_eq!(artifact.path().extension().unwrap(), "gz");

        let artifact = store.allocate(".bashrc");
        assert!(artifact.path().extension().is_none());

        let artifact = store.allocate("../../etc/voice.mp3");
        assert_eq!(artifact.path().parent(), Some(dir.path()));
    }

    #[test]
    fn test_same_filename_gets_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);

        let first = store.allocate("sample.wav");
        let second = store.allocate("sample.wav");
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_new_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("data").join("uploads");
        let store = store(&nested, true);
        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn test_write_is_byte_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), false);
        let artifact = store.allocate("sample.wav");

        let chunks = stream::iter(vec![
            Ok::<_, io::Error>(vec![0u8, 1, 2]),
            Ok(vec![255u8; 4096]),
            Ok(vec![]),
            Ok(vec![7u8]),
        ]);
        let written = artifact.write(chunks).await.unwrap();
        assert_eq!(written, 3 + 4096 + 1);

        let mut expected = vec![0u8, 1, 2];
        expected.extend(vec![255u8; 4096]);
        expected.push(7);
        assert_eq!(std::fs::read(artifact.path()).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_release_respects_retention_policy() {
        let dir = tempfile::tempdir().unwrap();

        let deleting = store(dir.path(), true);
        let artifact = deleting.allocate("a.wav");
        std::fs::write(artifact.path(), b"x").unwrap();
        let path = artifact.path().to_path_buf();
        assert!(artifact.release().await.unwrap());
        assert!(!path.exists());

        let keeping = store(dir.path(), false);
        let artifact = keeping.allocate("b.wav");
        std::fs::write(artifact.path(), b"x").unwrap();
        let path = artifact.path().to_path_buf();
        assert!(!artifact.release().await.unwrap());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_release_of_unwritten_artifact_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = store(dir.path(), true).allocate("never-created.wav");
        assert!(!artifact.path().exists());
        assert!(!artifact.release().await.unwrap());
    }

    #[test]
    fn test_abandoned_artifact_follows_retention_policy() {
        let dir = tempfile::tempdir().unwrap();

        let artifact = store(dir.path(), true).allocate("a.wav");
        std::fs::write(artifact.path(), b"x").unwrap();
        let deleted = artifact.path().to_path_buf();
        drop(artifact);
        assert!(!deleted.exists());

        let artifact = store(dir.path(), false).allocate("b.wav");
        std::fs::write(artifact.path(), b"x").unwrap();
        let kept = artifact.path().to_path_buf();
        drop(artifact);
        assert!(kept.exists());

        // Never written: dropping is a no-op
        drop(store(dir.path(), true).allocate("c.wav"));
    }
}

//! Sink writing the archive to the local filesystem.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::error::SinkError;
use super::traits::{ArchiveSink, SinkReport, WriteAck};

/// Writes `<path>.partial` and renames it to `<path>` on close.
///
/// An existing file at the final path is never overwritten. On abort the
/// partial file is deleted.
pub struct FileSink {
    path: PathBuf,
    partial_path: PathBuf,
    file: Option<File>,
    hasher: Sha256,
    bytes_written: u64,
}

impl FileSink {
    /// Creates the partial file, creating parent directories as needed.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if fs::try_exists(&path).await? {
            return Err(SinkError::DestinationExists { path });
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial_path = PathBuf::from(partial);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial_path)
            .await?;

        debug!(path = %path.display(), "Opened file sink");
        Ok(Self {
            path,
            partial_path,
            file: Some(file),
            hasher: Sha256::new(),
            bytes_written: 0,
        })
    }

    /// Final archive path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path written to until the sink is closed.
    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    /// Flushes, syncs and renames the partial file into place.
    async fn finalize(&self, mut file: File) -> Result<(), SinkError> {
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if fs::try_exists(&self.path).await? {
            return Err(SinkError::DestinationExists {
                path: self.path.clone(),
            });
        }
        fs::rename(&self.partial_path, &self.path).await?;
        Ok(())
    }

    async fn discard_partial(&self) {
        match fs::remove_file(&self.partial_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.partial_path.display(),
                error = %e,
                "Failed to remove partial archive"
            ),
        }
    }
}

#[async_trait]
impl ArchiveSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn write(&mut self, chunk: Vec<u8>) -> Result<WriteAck, SinkError> {
        let file = self.file.as_mut().ok_or(SinkError::Closed)?;
        file.write_all(&chunk).await?;
        self.hasher.update(&chunk);
        self.bytes_written += chunk.len() as u64;
        Ok(WriteAck {
            bytes_written: self.bytes_written,
        })
    }

    async fn close(&mut self) -> Result<SinkReport, SinkError> {
        let file = self.file.take().ok_or(SinkError::Closed)?;
        if let Err(e) = self.finalize(file).await {
            self.discard_partial().await;
            return Err(e);
        }

        let digest = std::mem::take(&mut self.hasher).finalize();
        let sha256 = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();

        debug!(
            path = %self.path.display(),
            bytes = self.bytes_written,
            "Archive written"
        );
        Ok(SinkReport {
            location: Some(self.path.display().to_string()),
            bytes_written: self.bytes_written,
            sha256: Some(sha256),
        })
    }

    async fn abort(&mut self, reason: &str) {
        if self.file.take().is_none() {
            return;
        }
        self.discard_partial().await;
        debug!(path = %self.path.display(), reason, "File sink aborted");
    }
}

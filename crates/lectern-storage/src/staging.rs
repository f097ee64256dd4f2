//! Private staging area for bytes that have not passed every check yet.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{StorageError, StorageResult};

/// Directory staged uploads are written to. Never served to readers.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

/// An upload written to the staging area.
///
/// The file is removed when this value is dropped unless it was promoted
/// first, which covers every failure path and a cancelled ingestion alike.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    size: u64,
}

impl StagingArea {
    pub async fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();

        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create staging directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `reader` into a fresh staged file, failing once more than `limit`
    /// bytes arrive regardless of what size was declared.
    pub async fn stage<R>(&self, reader: R, limit: u64) -> StorageResult<StagedUpload>
    where
        R: AsyncRead + Unpin,
    {
        let start = Instant::now();
        let tmp = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".part")
            .tempfile_in(&self.dir)
            .map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to create staging file in {}: {}",
                    self.dir.display(),
                    e
                ))
            })?;

        let mut file = fs::File::from_std(tmp.as_file().try_clone()?);
        let mut limited = reader.take(limit.saturating_add(1));
        let size = tokio::io::copy(&mut limited, &mut file).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to write staging file {}: {}",
                tmp.path().display(),
                e
            ))
        })?;

        if size > limit {
            tracing::warn!(limit_bytes = limit, "Upload exceeded size limit while staging");
            return Err(StorageError::LimitExceeded { max: limit });
        }

        file.flush().await?;
        file.sync_all().await?;

        tracing::debug!(
            path = %tmp.path().display(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload staged"
        );

        Ok(StagedUpload { file: tmp, size })
    }
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Move into `target` without overwriting an existing file.
    pub(crate) fn persist_noclobber(self, target: &Path) -> StorageResult<()> {
        self.file
            .persist_noclobber(target)
            .map(|_| ())
            .map_err(|e| {
                StorageError::MoveFailed(format!(
                    "Failed to move staged upload to {}: {}",
                    target.display(),
                    e.error
                ))
            })
    }

    /// Refresh the recorded size after the file was rewritten in place.
    pub async fn refresh_size(&mut self) -> StorageResult<u64> {
        self.size = fs::metadata(self.file.path()).await?.len();
        Ok(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_stage_writes_bytes() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path().join(".staging")).await.unwrap();

        let staged = staging.stage(&b"hello staging"[..], 1024).await.unwrap();
        assert_eq!(staged.size(), 13);
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"hello staging");
    }

    #[tokio::test]
    async fn test_drop_removes_staged_file() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path()).await.unwrap();

        let staged = staging.stage(&b"temporary"[..], 1024).await.unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_limit_is_enforced_on_actual_bytes() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path()).await.unwrap();

        let result = staging.stage(&[0u8; 100][..], 99).await;
        assert!(matches!(result, Err(StorageError::LimitExceeded { max: 99 })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let staged = staging.stage(&[0u8; 100][..], 100).await.unwrap();
        assert_eq!(staged.size(), 100);
    }

    #[tokio::test]
    async fn test_refresh_size() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(dir.path()).await.unwrap();

        let mut staged = staging.stage(&b"abc"[..], 1024).await.unwrap();
        std::fs::write(staged.path(), b"abcdef").unwrap();
        assert_eq!(staged.refresh_size().await.unwrap(), 6);
    }
}

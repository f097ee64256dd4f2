//! Category directories under the upload root.

use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tokio::fs;

use crate::error::{StorageError, StorageResult};
use crate::staging::StagedUpload;

/// Where an accepted upload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    /// Path relative to the upload root, always `/`-separated
    pub relative_path: String,
    pub size: u64,
}

/// The public side of the upload root: one directory per category.
#[derive(Debug, Clone)]
pub struct UploadStore {
    base_path: PathBuf,
}

impl UploadStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create upload directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert a relative key to a filesystem path, refusing anything that
    /// could resolve outside the upload root. Only whole `.` and `..` segments
    /// are rejected, so `report..final.pdf` is a valid key.
    pub fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        if key
            .split(['/', '\\'])
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.base_path.join(relative))
    }

    /// `/`-separated path of `path` relative to the upload root.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    /// Move a staged upload to `<upload_path>/<stored_name>`. Creating the
    /// category directory is idempotent, so concurrent requests may race on it.
    pub async fn promote(
        &self,
        staged: StagedUpload,
        upload_path: &str,
        stored_name: &str,
    ) -> StorageResult<StoredFile> {
        let start = Instant::now();
        let key = format!("{}/{}", upload_path.trim_matches('/'), stored_name);
        let target = self.key_to_path(&key)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let size = staged.size();
        let destination = target.clone();
        tokio::task::spawn_blocking(move || staged.persist_noclobber(&destination))
            .await
            .map_err(|e| StorageError::MoveFailed(format!("Promotion task failed: {}", e)))??;

        tracing::info!(
            path = %target.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload stored"
        );

        Ok(StoredFile {
            path: target,
            relative_path: key,
            size,
        })
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "Stored upload deleted");
        Ok(())
    }
}

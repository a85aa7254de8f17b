use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::LocalCache;
use crate::error::{AppError, AppResult};
use crate::models::Bookmark;

/// Cache stored as a JSON array in a single file.
#[derive(Clone, Debug)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCache { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn cache_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Cache(format!("{context}: {e}"))
}

#[async_trait]
impl LocalCache for FileCache {
    async fn save(&self, bookmarks: &[Bookmark]) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| cache_error("create cache directory", e))?;
        }

        let json = serde_json::to_vec(bookmarks).map_err(|e| cache_error("encode cache", e))?;

        // Write-then-rename so a crash never leaves a truncated cache behind.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| cache_error("write cache", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| cache_error("replace cache", e))?;

        tracing::debug!(path = %self.path.display(), count = bookmarks.len(), "Bookmark cache saved");
        Ok(())
    }

    async fn load(&self) -> AppResult<Option<Vec<Bookmark>>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_error("read cache", e)),
        };

        match serde_json::from_slice(&bytes) {
            Ok(bookmarks) => Ok(Some(bookmarks)),
            Err(e) => {
                // A corrupt cache is only a missed shortcut; the store is the
                // source of truth.
                tracing::warn!(error = %e, path = %self.path.display(), "Ignoring unreadable bookmark cache");
                Ok(None)
            }
        }
    }

    async fn clear(&self) -> AppResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(cache_error("remove cache", e)),
        }
    }
}

/// In-process cache.
///
/// Cheaply cloneable; all clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryCache {
    contents: Arc<RwLock<Option<Vec<Bookmark>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn save(&self, bookmarks: &[Bookmark]) -> AppResult<()> {
        *self.contents.write().await = Some(bookmarks.to_vec());
        Ok(())
    }

    async fn load(&self) -> AppResult<Option<Vec<Bookmark>>> {
        Ok(self.contents.read().await.clone())
    }

    async fn clear(&self) -> AppResult<()> {
        *self.contents.write().await = None;
        Ok(())
    }
}

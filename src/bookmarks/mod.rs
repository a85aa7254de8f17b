//! Per-user bookmark collections kept in a remote document store and
//! mirrored into a local cache.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::Bookmark;

mod cache;
mod store;
mod sync;

pub use cache::{FileCache, MemoryCache};
pub use store::{MemoryDocumentStore, PgDocumentStore};
pub use sync::{BookmarkSync, SyncEvent};

/// Document ID for a bookmark: the lowercase hex MD5 of its URL.
///
/// Stable across runs, so saving the same URL twice overwrites the existing
/// document. The hex form also keeps `/` out of IDs.
pub fn bookmark_id(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}

/// Remote per-user bookmark storage.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_all(&self, user_id: Uuid) -> AppResult<Vec<Bookmark>>;

    /// Insert or overwrite the bookmark stored under `bookmark_id`.
    async fn put(&self, user_id: Uuid, bookmark_id: &str, bookmark: &Bookmark) -> AppResult<()>;

    async fn delete(&self, user_id: Uuid, bookmark_id: &str) -> AppResult<()>;
}

/// Local copy of the signed-in user's bookmarks.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn save(&self, bookmarks: &[Bookmark]) -> AppResult<()>;

    /// `None` when nothing has been cached yet.
    async fn load(&self) -> AppResult<Option<Vec<Bookmark>>>;

    async fn clear(&self) -> AppResult<()>;
}

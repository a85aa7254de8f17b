use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::DocumentStore;
use crate::error::{AppError, AppResult};
use crate::models::Bookmark;

/// Bookmarks in the `bookmarks` table, keyed by `(user_id, id)`.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        PgDocumentStore { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_all(&self, user_id: Uuid) -> AppResult<Vec<Bookmark>> {
        let bookmarks = sqlx::query_as::<_, Bookmark>(
            "SELECT id, url, title, description, created_at
             FROM bookmarks WHERE user_id = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookmarks)
    }

    async fn put(&self, user_id: Uuid, bookmark_id: &str, bookmark: &Bookmark) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookmarks (user_id, id, url, title, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, id) DO UPDATE
            SET url = EXCLUDED.url,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(user_id)
        .bind(bookmark_id)
        .bind(&bookmark.url)
        .bind(&bookmark.title)
        .bind(&bookmark.description)
        .bind(bookmark.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, bookmark_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(bookmark_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Bookmark not found".into()));
        }
        Ok(())
    }
}

/// In-process document store.
///
/// Cheaply cloneable; all clones share the same collections via `Arc`.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<Uuid, HashMap<String, Bookmark>>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_all(&self, user_id: Uuid) -> AppResult<Vec<Bookmark>> {
        let collections = self.collections.read().await;
        let mut bookmarks: Vec<Bookmark> = collections
            .get(&user_id)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        bookmarks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(bookmarks)
    }

    async fn put(&self, user_id: Uuid, bookmark_id: &str, bookmark: &Bookmark) -> AppResult<()> {
        let mut stored = bookmark.clone();
        stored.id = bookmark_id.to_string();
        self.collections
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(bookmark_id.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, bookmark_id: &str) -> AppResult<()> {
        self.collections
            .write()
            .await
            .get_mut(&user_id)
            .and_then(|docs| docs.remove(bookmark_id))
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Bookmark not found".into()))
    }
}

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{bookmark_id, DocumentStore, FileCache, LocalCache, PgDocumentStore};
use crate::auth::{AuthProvider, PgAuthProvider};
use crate::config::Config;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::metadata::{source_from_config, validate_target_url, MetadataSource};
use crate::models::{Bookmark, Credentials, NewBookmark, UserIdentity};

/// Notifications emitted by [`BookmarkSync::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    LoggedIn {
        user: UserIdentity,
        bookmarks: Vec<Bookmark>,
    },
    LoggedOut,
    SyncFailed {
        message: String,
    },
}

/// Keeps the signed-in user's bookmarks in step between the document store
/// and the local cache.
///
/// All collaborators are injected; nothing here reaches for global state.
#[derive(Clone)]
pub struct BookmarkSync {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn LocalCache>,
    metadata: Option<Arc<dyn MetadataSource>>,
}

impl BookmarkSync {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn LocalCache>,
    ) -> Self {
        BookmarkSync {
            auth,
            store,
            cache,
            metadata: None,
        }
    }

    /// Wire up the Postgres-backed auth provider and store, the file cache at
    /// `BOOKMARK_CACHE_PATH` and the configured metadata source.
    pub async fn connect(config: &Config) -> AppResult<Self> {
        let database_url = config.database_url.as_deref().ok_or_else(|| {
            AppError::Database(sqlx::Error::Configuration(
                "DATABASE_URL is not set".into(),
            ))
        })?;

        let pool = db::create_pool(database_url).await?;
        db::run_migrations(&pool).await?;

        tracing::info!(cache = %config.bookmark_cache_path.display(), "Bookmark sync ready");
        Ok(BookmarkSync::new(
            Arc::new(PgAuthProvider::new(pool.clone())),
            Arc::new(PgDocumentStore::new(pool)),
            Arc::new(FileCache::new(config.bookmark_cache_path.clone())),
        )
        .with_metadata(source_from_config(config)?))
    }

    /// Fill in missing titles/descriptions of new bookmarks from `source`.
    pub fn with_metadata(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.metadata = Some(source);
        self
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<UserIdentity> {
        self.auth.sign_in(&Credentials::new(email, password)).await
    }

    /// Sign out and drop the cached bookmarks of the previous user.
    pub async fn sign_out(&self) -> AppResult<()> {
        self.auth.sign_out().await?;
        self.cache.clear().await
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.auth.current_user()
    }

    fn require_user(&self) -> AppResult<UserIdentity> {
        self.auth
            .current_user()
            .ok_or_else(|| AppError::Auth("Not signed in".into()))
    }

    /// Load every bookmark of the signed-in user from the store and refresh
    /// the cache with them.
    pub async fn fetch_all(&self) -> AppResult<Vec<Bookmark>> {
        let user = self.require_user()?;
        self.fetch_for(&user).await
    }

    async fn fetch_for(&self, user: &UserIdentity) -> AppResult<Vec<Bookmark>> {
        let bookmarks = self.store.get_all(user.uid).await?;
        self.save_cache(user, &bookmarks).await;
        Ok(bookmarks)
    }

    async fn save_cache(&self, user: &UserIdentity, bookmarks: &[Bookmark]) {
        if let Err(e) = self.cache.save(bookmarks).await {
            tracing::warn!(error = %e, uid = %user.uid, "Failed to cache bookmarks");
        }
    }

    /// Whatever the cache currently holds; empty when nothing is cached.
    pub async fn cached(&self) -> AppResult<Vec<Bookmark>> {
        Ok(self.cache.load().await?.unwrap_or_default())
    }

    /// Save a bookmark under the ID derived from its URL. Saving a URL that
    /// is already bookmarked replaces the earlier entry.
    pub async fn add_bookmark(&self, new: NewBookmark) -> AppResult<Bookmark> {
        let user = self.require_user()?;
        validate_target_url(&new.url)?;

        let (title, description) = self.fill_metadata(&new).await;
        let id = bookmark_id(&new.url);
        let bookmark = Bookmark {
            id: id.clone(),
            url: new.url,
            title,
            description,
            created_at: Utc::now(),
        };

        self.store.put(user.uid, &id, &bookmark).await.map_err(|e| {
            tracing::warn!(error = %e, uid = %user.uid, url = %bookmark.url, "Failed to create new bookmark");
            e
        })?;

        self.update_cache(|cached| {
            match cached.iter_mut().find(|b| b.id == bookmark.id) {
                Some(existing) => *existing = bookmark.clone(),
                None => cached.push(bookmark.clone()),
            }
        })
        .await;

        tracing::info!(uid = %user.uid, id = %bookmark.id, "Bookmark saved");
        Ok(bookmark)
    }

    pub async fn delete_bookmark(&self, id: &str) -> AppResult<()> {
        let user = self.require_user()?;
        self.store.delete(user.uid, id).await?;
        self.update_cache(|cached| cached.retain(|b| b.id != id)).await;
        tracing::info!(uid = %user.uid, id = %id, "Bookmark deleted");
        Ok(())
    }

    async fn fill_metadata(&self, new: &NewBookmark) -> (String, String) {
        let mut title = new.title.clone();
        let mut description = new.description.clone();

        if title.is_none() || description.is_none() {
            if let Some(source) = &self.metadata {
                match source.fetch(&new.url).await {
                    Ok(found) => {
                        title = title.or(Some(found.title));
                        description = description.or(Some(found.description));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, url = %new.url, "Could not look up page metadata");
                    }
                }
            }
        }

        (title.unwrap_or_default(), description.unwrap_or_default())
    }

    /// Apply `edit` to the cached list. Cache failures are logged, never
    /// returned: the store already holds the change.
    async fn update_cache<F>(&self, edit: F)
    where
        F: FnOnce(&mut Vec<Bookmark>),
    {
        let mut cached = match self.cache.load().await {
            Ok(cached) => cached.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read bookmark cache");
                return;
            }
        };
        edit(&mut cached);
        if let Err(e) = self.cache.save(&cached).await {
            tracing::warn!(error = %e, "Failed to update bookmark cache");
        }
    }

    /// Follow auth-state changes until `cancel` fires or `events` is closed.
    ///
    /// The current state is reported first; after that one event is emitted
    /// per change. A sign-in loads the user's bookmarks before reporting.
    /// Results for a user who signed out while the load was in flight are
    /// discarded, and the cache is cleared again on every later sign-out.
    pub async fn run(&self, events: mpsc::Sender<SyncEvent>, cancel: CancellationToken) {
        let mut auth_changes = self.auth.subscribe();
        let mut initial = true;

        loop {
            let state = auth_changes.borrow_and_update().clone();
            let event = match state {
                None => {
                    if !initial {
                        // A load that raced the sign-out may have refilled it.
                        if let Err(e) = self.cache.clear().await {
                            tracing::warn!(error = %e, "Failed to clear bookmark cache");
                        }
                    }
                    SyncEvent::LoggedOut
                }
                Some(user) => {
                    let fetched = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        fetched = self.store.get_all(user.uid) => fetched,
                    };
                    match auth_changes.has_changed() {
                        Ok(false) => {}
                        Ok(true) => {
                            tracing::debug!(uid = %user.uid, "Auth changed during load; discarding");
                            initial = false;
                            continue;
                        }
                        Err(_) => return,
                    }
                    match fetched {
                        Ok(bookmarks) => {
                            self.save_cache(&user, &bookmarks).await;
                            if !matches!(auth_changes.has_changed(), Ok(false)) {
                                initial = false;
                                continue;
                            }
                            SyncEvent::LoggedIn { user, bookmarks }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, uid = %user.uid, "Failed to fetch bookmarks");
                            SyncEvent::SyncFailed {
                                message: "Failed to fetch bookmarks".into(),
                            }
                        }
                    }
                }
            };
            initial = false;

            if events.send(event).await.is_err() {
                tracing::debug!("Sync event receiver dropped; stopping");
                return;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                changed = auth_changes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

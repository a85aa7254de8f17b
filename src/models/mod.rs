use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

mod extraction;

pub use extraction::ExtractionResult;

// ============================================================================
// User Models
// ============================================================================

/// Internal database row. Not serializable; use [`UserIdentity`] for anything
/// that leaves the auth provider, so `password_hash` never travels further.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// The signed-in user as seen by the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}

impl From<User> for UserIdentity {
    fn from(user: User) -> Self {
        UserIdentity {
            uid: user.id,
            email: user.email,
            display_name: user.display_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "Must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password must not be empty"))]
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }
}

// ============================================================================
// Bookmark Models
// ============================================================================

/// A saved link. `id` is derived from `url` (see
/// [`bookmark_id`](crate::bookmarks::bookmark_id)), so one user can hold at
/// most one bookmark per URL.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a bookmark. Missing title/description are filled in
/// from the page itself when a metadata source is available.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBookmark {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl NewBookmark {
    pub fn new(url: impl Into<String>) -> Self {
        NewBookmark {
            url: url.into(),
            ..Default::default()
        }
    }
}

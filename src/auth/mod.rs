use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Credentials, UserIdentity};

mod memory;
mod postgres;

pub use memory::MemoryAuthProvider;
pub use postgres::PgAuthProvider;

pub const HASH_COST: u32 = 12;
/// Lowest cost bcrypt accepts. Only for tests and throwaway accounts.
pub const MIN_HASH_COST: u32 = 4;
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

// ============================================================================
// Auth Provider
// ============================================================================

/// Signs users in and out and publishes the current auth state.
///
/// `subscribe` replaces callback registration: every receiver observes each
/// sign-in and sign-out as a change of the watched value.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> AppResult<UserIdentity>;

    async fn sign_out(&self) -> AppResult<()>;

    fn current_user(&self) -> Option<UserIdentity>;

    fn subscribe(&self) -> watch::Receiver<Option<UserIdentity>>;
}

/// Shared "who is signed in" cell used by the provider implementations.
///
/// Cheaply cloneable; all clones publish to the same channel.
#[derive(Clone)]
pub struct AuthState {
    tx: Arc<watch::Sender<Option<UserIdentity>>>,
}

impl AuthState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        AuthState { tx: Arc::new(tx) }
    }

    /// Publish a new state. Succeeds even when nobody is subscribed.
    pub fn set(&self, user: Option<UserIdentity>) {
        self.tx.send_replace(user);
    }

    pub fn current(&self) -> Option<UserIdentity> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.tx.subscribe()
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Input validation
// ============================================================================

pub fn validate_credentials(credentials: &Credentials) -> AppResult<()> {
    credentials.validate().map_err(validation_error)
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::InvalidInput(
        e.field_errors()
            .values()
            .flat_map(|v| v.iter())
            .filter_map(|e| e.message.as_ref())
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Emails are matched case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// Password Hashing
// ============================================================================

pub fn hash_password(password: &str) -> AppResult<String> {
    hash_password_with_cost(password, HASH_COST)
}

pub fn hash_password_with_cost(password: &str, cost: u32) -> AppResult<String> {
    bcrypt::hash(password, cost).map_err(|e| {
        tracing::error!("Failed to hash password: {:?}", e);
        AppError::Internal
    })
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    bcrypt::verify(password, hash).map_err(|e| {
        tracing::error!("Failed to verify password: {:?}", e);
        AppError::Internal
    })
}

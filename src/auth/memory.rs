use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use super::{
    hash_password_with_cost, normalize_email, validate_credentials, verify_password, AuthProvider,
    AuthState, HASH_COST, INVALID_CREDENTIALS,
};
use crate::error::{AppError, AppResult};
use crate::models::{Credentials, UserIdentity};

/// Auth provider keeping accounts in process memory. Used for local runs and
/// tests; passwords are still stored as bcrypt hashes.
///
/// Cheaply cloneable; all clones share the same accounts and auth state.
#[derive(Clone)]
pub struct MemoryAuthProvider {
    users: Arc<RwLock<HashMap<String, (UserIdentity, String)>>>,
    state: AuthState,
    hash_cost: u32,
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        MemoryAuthProvider {
            users: Arc::default(),
            state: AuthState::new(),
            hash_cost: HASH_COST,
        }
    }

    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Register an account. Fails with `Conflict` if the email is taken.
    pub async fn add_user(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> AppResult<UserIdentity> {
        validate_credentials(&Credentials::new(email, password))?;

        let email = normalize_email(email);
        let hash = hash_password_with_cost(password, self.hash_cost)?;

        let mut users = self.users.write().await;
        if users.contains_key(&email) {
            return Err(AppError::Conflict("Email already registered".into()));
        }

        let identity = UserIdentity {
            uid: Uuid::new_v4(),
            email: email.clone(),
            display_name: display_name.map(str::to_string),
        };
        users.insert(email, (identity.clone(), hash));
        Ok(identity)
    }
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn sign_in(&self, credentials: &Credentials) -> AppResult<UserIdentity> {
        validate_credentials(credentials)?;

        let (identity, hash) = self
            .users
            .read()
            .await
            .get(&normalize_email(&credentials.email))
            .cloned()
            .ok_or_else(|| AppError::Auth(INVALID_CREDENTIALS.into()))?;

        if !verify_password(&credentials.password, &hash)? {
            return Err(AppError::Auth(INVALID_CREDENTIALS.into()));
        }

        tracing::info!(uid = %identity.uid, "User signed in");
        self.state.set(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> AppResult<()> {
        if let Some(user) = self.state.current() {
            tracing::info!(uid = %user.uid, "User signed out");
        }
        self.state.set(None);
        Ok(())
    }

    fn current_user(&self) -> Option<UserIdentity> {
        self.state.current()
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.state.subscribe()
    }
}

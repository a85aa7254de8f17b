use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::watch;

use super::{
    hash_password, normalize_email, validate_credentials, verify_password, AuthProvider,
    AuthState, INVALID_CREDENTIALS,
};
use crate::error::{AppError, AppResult};
use crate::models::{Credentials, User, UserIdentity};

/// Auth provider backed by the `users` table.
#[derive(Clone)]
pub struct PgAuthProvider {
    pool: PgPool,
    state: AuthState,
}

impl PgAuthProvider {
    pub fn new(pool: PgPool) -> Self {
        PgAuthProvider {
            pool,
            state: AuthState::new(),
        }
    }

    /// Provision an account. A taken email surfaces as `Conflict` via the
    /// unique constraint.
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> AppResult<UserIdentity> {
        validate_credentials(&Credentials::new(email, password))?;

        let password_hash = hash_password(password)?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, display_name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, display_name, password_hash, created_at
            "#,
        )
        .bind(normalize_email(email))
        .bind(display_name)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(uid = %user.id, "User created");
        Ok(user.into())
    }
}

#[async_trait]
impl AuthProvider for PgAuthProvider {
    async fn sign_in(&self, credentials: &Credentials) -> AppResult<UserIdentity> {
        validate_credentials(credentials)?;

        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, display_name, password_hash, created_at
             FROM users WHERE email = $1",
        )
        .bind(normalize_email(&credentials.email))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Auth(INVALID_CREDENTIALS.into()))?;

        if !verify_password(&credentials.password, &user.password_hash)? {
            return Err(AppError::Auth(INVALID_CREDENTIALS.into()));
        }

        let identity = UserIdentity::from(user);
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

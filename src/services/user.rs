//! User service
//!
//! Registration and the session lifecycle:
//! - register (buyers also get an empty coin ledger)
//! - login, limited to one active session per user inside the reuse window
//! - refresh an access token from a refresh token
//! - logout of one session, or of every session after re-authenticating

use crate::db::repositories::{
    is_unique_violation, BalanceRepository, SessionRepository, UserRepository,
};
use crate::models::{Balance, CreateUserInput, User};
use crate::services::password::{hash_password, verify_against_dummy, verify_password};
use crate::services::token::{AccessClaims, AuthError, TokenService, TokenSubject};
use anyhow::Context;
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

const CREDENTIAL_MIN_LEN: usize = 5;
const CREDENTIAL_MAX_LEN: usize = 20;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Unknown username or wrong password
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// User not found
    #[error("User not found")]
    NotFound,

    /// Token or session rejected
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Tokens handed out at login
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// User service for registration and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    balance_repo: Arc<dyn BalanceRepository>,
    tokens: Arc<TokenService>,
    session_reuse_window: Duration,
}

impl UserService {
    /// Create a new user service
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        balance_repo: Arc<dyn BalanceRepository>,
        tokens: Arc<TokenService>,
        session_reuse_window: Duration,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            balance_repo,
            tokens,
            session_reuse_window,
        }
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if username or password is not 5-20 alphanumeric characters
    /// - `UserExists` if the username is taken
    /// - `InternalError` for database errors
    pub async fn register(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        validate_credential("Username", &input.username)?;
        validate_credential("Password", &input.password)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(input.username, password_hash, input.role);

        let created = match self.user_repo.create(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(format!(
                    "Username '{}' is already taken",
                    user.username
                )));
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        if created.is_buyer() {
            self.balance_repo
                .create(&Balance::empty(created.id))
                .await
                .context("Failed to create coin ledger")?;
        }

        tracing::info!("Registered {} {}", created.role, created.username);
        Ok(created)
    }

    /// Log in and open a new session.
    ///
    /// Rejected with `SessionAlreadyExists` while another session of the same
    /// user is valid and younger than the reuse window; no session or token is
    /// created in that case.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, UserServiceError> {
        let user = self.authenticate(username, password).await?;

        let subject = subject_of(&user);
        let session = Uuid::new_v4();
        let refresh_token = match self
            .tokens
            .issue_refresh_token(&subject, session, self.session_reuse_window)
            .await
        {
            Ok(token) => token,
            Err(AuthError::SessionAlreadyExists) => {
                tracing::warn!("Login rejected for {}: session already active", user.username);
                return Err(AuthError::SessionAlreadyExists.into());
            }
            Err(e) => return Err(e.into()),
        };
        let access_token = self.tokens.issue_access_token(&subject, session)?;

        tracing::info!("User {} logged in (session {})", user.username, session);
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Issue a fresh access token for the session behind `refresh_token`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, UserServiceError> {
        let grant = self.tokens.validate_refresh_token(refresh_token).await?;

        let user = self
            .user_repo
            .get_by_id(grant.user_id)
            .await
            .context("Failed to load user")?
            .ok_or(UserServiceError::NotFound)?;

        let access_token = self.tokens.issue_access_token(&subject_of(&user), grant.session)?;
        tracing::debug!("Refreshed access token for {}", user.username);
        Ok(access_token)
    }

    /// Revoke the session the access token belongs to.
    pub async fn logout(&self, claims: &AccessClaims) -> Result<(), UserServiceError> {
        let affected = self
            .session_repo
            .invalidate(claims.session)
            .await
            .context("Failed to invalidate session")?;

        if affected == 0 {
            tracing::debug!("Logout for unknown session {}", claims.session);
        } else {
            tracing::info!("User {} logged out (session {})", claims.username, claims.session);
        }
        Ok(())
    }

    /// Re-authenticate and revoke every session of the user.
    ///
    /// Returns the number of sessions touched.
    pub async fn logout_all(&self, username: &str, password: &str) -> Result<u64, UserServiceError> {
        let user = self.authenticate(username, password).await?;

        let affected = self
            .session_repo
            .invalidate_all_for_user(user.id)
            .await
            .context("Failed to invalidate sessions")?;

        tracing::info!("User {} logged out of {} session(s)", user.username, affected);
        Ok(affected)
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<User, UserServiceError> {
        let user = match self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to find user")?
        {
            Some(user) => user,
            None => {
                verify_against_dummy(password).context("Failed to verify password")?;
                tracing::warn!("Login failed: unknown user {}", username);
                return Err(UserServiceError::InvalidCredentials);
            }
        };

        let valid = verify_password(password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            tracing::warn!("Login failed: wrong password for {}", username);
            return Err(UserServiceError::InvalidCredentials);
        }

        Ok(user)
    }
}

fn subject_of(user: &User) -> TokenSubject {
    TokenSubject {
        user_id: user.id,
        username: user.username.clone(),
        role: user.role,
    }
}

fn validate_credential(field: &str, value: &str) -> Result<(), UserServiceError> {
    let len = value.chars().count();
    if !(CREDENTIAL_MIN_LEN..=CREDENTIAL_MAX_LEN).contains(&len) {
        return Err(UserServiceError::ValidationError(format!(
            "{} must be between {} and {} characters",
            field, CREDENTIAL_MIN_LEN, CREDENTIAL_MAX_LEN
        )));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(UserServiceError::ValidationError(format!(
            "{} must contain only letters and digits",
            field
        )));
    }
    Ok(())
}

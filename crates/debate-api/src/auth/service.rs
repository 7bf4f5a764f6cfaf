//! Authentication service layer
//!
//! Registration, login and token refresh on top of the credential hasher,
//! the session issuer and a `UserStore`.

use super::middleware::{AuthError, INVALID_PAYLOAD, USER_INACTIVE, USER_NOT_FOUND};
use super::password::{hash_password_with_config, verify_password, PasswordConfig};
use super::session::{identity_claims, SessionIssuer, TokenPair};
use chrono::{DateTime, Utc};
use debate_core::{NewUser, UserRecord, UserStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use utoipa::ToSchema;
use validator::Validate;

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Username must not be empty"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password must not be empty"))]
    pub password: String,
}

/// OAuth2 password-grant form; `username` carries the email
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// User information safe to return to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserPublic {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Tokens granted to a resolved user
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserPublic,
    pub tokens: TokenPair,
}

/// Plaintext behind the hash verified when a login email is unknown
const DUMMY_PASSWORD: &str = "debate-dummy-password";

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    issuer: SessionIssuer,
    users: Arc<dyn UserStore>,
    password_config: PasswordConfig,
    /// Hash with the current cost parameters, built on the first unknown-email login
    dummy_hash: Arc<OnceCell<String>>,
}

impl AuthService {
    pub fn new(issuer: SessionIssuer, users: Arc<dyn UserStore>) -> Self {
        Self {
            issuer,
            users,
            password_config: PasswordConfig::default(),
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Override the Argon2 cost parameters used for new hashes
    pub fn with_password_config(mut self, config: PasswordConfig) -> Self {
        self.password_config = config;
        self.dummy_hash = Arc::new(OnceCell::new());
        self
    }

    pub fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    /// Register a new user
    ///
    /// # Returns
    ///
    /// * `Ok(UserPublic)` - Newly created user
    /// * `Err(AuthError::Validation)` - Malformed email or empty fields
    /// * `Err(AuthError::DuplicateIdentity)` - Email or username in use
    pub async fn register(&self, request: RegisterRequest) -> Result<UserPublic, AuthError> {
        request
            .validate()
            .map_err(|e| AuthError::Validation(e.to_string()))?;

        let password = request.password;
        let config = self.password_config.clone();
        let hashed_password =
            tokio::task::spawn_blocking(move || hash_password_with_config(&password, &config))
                .await
                .map_err(|e| AuthError::Internal(format!("Hashing task failed: {e}")))?
                .map_err(|e| AuthError::Internal(e.to_string()))?;

        let user = self
            .users
            .create_user(NewUser {
                email: request.email,
                username: request.username,
                hashed_password,
            })
            .await?;

        tracing::info!(user_id = user.id, "User registered");
        Ok(user.into())
    }

    /// Verify credentials and issue a token pair
    ///
    /// Unknown email and wrong password are indistinguishable to the caller,
    /// in both the response and the work done: an unknown email is still
    /// checked against a hash of the same cost.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let Some(user) = self.users.find_user_by_email(email).await? else {
            if let Some(dummy) = self.dummy_hash().await {
                self.verify(password, dummy.clone()).await?;
            }
            return Err(AuthError::InvalidCredentials);
        };

        let matches = self.verify(password, user.hashed_password.clone()).await?;

        if !matches {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::Forbidden(USER_INACTIVE));
        }

        let tokens = self.issuer.issue_pair(identity_claims(user.id))?;
        Ok(Session {
            user: user.into(),
            tokens,
        })
    }

    /// Exchange a refresh token for a new pair
    ///
    /// The subject must still resolve to an active user.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let claims = self.issuer.verify_refresh_token(refresh_token)?;

        let user_id = claims
            .user_id()
            .ok_or(AuthError::Unauthenticated(INVALID_PAYLOAD))?;
        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated(USER_NOT_FOUND))?;

        if !user.is_active {
            return Err(AuthError::Forbidden(USER_INACTIVE));
        }

        let tokens = self.issuer.issue_pair(claims.identity())?;
        Ok(Session {
            user: user.into(),
            tokens,
        })
    }

    async fn verify(&self, password: &str, stored: String) -> Result<bool, AuthError> {
        let candidate = password.to_string();
        tokio::task::spawn_blocking(move || verify_password(&candidate, &stored))
            .await
            .map_err(|e| AuthError::Internal(format!("Verification task failed: {e}")))
    }

    async fn dummy_hash(&self) -> Option<&String> {
        let config = self.password_config.clone();
        let result = self
            .dummy_hash
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || {
                    hash_password_with_config(DUMMY_PASSWORD, &config)
                        .map_err(|e| e.to_string())
                })
                .await
                .map_err(|e| e.to_string())?
            })
            .await;

        match result {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build dummy password hash");
                None
            }
        }
    }

    /// Look up a user by id
    pub async fn get_user(&self, id: i64) -> Result<Option<UserPublic>, AuthError> {
        Ok(self.users.find_user_by_id(id).await?.map(UserPublic::from))
    }
}

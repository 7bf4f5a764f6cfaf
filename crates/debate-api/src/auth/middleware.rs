/// Request authentication
///
/// `Authenticator` resolves a bearer token to a stored, active user. The
/// axum middleware wraps it and adds the resolved `CurrentUser` to request
/// extensions.
use super::jwt::{JwtError, TokenCodec, TokenRejection, TokenType};
use crate::audit::{audit_log, AuditEvent, RequestContext};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use debate_core::{StoreError, UserRecord, UserStore};
use std::sync::Arc;
use thiserror::Error;

pub const NOT_AUTHENTICATED: &str = "Not authenticated";
pub const INVALID_OR_EXPIRED: &str = "Invalid or expired token";
pub const INVALID_TOKEN_TYPE: &str = "Invalid token type";
pub const INVALID_PAYLOAD: &str = "Invalid token payload";
pub const USER_NOT_FOUND: &str = "User not found";
pub const USER_INACTIVE: &str = "User inactive";

/// Authentication and session errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong password or unknown email; never says which
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token: {0}")]
    InvalidToken(TokenRejection),

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    DuplicateIdentity(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Message safe to show the client
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Incorrect email or password".to_string(),
            Self::InvalidToken(TokenRejection::WrongType) => INVALID_TOKEN_TYPE.to_string(),
            Self::InvalidToken(_) => INVALID_OR_EXPIRED.to_string(),
            Self::Unauthenticated(msg) | Self::Forbidden(msg) => msg.to_string(),
            Self::DuplicateIdentity(msg) | Self::Validation(msg) => msg.clone(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::InvalidToken(reason) => AuthError::InvalidToken(reason),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateIdentity(msg) => AuthError::DuplicateIdentity(msg),
            StoreError::Database(msg) => AuthError::Internal(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

/// The authenticated caller, available to handlers as
/// `Extension<CurrentUser>`
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRecord);

/// Bearer token from the Authorization header.
///
/// The scheme is matched case-insensitively; any other scheme counts as no
/// credential at all.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Resolves bearer credentials to active users
#[derive(Clone)]
pub struct Authenticator {
    codec: TokenCodec,
    users: Arc<dyn UserStore>,
}

impl Authenticator {
    pub fn new(codec: TokenCodec, users: Arc<dyn UserStore>) -> Self {
        Self { codec, users }
    }

    /// Resolve a bearer credential to the caller's user record
    ///
    /// Checks run in order: credential present, token decodes, token is an
    /// access token, subject is a numeric id, user exists, user is active.
    /// Every failure is `Unauthenticated` except an inactive user, which
    /// is `Forbidden`. Store I/O failures are `Internal`.
    pub async fn authenticate_request(
        &self,
        bearer: Option<&str>,
    ) -> Result<UserRecord, AuthError> {
        let token = bearer.ok_or(AuthError::Unauthenticated(NOT_AUTHENTICATED))?;

        let claims = self.codec.decode(token).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            AuthError::Unauthenticated(INVALID_OR_EXPIRED)
        })?;

        if claims.token_type != TokenType::Access {
            return Err(AuthError::Unauthenticated(INVALID_TOKEN_TYPE));
        }

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

        Ok(user)
    }
}

/// Authentication middleware that requires a valid access token
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
/// use debate_api::auth::middleware::auth_middleware;
///
/// let protected = Router::new()
///     .route("/auth/me", get(me_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let result = state
        .authenticator
        .authenticate_request(bearer_token(request.headers()))
        .await;

    let user = match result {
        Ok(user) => user,
        Err(err) => {
            let context = RequestContext::from_headers(request.headers());
            match &err {
                AuthError::Forbidden(reason) => audit_log(&AuditEvent::AccessDenied {
                    user_id: None,
                    reason: reason.to_string(),
                    context,
                }),
                AuthError::Unauthenticated(reason) if *reason != NOT_AUTHENTICATED => {
                    audit_log(&AuditEvent::InvalidToken {
                        reason: reason.to_string(),
                        context,
                    })
                }
                _ => {}
            }
            return Err(err);
        }
    };

    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}

//! Authentication API handlers
//!
//! Register, login, refresh and the current-user profile. Outcomes of the
//! credential-bearing endpoints go to the audit log; server faults do not.

use crate::audit::{audit_log, AuditEvent, RequestContext};
use crate::auth::{AuthError, CurrentUser, LoginForm, RefreshRequest, RegisterRequest, UserPublic};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Form, Json,
};
use std::sync::Arc;

/// Register a new user account
///
/// # Responses
///
/// * `201 Created` - User registered
/// * `400 Bad Request` - Email or username already in use
/// * `422 Unprocessable Entity` - Malformed email or empty fields
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserPublic),
        (status = 400, description = "Email or username already in use", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = request.email.clone();

    match state.auth.register(request).await {
        Ok(user) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                user_id: user.id,
                email: user.email.clone(),
                context: RequestContext::from_headers(&headers),
            });
            Ok((StatusCode::CREATED, Json(user)))
        }
        Err(err) => {
            if !matches!(err, AuthError::Internal(_)) {
                audit_log(&AuditEvent::RegistrationFailure {
                    email,
                    reason: err.public_message(),
                    context: RequestContext::from_headers(&headers),
                });
            }
            Err(err.into())
        }
    }
}

/// Login with email and password
///
/// Takes an OAuth2 password-grant form where `username` is the email.
///
/// # Responses
///
/// * `200 OK` - Access and refresh tokens
/// * `401 Unauthorized` - Incorrect email or password
/// * `403 Forbidden` - User inactive
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login successful", body = crate::auth::TokenPair),
        (status = 401, description = "Incorrect email or password", body = crate::error::ApiError),
        (status = 403, description = "User inactive", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let context = RequestContext::from_headers(&headers);

    match state.auth.login(&form.username, &form.password).await {
        Ok(session) => {
            audit_log(&AuditEvent::LoginSuccess {
                user_id: session.user.id,
                email: session.user.email,
                context,
            });
            Ok(Json(session.tokens))
        }
        Err(err) => {
            let reason = match &err {
                AuthError::Internal(_) => None,
                AuthError::InvalidCredentials => Some("Invalid credentials".to_string()),
                other => Some(other.public_message()),
            };
            if let Some(reason) = reason {
                audit_log(&AuditEvent::LoginFailure {
                    email: form.username,
                    reason,
                    context,
                });
            }
            Err(err.into())
        }
    }
}

/// Refresh access token
///
/// Exchanges a valid refresh token for a new access/refresh pair. The
/// presented refresh token is not revoked.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = crate::auth::TokenPair),
        (status = 401, description = "Invalid refresh token", body = crate::error::ApiError),
        (status = 403, description = "User inactive", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let context = RequestContext::from_headers(&headers);

    match state.auth.refresh(&request.refresh_token).await {
        Ok(session) => {
            audit_log(&AuditEvent::TokenRefresh {
                user_id: session.user.id,
                context,
            });
            Ok(Json(session.tokens))
        }
        Err(err) => {
            let user_id = state
                .auth
                .issuer()
                .verify_refresh_token(&request.refresh_token)
                .ok()
                .and_then(|claims| claims.user_id());
            if let Some(event) = refresh_failure_event(&err, user_id, context) {
                audit_log(&event);
            }
            Err(err.into())
        }
    }
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user profile", body = UserPublic),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "User inactive", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserPublic> {
    Json(user.into())
}

/// Audit event for a failed refresh; server faults are not security events
fn refresh_failure_event(
    err: &AuthError,
    user_id: Option<i64>,
    context: RequestContext,
) -> Option<AuditEvent> {
    match err {
        AuthError::Internal(_) => None,
        AuthError::Forbidden(reason) => Some(AuditEvent::AccessDenied {
            user_id,
            reason: reason.to_string(),
            context,
        }),
        other => Some(AuditEvent::InvalidToken {
            reason: other.public_message(),
            context,
        }),
    }
}

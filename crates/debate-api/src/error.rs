//! API error handling
//!
//! Domain and auth errors are plain values until they reach a handler's
//! return; only here are they turned into HTTP statuses.

use crate::auth::AuthError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use debate_core::DebateError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unauthorized(String),
    Forbidden(String),
    Unprocessable(String),
    TooManyRequests(String),
    BadGateway(String),
    Internal(String),
    Database(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ApiError) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ApiError::new("CONFLICT", msg)),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::new("UNAUTHORIZED", msg))
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ApiError::new("FORBIDDEN", msg)),
            AppError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError::new("VALIDATION_ERROR", msg),
            ),
            AppError::TooManyRequests(msg) => (
                StatusCode::TOO_MANY_REQUESTS,
                ApiError::new("RATE_LIMITED", msg),
            ),
            AppError::BadGateway(msg) => (
                StatusCode::BAD_GATEWAY,
                ApiError::new("UPSTREAM_ERROR", "Upstream service failed").with_details(msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error().with_details(msg),
            ),
            AppError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("DATABASE_ERROR", "Database operation failed").with_details(msg),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_body();

        if status.is_server_error() {
            tracing::error!(code = %error.code, details = ?error.details, "Request failed");
        }

        let mut response = (status, Json(error)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.public_message();
        match err {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken(_)
            | AuthError::Unauthenticated(_) => AppError::Unauthorized(message),
            AuthError::Forbidden(_) => AppError::Forbidden(message),
            AuthError::DuplicateIdentity(_) => AppError::BadRequest(message),
            AuthError::Validation(_) => AppError::Unprocessable(message),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<DebateError> for AppError {
    fn from(err: DebateError) -> Self {
        let message = err.to_string();
        match err {
            DebateError::DocumentNotProcessed(_) | DebateError::DebateAlreadyStarted(_) => {
                AppError::Conflict(message)
            }
            DebateError::AgentNotFound(_) | DebateError::ResourceNotFound { .. } => {
                AppError::NotFound(message)
            }
            DebateError::InsufficientPermissions(msg) => AppError::Forbidden(msg),
            DebateError::Validation(msg) => AppError::Unprocessable(msg),
            DebateError::RateLimited { .. } => AppError::TooManyRequests(message),
            DebateError::Llm(_) => AppError::BadGateway(message),
            DebateError::Database(msg) => AppError::Database(msg),
            DebateError::DocumentProcessing(_) | DebateError::Config(_) | DebateError::Other(_) => {
                AppError::Internal(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenRejection;
    use debate_core::StoreError;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_debate_error_statuses() {
        assert_eq!(status_of(DebateError::not_found("Debate", 1)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(DebateError::AgentNotFound(5)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(DebateError::insufficient_permissions()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(DebateError::Validation("num_rounds must be positive".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(DebateError::RateLimited { limit: 10 }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(DebateError::DebateAlreadyStarted(2)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DebateError::DocumentNotProcessed(3)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DebateError::Llm("timeout".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(DebateError::DocumentProcessing("bad pdf".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_auth_error_statuses() {
        assert_eq!(status_of(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(AuthError::InvalidToken(TokenRejection::Expired)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AuthError::Unauthenticated("Not authenticated")),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AuthError::Forbidden("User inactive")),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(AuthError::DuplicateIdentity("Email already registered".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AuthError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_duplicate_store_identity_is_bad_request() {
        let err = AuthError::from(StoreError::DuplicateIdentity("Username already taken".into()));
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let err = AuthError::from(StoreError::Database("connection reset".into()));
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unauthorized_sets_www_authenticate() {
        let response = AppError::Unauthorized("Not authenticated".into()).into_response();
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );

        let response = AppError::Forbidden("User inactive".into()).into_response();
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_api_error_serialization() {
        let json = serde_json::to_value(ApiError::new("NOT_FOUND", "Agent 1 not found")).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Agent 1 not found");
        assert!(json.get("details").is_none());
    }
}

//! Security audit logging for authentication events
//!
//! Every event is logged at INFO level on the "audit" target, with the
//! event serialized as JSON so log shippers can route security events
//! separately from application logs.
//!
//! # Example
//!
//! ```ignore
//! use debate_api::audit::{audit_log, AuditEvent, RequestContext};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     user_id: user.id,
//!     email: user.email.clone(),
//!     context: RequestContext::from_headers(&headers),
//! });
//! ```

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Client details taken from request headers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Credentials accepted and tokens issued
    LoginSuccess {
        user_id: i64,
        email: String,
        #[serde(flatten)]
        context: RequestContext,
    },

    /// Credentials rejected
    LoginFailure {
        email: String,
        reason: String,
        #[serde(flatten)]
        context: RequestContext,
    },

    /// Refresh token exchanged for a new pair
    TokenRefresh {
        user_id: i64,
        #[serde(flatten)]
        context: RequestContext,
    },

    RegistrationSuccess {
        user_id: i64,
        email: String,
        #[serde(flatten)]
        context: RequestContext,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        #[serde(flatten)]
        context: RequestContext,
    },

    /// Token presented but not accepted
    InvalidToken {
        reason: String,
        #[serde(flatten)]
        context: RequestContext,
    },

    /// Identity resolved but not allowed
    AccessDenied {
        user_id: Option<i64>,
        reason: String,
        #[serde(flatten)]
        context: RequestContext,
    },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            Self::LoginSuccess { .. } => "Login successful",
            Self::LoginFailure { .. } => "Login failed",
            Self::TokenRefresh { .. } => "Token refresh",
            Self::RegistrationSuccess { .. } => "Registration successful",
            Self::RegistrationFailure { .. } => "Registration failed",
            Self::InvalidToken { .. } => "Invalid token",
            Self::AccessDenied { .. } => "Access denied",
        }
    }

    fn user_id(&self) -> Option<i64> {
        match self {
            Self::LoginSuccess { user_id, .. }
            | Self::TokenRefresh { user_id, .. }
            | Self::RegistrationSuccess { user_id, .. } => Some(*user_id),
            Self::AccessDenied { user_id, .. } => *user_id,
            _ => None,
        }
    }

    fn context(&self) -> &RequestContext {
        match self {
            Self::LoginSuccess { context, .. }
            | Self::LoginFailure { context, .. }
            | Self::TokenRefresh { context, .. }
            | Self::RegistrationSuccess { context, .. }
            | Self::RegistrationFailure { context, .. }
            | Self::InvalidToken { context, .. }
            | Self::AccessDenied { context, .. } => context,
        }
    }
}

/// Log a security audit event with structured fields
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %timestamp,
        event = %event_json,
        user_id = ?event.user_id(),
        ip_address = ?event.context().ip_address,
        "{}",
        event.summary()
    );
}

/// Client IP from X-Forwarded-For (first hop) or X-Real-IP
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|xff| xff.to_str().ok())
        .and_then(|xff| xff.split(',').next())
    {
        return Some(first_ip.trim().to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|s| s.to_string())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

//! Debate Core - settings, domain errors and the user store
//!
//! This crate defines the pieces shared by every debate platform service:
//! - Typed settings loaded once at startup
//! - Domain error kinds, mapped to transport statuses by the API layer
//! - The user record and the `UserStore` lookup trait

pub mod config;
pub mod user;

pub use config::{ConfigError, SecuritySettings, Settings};
pub use user::{InMemoryUserStore, NewUser, PgUserStore, StoreError, UserRecord, UserStore};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Domain error kinds for debate operations
#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Document {0} has not been processed yet")]
    DocumentNotProcessed(i64),

    #[error("Agent {0} not found")]
    AgentNotFound(i64),

    #[error("Debate {0} has already started")]
    DebateAlreadyStarted(i64),

    #[error("{0}")]
    InsufficientPermissions(String),

    #[error("{resource} with id {id} not found")]
    ResourceNotFound { resource: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded. Maximum {limit} requests per minute.")]
    RateLimited { limit: u32 },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Document processing failed: {0}")]
    DocumentProcessing(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DebateError {
    /// Not-found error for any resource kind
    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::ResourceNotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Permission error with the default message
    pub fn insufficient_permissions() -> Self {
        Self::InsufficientPermissions("Insufficient permissions".to_string())
    }
}

pub type Result<T> = std::result::Result<T, DebateError>;

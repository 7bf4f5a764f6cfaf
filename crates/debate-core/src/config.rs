//! Debate platform configuration
//!
//! Settings are read once at startup from environment variables or a TOML
//! file and then shared by reference. Defaults match a local development
//! setup; only `SECRET_KEY` has no default.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Application and HTTP server settings
    pub app: AppSettings,

    /// Database, cache and queue connections
    pub database: DatabaseSettings,

    /// Token signing and lifetimes
    pub security: SecuritySettings,

    /// LLM provider settings
    pub llm: LlmSettings,

    /// Per-tier request limits
    pub rate_limit: RateLimitSettings,

    /// Document upload and chunking
    pub documents: DocumentSettings,

    /// Debate agent execution
    pub agents: AgentSettings,
}

impl Settings {
    /// Load settings from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    ///
    /// `from_env` is this with `std::env::var`; tests pass a map instead of
    /// mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        settings.apply_lookup(&lookup)?;
        settings.require_secret("SECRET_KEY")?;
        Ok(settings)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let settings: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            message: e.to_string(),
        })?;

        settings.require_secret("security.secret_key")?;
        Ok(settings)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Merge with values from a key lookup, using the same keys as
    /// `from_lookup`. Keys the lookup does not know keep their current value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.apply_lookup(&lookup)?;
        self.require_secret("SECRET_KEY")?;
        Ok(self)
    }

    fn apply_lookup<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // App
        if let Some(name) = lookup("APP_NAME") {
            self.app.name = name;
        }
        if let Some(debug) = parse_var(lookup, "DEBUG")? {
            self.app.debug = debug;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.app.log_level = level;
        }
        if let Some(host) = lookup("API_HOST") {
            self.app.host = host;
        }
        if let Some(port) = parse_var(lookup, "API_PORT")? {
            self.app.port = port;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.app.allowed_origins = origins;
        }

        // Database
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(url) = lookup("DATABASE_URL_SYNC") {
            self.database.url_sync = url;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.database.redis_url = url;
        }
        if let Some(url) = lookup("CELERY_BROKER_URL") {
            self.database.celery_broker_url = Some(url);
        }
        if let Some(url) = lookup("CELERY_RESULT_BACKEND") {
            self.database.celery_result_backend = Some(url);
        }

        // Security
        if let Some(secret) = lookup("SECRET_KEY").filter(|s| !s.is_empty()) {
            self.security.secret_key = secret;
        }
        if let Some(algorithm) = lookup("ALGORITHM") {
            self.security.algorithm = algorithm;
        }
        if let Some(minutes) = parse_var(lookup, "ACCESS_TOKEN_EXPIRE_MINUTES")? {
            self.security.access_token_expire_minutes = minutes;
        }
        if let Some(days) = parse_var(lookup, "REFRESH_TOKEN_EXPIRE_DAYS")? {
            self.security.refresh_token_expire_days = days;
        }

        // LLM
        if let Some(key) = lookup("GROQ_API_KEY") {
            self.llm.groq_api_key = Some(key);
        }
        if let Some(model) = lookup("GROQ_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = lookup("GROQ_EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }

        // Rate limits
        if let Some(limit) = parse_var(lookup, "RATE_LIMIT_FREE_TIER")? {
            self.rate_limit.free_tier = limit;
        }
        if let Some(limit) = parse_var(lookup, "RATE_LIMIT_PREMIUM_TIER")? {
            self.rate_limit.premium_tier = limit;
        }
        if let Some(limit) = parse_var(lookup, "RATE_LIMIT_ADMIN_TIER")? {
            self.rate_limit.admin_tier = limit;
        }

        // Documents
        if let Some(size) = parse_var(lookup, "MAX_DOCUMENT_SIZE_MB")? {
            self.documents.max_size_mb = size;
        }
        if let Some(size) = parse_var(lookup, "CHUNK_SIZE")? {
            self.documents.chunk_size = size;
        }
        if let Some(overlap) = parse_var(lookup, "CHUNK_OVERLAP")? {
            self.documents.chunk_overlap = overlap;
        }

        // Agents
        if let Some(max) = parse_var(lookup, "MAX_CONCURRENT_AGENTS")? {
            self.agents.max_concurrent = max;
        }
        if let Some(secs) = parse_var(lookup, "AGENT_TIMEOUT_SECONDS")? {
            self.agents.timeout_secs = secs;
        }

        Ok(())
    }

    fn require_secret(&self, key: &str) -> Result<(), ConfigError> {
        if self.security.secret_key.is_empty() {
            return Err(ConfigError::MissingRequired(key.to_string()));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

/// Application and HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Display name reported by the health endpoint
    pub name: String,

    /// Debug mode
    pub debug: bool,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub log_level: String,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Comma-separated list of allowed CORS origins
    pub allowed_origins: String,
}

impl AppSettings {
    /// Allowed CORS origins as a trimmed list
    pub fn allowed_origins_list(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "AI Debate System".to_string(),
            debug: true,
            log_level: "INFO".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: "http://localhost:3000,http://localhost:8000".to_string(),
        }
    }
}

/// Database, cache and task queue connections
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Async PostgreSQL connection URL. Empty means the in-memory user store.
    pub url: String,

    /// Synchronous PostgreSQL URL (migrations, workers)
    pub url_sync: String,

    /// Redis URL
    pub redis_url: String,

    pub celery_broker_url: Option<String>,

    pub celery_result_backend: Option<String>,
}

/// Token signing settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// HMAC secret used to sign session tokens
    pub secret_key: String,

    /// JWS algorithm name (HS256, HS384, HS512)
    pub algorithm: String,

    /// Access token lifetime in minutes
    pub access_token_expire_minutes: i64,

    /// Refresh token lifetime in days
    pub refresh_token_expire_days: i64,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
        }
    }
}

// Keeps the secret out of logs.
impl std::fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecuritySettings")
            .field("secret_key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .field("refresh_token_expire_days", &self.refresh_token_expire_days)
            .finish()
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Groq API key
    pub groq_api_key: Option<String>,

    /// Completion model name
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            model: "llama-3.1-8b-instant".to_string(),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
        }
    }
}

/// Requests per minute by account tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub free_tier: u32,
    pub premium_tier: u32,
    pub admin_tier: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            free_tier: 10,
            premium_tier: 50,
            admin_tier: 1000,
        }
    }
}

/// Document upload and chunking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    /// Maximum upload size in megabytes
    pub max_size_mb: u64,

    /// Chunk size in characters
    pub chunk_size: usize,

    /// Chunk overlap in characters
    pub chunk_overlap: usize,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            max_size_mb: 10,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Debate agent execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Agents allowed to run at once
    pub max_concurrent: usize,

    /// Per-agent timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            timeout_secs: 120,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.app.name, "AI Debate System");
        assert_eq!(settings.security.algorithm, "HS256");
        assert_eq!(settings.security.access_token_expire_minutes, 30);
        assert_eq!(settings.security.refresh_token_expire_days, 7);
        assert_eq!(settings.documents.chunk_size, 1000);
        assert_eq!(settings.agents.max_concurrent, 5);
    }

    #[test]
    fn test_secret_key_is_required() {
        let result = Settings::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::MissingRequired(key)) if key == "SECRET_KEY"));

        let result = Settings::from_lookup(lookup_from(&[("SECRET_KEY", "")]));
        assert!(matches!(result, Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("SECRET_KEY", "s3cret"),
            ("ALGORITHM", "HS512"),
            ("ACCESS_TOKEN_EXPIRE_MINUTES", "15"),
            ("REFRESH_TOKEN_EXPIRE_DAYS", "30"),
            ("DEBUG", "false"),
            ("RATE_LIMIT_FREE_TIER", "20"),
            ("GROQ_API_KEY", "gsk_test"),
        ]))
        .unwrap();

        assert_eq!(settings.security.secret_key, "s3cret");
        assert_eq!(settings.security.algorithm, "HS512");
        assert_eq!(settings.security.access_token_expire_minutes, 15);
        assert_eq!(settings.security.refresh_token_expire_days, 30);
        assert!(!settings.app.debug);
        assert_eq!(settings.rate_limit.free_tier, 20);
        assert_eq!(settings.llm.groq_api_key.as_deref(), Some("gsk_test"));
    }

    #[test]
    fn test_invalid_numeric_value() {
        let result = Settings::from_lookup(lookup_from(&[
            ("SECRET_KEY", "s3cret"),
            ("ACCESS_TOKEN_EXPIRE_MINUTES", "soon"),
        ]));

        match result {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "ACCESS_TOKEN_EXPIRE_MINUTES");
                assert_eq!(value, "soon");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_allowed_origins_list() {
        let app = AppSettings {
            allowed_origins: " http://a.test , http://b.test,,".to_string(),
            ..Default::default()
        };
        assert_eq!(
            app.allowed_origins_list(),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn test_security_debug_redacts_secret() {
        let security = SecuritySettings {
            secret_key: "super-secret".to_string(),
            ..Default::default()
        };
        let rendered = format!("{security:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_file() {
        let file = write_config(
            r#"
            [app]
            name = "Debate Staging"
            port = 9000

            [security]
            secret_key = "from-file"
            access_token_expire_minutes = 5
        "#,
        );

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.app.name, "Debate Staging");
        assert_eq!(settings.app.port, 9000);
        assert_eq!(settings.security.secret_key, "from-file");
        assert_eq!(settings.security.access_token_expire_minutes, 5);
        assert_eq!(settings.security.refresh_token_expire_days, 7);
    }

    #[test]
    fn test_from_file_requires_secret() {
        let file = write_config("[app]\nport = 9000\n");

        let result = Settings::from_file(file.path());
        assert!(
            matches!(result, Err(ConfigError::MissingRequired(key)) if key == "security.secret_key")
        );
    }

    #[test]
    fn test_from_file_read_and_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Settings::from_file(&missing),
            Err(ConfigError::FileReadError { .. })
        ));

        let file = write_config("[security\nsecret_key = ");
        assert!(matches!(
            Settings::from_file(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_overrides_take_precedence_over_file() {
        let file = write_config(
            r#"
            [app]
            debug = true
            allowed_origins = "http://file.test"

            [security]
            secret_key = "from-file"
            access_token_expire_minutes = 5
        "#,
        );

        let settings = Settings::from_file(file.path())
            .unwrap()
            .with_overrides(lookup_from(&[
                ("ACCESS_TOKEN_EXPIRE_MINUTES", "45"),
                ("REFRESH_TOKEN_EXPIRE_DAYS", "14"),
                ("ALLOWED_ORIGINS", "http://env.test"),
                ("DEBUG", "false"),
                ("SECRET_KEY", ""),
            ]))
            .unwrap();

        assert_eq!(settings.security.access_token_expire_minutes, 45);
        assert_eq!(settings.security.refresh_token_expire_days, 14);
        assert_eq!(settings.app.allowed_origins, "http://env.test");
        assert!(!settings.app.debug);
        // An empty env secret does not clear the file's secret
        assert_eq!(settings.security.secret_key, "from-file");
    }

    #[test]
    fn test_overrides_keep_unset_keys_and_validate() {
        let base = Settings {
            security: SecuritySettings {
                secret_key: "base".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let settings = base.clone().with_overrides(lookup_from(&[])).unwrap();
        assert_eq!(settings.app.port, 8000);
        assert_eq!(settings.security.secret_key, "base");

        let result = base.with_overrides(lookup_from(&[("API_PORT", "eighty")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { key, .. }) if key == "API_PORT"));

        let result = Settings::default().with_overrides(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::MissingRequired(_))));
    }
}

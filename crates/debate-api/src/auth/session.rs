//! Access/refresh token issuance and refresh
//!
//! Access tokens live for minutes, refresh tokens for days. Refreshing
//! issues a brand-new pair but cannot retire the presented refresh token:
//! there is no deny-list, so it stays valid until its own `exp`.

use super::jwt::{Claims, JwtError, TokenCodec, TokenRejection, TokenType, RESERVED_CLAIMS};
use debate_core::SecuritySettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

/// Token pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Always "bearer"
    pub token_type: String,
}

impl TokenPair {
    fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Identity claims for a user id
pub fn identity_claims(user_id: i64) -> Map<String, Value> {
    let mut claims = Map::new();
    claims.insert("sub".to_string(), Value::from(user_id));
    claims
}

/// Builds and refreshes session tokens
#[derive(Debug, Clone)]
pub struct SessionIssuer {
    codec: TokenCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionIssuer {
    pub fn new(codec: TokenCodec, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            codec,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Create an issuer from the security settings
    ///
    /// Lifetimes must be positive and fit in seconds.
    pub fn from_settings(settings: &SecuritySettings) -> Result<Self, JwtError> {
        let codec = TokenCodec::from_settings(settings)?;

        let access_ttl = lifetime_secs(
            "access_token_expire_minutes",
            settings.access_token_expire_minutes,
            60,
        )?;
        let refresh_ttl = lifetime_secs(
            "refresh_token_expire_days",
            settings.refresh_token_expire_days,
            86_400,
        )?;

        Ok(Self::new(codec, access_ttl, refresh_ttl))
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Configured access token lifetime
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Configured refresh token lifetime
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an access token; `ttl` overrides the configured lifetime
    pub fn issue_access_token(
        &self,
        identity: Map<String, Value>,
        ttl: Option<Duration>,
    ) -> Result<String, JwtError> {
        self.issue(identity, TokenType::Access, ttl.unwrap_or(self.access_ttl))
    }

    /// Issue a refresh token; `ttl` overrides the configured lifetime
    pub fn issue_refresh_token(
        &self,
        identity: Map<String, Value>,
        ttl: Option<Duration>,
    ) -> Result<String, JwtError> {
        self.issue(identity, TokenType::Refresh, ttl.unwrap_or(self.refresh_ttl))
    }

    /// Issue an access/refresh pair with the configured lifetimes
    pub fn issue_pair(&self, identity: Map<String, Value>) -> Result<TokenPair, JwtError> {
        let access_token = self.issue_access_token(identity.clone(), None)?;
        let refresh_token = self.issue_refresh_token(identity, None)?;
        Ok(TokenPair::bearer(access_token, refresh_token))
    }

    /// Decode a token and require it to be a refresh token
    pub fn verify_refresh_token(&self, refresh_token: &str) -> Result<Claims, JwtError> {
        let claims = self.codec.decode(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::InvalidToken(TokenRejection::WrongType));
        }
        Ok(claims)
    }

    /// Exchange a refresh token for a new pair with the same identity
    pub fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, JwtError> {
        let claims = self.verify_refresh_token(refresh_token)?;
        self.issue_pair(claims.identity())
    }

    fn issue(
        &self,
        mut identity: Map<String, Value>,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<String, JwtError> {
        let sub = identity.remove("sub").and_then(subject_string);
        for reserved in RESERVED_CLAIMS {
            identity.remove(*reserved);
        }

        let now = self.codec.now();
        let exp = now.checked_add(ttl.as_secs()).ok_or_else(|| {
            JwtError::InvalidLifetime(format!("{}s from {now} overflows", ttl.as_secs()))
        })?;
        let claims = Claims {
            sub,
            exp,
            iat: now,
            jti: Uuid::new_v4().to_string(),
            token_type,
            extra: identity,
        };

        self.codec.encode(&claims)
    }
}

fn lifetime_secs(name: &str, value: i64, unit_secs: u64) -> Result<Duration, JwtError> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .and_then(|v| v.checked_mul(unit_secs))
        .map(Duration::from_secs)
        .ok_or_else(|| JwtError::InvalidLifetime(format!("{name} = {value}")))
}

/// The signing format wants a string subject; ids arrive as numbers
fn subject_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

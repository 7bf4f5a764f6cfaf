//! JWT session token encoding and validation
//!
//! Tokens are compact JWS strings signed with an HMAC algorithm (HS256 by
//! default). Every token carries a `type` claim so access and refresh
//! tokens can never be used in place of each other.

use super::clock::{Clock, SystemClock};
use debate_core::SecuritySettings;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Purpose of a session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claim names the issuer always sets itself
pub const RESERVED_CLAIMS: &[&str] = &["sub", "exp", "iat", "jti", "type"];

/// JWT claims carried by every session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the user id, always serialized as a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiration timestamp (Unix seconds)
    pub exp: u64,
    /// Issued at timestamp (Unix seconds)
    #[serde(default)]
    pub iat: u64,
    /// Unique token id
    #[serde(default)]
    pub jti: String,
    /// Access or refresh
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Caller-supplied claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Subject parsed back to the numeric user id
    pub fn user_id(&self) -> Option<i64> {
        self.sub.as_deref().and_then(|s| s.parse().ok())
    }

    /// Identity claims to carry into a re-issued token
    pub fn identity(&self) -> Map<String, Value> {
        let mut identity = self.extra.clone();
        if let Some(sub) = &self.sub {
            identity.insert("sub".to_string(), Value::String(sub.clone()));
        }
        identity
    }
}

/// Why a token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Malformed,
    Expired,
    BadSignature,
    AlgorithmMismatch,
    WrongType,
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed token"),
            Self::Expired => write!(f, "token has expired"),
            Self::BadSignature => write!(f, "invalid signature"),
            Self::AlgorithmMismatch => write!(f, "algorithm mismatch"),
            Self::WrongType => write!(f, "wrong token type"),
        }
    }
}

/// JWT errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token: {0}")]
    InvalidToken(TokenRejection),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signing secret must not be empty")]
    EmptySecret,

    #[error("Invalid token lifetime: {0}")]
    InvalidLifetime(String),
}

impl JwtError {
    /// The rejection reason, if this is a decode failure
    pub fn rejection(&self) -> Option<TokenRejection> {
        match self {
            Self::InvalidToken(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Parse an algorithm name, accepting only the HMAC family
pub fn parse_algorithm(name: &str) -> Result<Algorithm, JwtError> {
    match Algorithm::from_str(name.trim()) {
        Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => Ok(alg),
        _ => Err(JwtError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Signs and verifies session tokens with one secret/algorithm pair
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec using the system clock
    pub fn new(secret: &str, algorithm: Algorithm) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::EmptySecret);
        }
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(JwtError::UnsupportedAlgorithm(format!("{algorithm:?}")));
        }

        // Expiry is checked against our own clock in `decode`
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock: Arc::new(SystemClock),
        })
    }

    /// Create a codec from the security settings
    pub fn from_settings(settings: &SecuritySettings) -> Result<Self, JwtError> {
        let algorithm = parse_algorithm(&settings.algorithm)?;
        Self::new(&settings.secret_key, algorithm)
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Current time according to this codec's clock
    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }

    /// Sign claims into a compact token
    pub fn encode(&self, claims: &Claims) -> Result<String, JwtError> {
        let token = encode(&Header::new(self.algorithm), claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify a token's signature, algorithm and expiry and return its claims
    ///
    /// # Example
    ///
    /// ```no_run
    /// use debate_api::auth::jwt::{TokenCodec, parse_algorithm};
    ///
    /// let codec = TokenCodec::new("secret", parse_algorithm("HS256").unwrap()).unwrap();
    /// let claims = codec.decode("eyJhbGciOiJIUzI1NiIs...").expect("Invalid token");
    /// println!("sub={:?} type={}", claims.sub, claims.token_type);
    /// ```
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| {
                JwtError::InvalidToken(match e.kind() {
                    ErrorKind::InvalidSignature => TokenRejection::BadSignature,
                    ErrorKind::InvalidAlgorithm => TokenRejection::AlgorithmMismatch,
                    ErrorKind::ExpiredSignature => TokenRejection::Expired,
                    _ => TokenRejection::Malformed,
                })
            },
        )?;

        let claims = token_data.claims;
        if self.now() > claims.exp {
            return Err(JwtError::InvalidToken(TokenRejection::Expired));
        }

        Ok(claims)
    }
}

//! Authentication and session tokens
//!
//! - Password hashing with Argon2id
//! - Signed JWT encode/decode against an injectable clock
//! - Access/refresh token issuance
//! - Bearer-token authentication middleware
//! - Registration and login service

pub mod clock;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use jwt::{Claims, JwtError, TokenCodec, TokenRejection, TokenType};
pub use middleware::{auth_middleware, bearer_token, AuthError, Authenticator, CurrentUser};
pub use password::{hash_password, verify_password, PasswordConfig, PasswordError};
pub use service::{AuthService, LoginForm, RefreshRequest, RegisterRequest, Session, UserPublic};
pub use session::{identity_claims, SessionIssuer, TokenPair};

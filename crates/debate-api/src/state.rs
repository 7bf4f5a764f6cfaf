//! Application state management

use crate::auth::{AuthService, Authenticator, JwtError, SessionIssuer};
use debate_core::{Settings, UserStore};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub settings: Arc<Settings>,
    /// Registration, login and refresh
    pub auth: AuthService,
    /// Bearer-token resolution for protected routes
    pub authenticator: Authenticator,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Build state from settings and a user store
    pub fn new(settings: Settings, users: Arc<dyn UserStore>) -> Result<Self, JwtError> {
        let issuer = SessionIssuer::from_settings(&settings.security)?;
        Ok(Self::with_issuer(settings, issuer, users))
    }

    /// Build state around an existing issuer (e.g. one with a manual clock)
    pub fn with_issuer(
        settings: Settings,
        issuer: SessionIssuer,
        users: Arc<dyn UserStore>,
    ) -> Self {
        let authenticator = Authenticator::new(issuer.codec().clone(), users.clone());
        Self {
            settings: Arc::new(settings),
            auth: AuthService::new(issuer, users),
            authenticator,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

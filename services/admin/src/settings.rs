//! Service settings
//!
//! Loaded with the `config` crate from built-in defaults overridden by
//! `AURORA_*` environment variables, e.g. `AURORA_SESSION_TTL_SECONDS=3600`.

use chrono::TimeDelta;
use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::rate_limiter::RateLimiterConfig;

/// Longest accepted session lifetime, one year
pub const MAX_SESSION_TTL_SECONDS: u64 = 366 * 24 * 60 * 60;
/// Longest accepted reset token lifetime, one week
pub const MAX_RESET_TOKEN_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Tunables of the admin core
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Public product name used in outgoing mail
    pub app_name: String,
    /// Base URL of the admin UI, used to build reset links
    pub app_url: String,
    /// Fixed lifetime of a login session
    pub session_ttl_seconds: u64,
    /// Lifetime of a password reset token
    pub reset_token_ttl_minutes: u64,
    pub audit_default_limit: u32,
    pub audit_max_limit: u32,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_max_tokens: usize,
    /// Six-field cron expression for the expiry sweeps
    pub sweep_schedule: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Aurora Nova".to_string(),
            app_url: "http://localhost:3000".to_string(),
            session_ttl_seconds: 30 * 24 * 60 * 60,
            reset_token_ttl_minutes: 30,
            audit_default_limit: 50,
            audit_max_limit: 500,
            rate_limit_max_requests: 10,
            rate_limit_window_seconds: 60,
            rate_limit_max_tokens: 500,
            sweep_schedule: "0 */15 * * * *".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from defaults and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        Config::builder()
            .set_default("app_name", defaults.app_name)?
            .set_default("app_url", defaults.app_url)?
            .set_default("session_ttl_seconds", defaults.session_ttl_seconds)?
            .set_default("reset_token_ttl_minutes", defaults.reset_token_ttl_minutes)?
            .set_default("audit_default_limit", defaults.audit_default_limit)?
            .set_default("audit_max_limit", defaults.audit_max_limit)?
            .set_default("rate_limit_max_requests", defaults.rate_limit_max_requests)?
            .set_default("rate_limit_window_seconds", defaults.rate_limit_window_seconds)?
            .set_default("rate_limit_max_tokens", defaults.rate_limit_max_tokens as u64)?
            .set_default("sweep_schedule", defaults.sweep_schedule)?
            .add_source(Environment::with_prefix("AURORA").try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()?
            .validated()
    }

    /// Reject values the services cannot run with
    pub fn validated(self) -> Result<Self, ConfigError> {
        if !(1..=MAX_SESSION_TTL_SECONDS).contains(&self.session_ttl_seconds) {
            return Err(ConfigError::Message(format!(
                "session_ttl_seconds must be between 1 and {}",
                MAX_SESSION_TTL_SECONDS
            )));
        }
        if !(1..=MAX_RESET_TOKEN_TTL_MINUTES).contains(&self.reset_token_ttl_minutes) {
            return Err(ConfigError::Message(format!(
                "reset_token_ttl_minutes must be between 1 and {}",
                MAX_RESET_TOKEN_TTL_MINUTES
            )));
        }
        if self.audit_max_limit < 1 {
            return Err(ConfigError::Message(
                "audit_max_limit must be at least 1".to_string(),
            ));
        }
        if !(1..=self.audit_max_limit).contains(&self.audit_default_limit) {
            return Err(ConfigError::Message(
                "audit_default_limit must be between 1 and audit_max_limit".to_string(),
            ));
        }
        Ok(self)
    }

    /// Session lifetime, capped at [`MAX_SESSION_TTL_SECONDS`]
    pub fn session_ttl(&self) -> TimeDelta {
        session_ttl(self.session_ttl_seconds)
    }

    /// Reset token lifetime, capped at [`MAX_RESET_TOKEN_TTL_MINUTES`]
    pub fn reset_token_ttl(&self) -> TimeDelta {
        let minutes = self.reset_token_ttl_minutes.min(MAX_RESET_TOKEN_TTL_MINUTES) as i64;
        TimeDelta::try_minutes(minutes).unwrap_or(TimeDelta::zero())
    }

    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_requests: self.rate_limit_max_requests,
            window_seconds: self.rate_limit_window_seconds,
            max_tokens: self.rate_limit_max_tokens,
        }
    }
}

pub(crate) fn session_ttl(seconds: u64) -> TimeDelta {
    let seconds = seconds.min(MAX_SESSION_TTL_SECONDS) as i64;
    TimeDelta::try_seconds(seconds).unwrap_or(TimeDelta::zero())
}

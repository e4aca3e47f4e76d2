//! # Server Configuration
//!
//! Runtime settings read from the environment (a `.env` file is loaded by
//! `main` before this runs).
//!
//! - `RANKTRAIL_CORS_ORIGINS`: comma-separated origins, or "*" for all (default: localhost only)
//! - `RANKTRAIL_RATE_LIMIT`: requests per second (default: 100, 0 to disable)
//! - `RANKTRAIL_SESSION_TTL_SECS`: login session lifetime (default: 7 days)
//! - `RANKTRAIL_SECURE_COOKIES`: add `Secure` to the session cookie (default: true)

use chrono::TimeDelta;
use ranktrail_core::primitives::DEFAULT_SESSION_TTL_SECS;

/// Default rate limit in requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Settings for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Raw `RANKTRAIL_CORS_ORIGINS` value; `None` means localhost only.
    pub cors_origins: Option<String>,
    /// Requests per second across all clients; 0 disables limiting.
    pub rate_limit: u32,
    pub session_ttl: TimeDelta,
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_origins: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            session_ttl: TimeDelta::seconds(DEFAULT_SESSION_TTL_SECS),
            secure_cookies: true,
        }
    }
}

impl ServerConfig {
    /// Read the configuration from `RANKTRAIL_*` environment variables.
    ///
    /// Unparseable values fall back to their defaults with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cors_origins: std::env::var("RANKTRAIL_CORS_ORIGINS")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            rate_limit: parse_env("RANKTRAIL_RATE_LIMIT").unwrap_or(defaults.rate_limit),
            session_ttl: parse_env::<i64>("RANKTRAIL_SESSION_TTL_SECS")
                .filter(|secs| *secs > 0)
                .map(TimeDelta::seconds)
                .unwrap_or(defaults.session_ttl),
            secure_cookies: std::env::var("RANKTRAIL_SECURE_COOKIES")
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.secure_cookies),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}: {:?}", key, raw);
            None
        }
    }
}

/// Anything other than an explicit "off" value counts as enabled.
fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.rate_limit, 100);
        assert_eq!(config.session_ttl, TimeDelta::days(7));
        assert!(config.secure_cookies);
        assert!(config.cors_origins.is_none());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(" OFF "));
        assert!(!parse_flag("0"));
    }
}

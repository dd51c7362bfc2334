use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default Pulse API endpoint.
pub const DEFAULT_API_URL: &str = "https://webpulse.social/api";

/// Language translations are requested in when nothing else is configured.
pub const DEFAULT_TARGET_LANG: &str = "en";

/// How long a mutation may stay pending before the UI offers a retry.
pub const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 10;

/// HTTP timeout for a single API call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Central configuration loaded from environment variables.
///
/// The bearer token comes from the environment (never hardcoded). The .env
/// file is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Pulse REST API (no trailing slash).
    pub api_url: String,
    /// Bearer credential issued by the auth service. Read-only commands
    /// work without one; every mutation needs it.
    pub token: Option<String>,
    /// Target language for post translations.
    pub target_lang: String,
    /// Pending mutations older than this are discarded and rolled back.
    pub pending_timeout: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything except the token has a default.
    pub fn load() -> Result<Self> {
        let pending_timeout = secs_var("PULSE_PENDING_TIMEOUT_SECS", DEFAULT_PENDING_TIMEOUT_SECS)?;
        let request_timeout = secs_var("PULSE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        Ok(Self {
            api_url: env::var("PULSE_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            token: env::var("PULSE_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            target_lang: env::var("PULSE_TARGET_LANG")
                .ok()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TARGET_LANG.to_string()),
            pending_timeout,
            request_timeout,
        })
    }

    /// Check that a bearer token is configured.
    /// Call this before any command that mutates server state.
    pub fn require_token(&self) -> Result<()> {
        if self.token.is_none() {
            anyhow::bail!(
                "PULSE_TOKEN not set. This operation requires authentication.\n\
                 Add it to your .env file. See .env.example for details."
            );
        }
        Ok(())
    }
}

fn secs_var(name: &str, default: u64) -> Result<Duration> {
    match env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{name} must be a whole number of seconds, got {raw:?}"))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_token_rejects_missing_token() {
        let config = Config {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            target_lang: "en".to_string(),
            pending_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
        };
        let err = config.require_token().unwrap_err();
        assert!(err.to_string().contains("PULSE_TOKEN"));
    }

    #[test]
    fn require_token_accepts_present_token() {
        let config = Config {
            api_url: DEFAULT_API_URL.to_string(),
            token: Some("abc".to_string()),
            target_lang: "en".to_string(),
            pending_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
        };
        assert!(config.require_token().is_ok());
    }

    #[test]
    fn secs_var_falls_back_to_default_when_unset() {
        let d = secs_var("PULSE_TEST_UNSET_VARIABLE_FOR_DEFAULTS", 7).unwrap();
        assert_eq!(d, Duration::from_secs(7));
    }
}

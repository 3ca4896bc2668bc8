//! Client configuration.
//!
//! `EngineConfig` tunes the sync engine's timing; `RemoteConfig` locates the
//! Supabase project that backs the remote store.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_RETRY_INTERVAL_SECS: u64 = 10;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 8;
const REST_PATH: &str = "/rest/v1";

/// Timing knobs shared by the vote coordinator, edit queue and name resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Interval between background retries of pending edits (default: 10 seconds)
    pub retry_interval: Duration,
    /// Upper bound on every remote call (default: 8 seconds)
    pub remote_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Set the background retry interval
    #[must_use]
    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the per-call remote timeout
    #[must_use]
    pub const fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }
}

/// Location and credentials of the Supabase project.
///
/// Only public values belong here: the anon key and, optionally, a user
/// access token obtained elsewhere.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// PostgREST base URL, always ending in `/rest/v1`
    pub rest_url: String,
    pub anon_key: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("rest_url", &self.rest_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl RemoteConfig {
    pub fn new(url: &str, anon_key: impl Into<String>) -> Result<Self> {
        let rest_url = normalize_rest_url(url)?;
        let anon_key = normalize_text_option(Some(anon_key.into()))
            .ok_or_else(|| Error::Config("Supabase anon key must not be empty".to_string()))?;
        Ok(Self {
            rest_url,
            anon_key,
            access_token: None,
        })
    }

    /// Attach a user access token; blank tokens are ignored
    #[must_use]
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = normalize_text_option(token);
        self
    }

    /// Token sent as the bearer credential: the user token when present,
    /// otherwise the anon key.
    pub fn bearer_token(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    /// Build a config from optional parts.
    ///
    /// Returns `Ok(None)` when neither URL nor key is set and an error when
    /// only one of them is.
    pub fn resolve_optional(url: Option<String>, anon_key: Option<String>) -> Result<Option<Self>> {
        match (normalize_text_option(url), normalize_text_option(anon_key)) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) => Self::new(&url, anon_key).map(Some),
            (Some(_), None) => Err(Error::Config(
                "Supabase URL is set but the anon key is missing".to_string(),
            )),
            (None, Some(_)) => Err(Error::Config(
                "Supabase anon key is set but the URL is missing".to_string(),
            )),
        }
    }
}

/// Normalize a Supabase project URL into its PostgREST base URL
pub fn normalize_rest_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("Supabase URL must not be empty".to_string()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::Config(
            "Supabase URL must include http:// or https://".to_string(),
        ));
    }
    if trimmed.ends_with(REST_PATH) {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}{REST_PATH}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults_match_reference_timing() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_interval, Duration::from_secs(10));
        assert_eq!(config.remote_timeout, Duration::from_secs(8));
    }

    #[test]
    fn engine_builders_override_defaults() {
        let config = EngineConfig::default()
            .with_retry_interval(Duration::from_secs(2))
            .with_remote_timeout(Duration::from_millis(500));
        assert_eq!(config.retry_interval, Duration::from_secs(2));
        assert_eq!(config.remote_timeout, Duration::from_millis(500));
    }

    #[test]
    fn normalize_rest_url_appends_rest_path() {
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/rest/v1").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
    }

    #[test]
    fn normalize_rest_url_rejects_missing_scheme() {
        let error = normalize_rest_url("demo.supabase.co").unwrap_err();
        assert!(error.to_string().contains("http:// or https://"));
        assert!(normalize_rest_url("  ").is_err());
    }

    #[test]
    fn resolve_optional_requires_both_parts() {
        assert!(RemoteConfig::resolve_optional(None, None).unwrap().is_none());
        assert!(
            RemoteConfig::resolve_optional(Some("https://demo.supabase.co".to_string()), None)
                .is_err()
        );
        let config = RemoteConfig::resolve_optional(
            Some("https://demo.supabase.co".to_string()),
            Some(" anon ".to_string()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(config.anon_key, "anon");
    }

    #[test]
    fn bearer_token_prefers_access_token() {
        let config = RemoteConfig::new("https://demo.supabase.co", "anon").unwrap();
        assert_eq!(config.bearer_token(), "anon");
        let config = config.with_access_token(Some("user-token".to_string()));
        assert_eq!(config.bearer_token(), "user-token");
    }

    #[test]
    fn debug_redacts_credentials() {
        let config = RemoteConfig::new("https://demo.supabase.co", "secret-anon")
            .unwrap()
            .with_access_token(Some("secret-token".to_string()));
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-anon"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}

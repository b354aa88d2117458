//! API Configuration Module
//!
//! Listener address, principal header, CORS and list timeout settings.
//! Configuration is loaded from environment variables with defaults suited
//! to running behind a proxy that authenticates callers.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Header carrying the authenticated principal unless overridden.
pub const DEFAULT_PRINCIPAL_HEADER: &str = "x-remote-user";

const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;
const DEFAULT_INITIAL_SYNC_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    // ========================================================================
    // Listener
    // ========================================================================
    pub bind_host: String,
    pub port: u16,

    // ========================================================================
    // Authentication
    // ========================================================================
    /// Header set by the fronting proxy with the caller's username.
    /// Stored lowercase.
    pub principal_header: String,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Upstream
    // ========================================================================
    /// Upper bound on a list-as-user call. `None` waits indefinitely.
    pub list_timeout: Option<Duration>,

    /// How long startup waits for the mirror cache before serving anyway.
    /// Reads answer 503 until the cache syncs.
    pub initial_sync_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            principal_header: DEFAULT_PRINCIPAL_HEADER.to_string(),
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            list_timeout: None,
            initial_sync_timeout: Duration::from_millis(DEFAULT_INITIAL_SYNC_TIMEOUT_MS),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `WORKSPACES_API_BIND`: listen host (default: 0.0.0.0)
    /// - `PORT` or `WORKSPACES_API_PORT`: listen port (default: 3000)
    /// - `WORKSPACES_PRINCIPAL_HEADER`: trusted principal header (default: X-Remote-User)
    /// - `WORKSPACES_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `WORKSPACES_CORS_MAX_AGE_SECS`: preflight cache duration (default: 86400)
    /// - `WORKSPACES_LIST_TIMEOUT_MS`: list-as-user deadline, 0 disables (default: none)
    /// - `WORKSPACES_INITIAL_SYNC_TIMEOUT_MS`: startup wait for the cache (default: 30000)
    ///
    /// Fails only on a port that is set but unparseable; other malformed
    /// values fall back to their defaults.
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_host = lookup("WORKSPACES_API_BIND")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.bind_host);

        let port = match lookup("PORT").or_else(|| lookup("WORKSPACES_API_PORT")) {
            Some(value) => value.trim().parse::<u16>().map_err(|_| {
                ApiError::invalid_input(format!("Invalid port value: {}", value))
            })?,
            None => defaults.port,
        };

        let principal_header = lookup("WORKSPACES_PRINCIPAL_HEADER")
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.principal_header);

        let cors_origins = lookup("WORKSPACES_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = lookup("WORKSPACES_CORS_MAX_AGE_SECS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let list_timeout = lookup("WORKSPACES_LIST_TIMEOUT_MS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let initial_sync_timeout = lookup("WORKSPACES_INITIAL_SYNC_TIMEOUT_MS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_sync_timeout);

        Ok(Self {
            bind_host,
            port,
            principal_header,
            cors_origins,
            cors_max_age_secs,
            list_timeout,
            initial_sync_timeout,
        })
    }

    /// Socket address the server listens on.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.principal_header, "x-remote-user");
        assert!(config.cors_origins.is_empty());
        assert!(config.list_timeout.is_none());
    }

    #[test]
    fn test_empty_environment_yields_defaults() {
        let config = ApiConfig::from_lookup(lookup_from(&[])).expect("config should load");
        assert_eq!(config, ApiConfig::default());
    }

    #[test]
    fn test_port_prefers_platform_variable() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("WORKSPACES_API_PORT", "9090"),
        ]))
        .expect("config should load");
        assert_eq!(config.port, 8080);

        let config = ApiConfig::from_lookup(lookup_from(&[("WORKSPACES_API_PORT", "9090")]))
            .expect("config should load");
        assert_eq!(config.port, 9090);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = ApiConfig::from_lookup(lookup_from(&[("PORT", "http")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            ("WORKSPACES_PRINCIPAL_HEADER", "X-Forwarded-User"),
            ("WORKSPACES_CORS_ORIGINS", "https://a.example, ,https://b.example"),
            ("WORKSPACES_LIST_TIMEOUT_MS", "2500"),
            ("WORKSPACES_INITIAL_SYNC_TIMEOUT_MS", "500"),
        ]))
        .expect("config should load");

        assert_eq!(config.principal_header, "x-forwarded-user");
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.list_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.initial_sync_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_zero_list_timeout_disables_deadline() {
        let config = ApiConfig::from_lookup(lookup_from(&[("WORKSPACES_LIST_TIMEOUT_MS", "0")]))
            .expect("config should load");
        assert!(config.list_timeout.is_none());
    }

    #[test]
    fn test_bind_addr() {
        let config = ApiConfig::default();
        let addr = config.bind_addr().expect("default address should parse");
        assert_eq!(addr.port(), 3000);

        let config = ApiConfig {
            bind_host: "not a host".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.bind_addr().is_err());
    }
}

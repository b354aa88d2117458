//! Configuration types

use crate::{ConfigError, WorkspacesError, WorkspacesResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_WORKSPACES_NAMESPACE: &str = "workspaces-system";
pub const DEFAULT_KUBESAW_NAMESPACE: &str = "toolchain-host-operator";
pub const DEFAULT_WATCH_CAPACITY: usize = 1024;
pub const DEFAULT_RECONCILE_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RECONCILE_INITIAL_BACKOFF_MS: u64 = 100;
pub const DEFAULT_RECONCILE_MAX_BACKOFF_MS: u64 = 10_000;

// ============================================================================
// RETRY POLICY
// ============================================================================

/// Exponential backoff applied to transient reconcile failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RECONCILE_MAX_RETRIES,
            initial_backoff: Duration::from_millis(DEFAULT_RECONCILE_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_RECONCILE_MAX_BACKOFF_MS),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based), capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = f64::from(self.backoff_multiplier).powi(attempt.min(32) as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn validate(&self) -> WorkspacesResult<()> {
        if self.backoff_multiplier < 1.0 {
            return Err(WorkspacesError::Config(ConfigError::InvalidValue {
                field: "backoff_multiplier".to_string(),
                value: self.backoff_multiplier.to_string(),
                reason: "backoff_multiplier must be at least 1.0".to_string(),
            }));
        }

        if self.initial_backoff > self.max_backoff {
            return Err(WorkspacesError::Config(ConfigError::InvalidValue {
                field: "initial_backoff".to_string(),
                value: format!("{:?}", self.initial_backoff),
                reason: "initial_backoff must not exceed max_backoff".to_string(),
            }));
        }

        Ok(())
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Namespaces and tuning shared by the cache, the list engine and the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspacesConfig {
    /// Namespace holding internal workspaces.
    pub workspaces_namespace: String,
    /// Namespace holding access grants.
    pub kubesaw_namespace: String,
    /// Buffered events per watch subscriber before it lags and relists.
    pub watch_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for WorkspacesConfig {
    fn default() -> Self {
        Self {
            workspaces_namespace: DEFAULT_WORKSPACES_NAMESPACE.to_string(),
            kubesaw_namespace: DEFAULT_KUBESAW_NAMESPACE.to_string(),
            watch_capacity: DEFAULT_WATCH_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkspacesConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `WORKSPACES_NAMESPACE`: internal workspace namespace (default: workspaces-system)
    /// - `WORKSPACES_KUBESAW_NAMESPACE`: access grant namespace (default: toolchain-host-operator)
    /// - `WORKSPACES_WATCH_CAPACITY`: per-subscriber event buffer (default: 1024)
    /// - `WORKSPACES_RECONCILE_MAX_RETRIES`: transient retries per request (default: 5)
    /// - `WORKSPACES_RECONCILE_INITIAL_BACKOFF_MS`: first retry delay (default: 100)
    /// - `WORKSPACES_RECONCILE_MAX_BACKOFF_MS`: retry delay cap (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            workspaces_namespace: std::env::var("WORKSPACES_NAMESPACE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.workspaces_namespace),
            kubesaw_namespace: std::env::var("WORKSPACES_KUBESAW_NAMESPACE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.kubesaw_namespace),
            watch_capacity: std::env::var("WORKSPACES_WATCH_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.watch_capacity),
            retry: RetryPolicy {
                max_retries: std::env::var("WORKSPACES_RECONCILE_MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_retries),
                initial_backoff: Duration::from_millis(
                    std::env::var("WORKSPACES_RECONCILE_INITIAL_BACKOFF_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(DEFAULT_RECONCILE_INITIAL_BACKOFF_MS),
                ),
                max_backoff: Duration::from_millis(
                    std::env::var("WORKSPACES_RECONCILE_MAX_BACKOFF_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(DEFAULT_RECONCILE_MAX_BACKOFF_MS),
                ),
                backoff_multiplier: defaults.retry.backoff_multiplier,
            },
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> WorkspacesResult<()> {
        if self.workspaces_namespace.is_empty() {
            return Err(WorkspacesError::Config(ConfigError::InvalidValue {
                field: "workspaces_namespace".to_string(),
                value: String::new(),
                reason: "namespace must not be empty".to_string(),
            }));
        }

        if self.kubesaw_namespace.is_empty() {
            return Err(WorkspacesError::Config(ConfigError::InvalidValue {
                field: "kubesaw_namespace".to_string(),
                value: String::new(),
                reason: "namespace must not be empty".to_string(),
            }));
        }

        if self.watch_capacity == 0 {
            return Err(WorkspacesError::Config(ConfigError::InvalidValue {
                field: "watch_capacity".to_string(),
                value: "0".to_string(),
                reason: "watch_capacity must be greater than 0".to_string(),
            }));
        }

        self.retry.validate()
    }
}

// =============================================================================
// TESTS
// =============================================================================

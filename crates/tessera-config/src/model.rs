// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tessera consumer service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Tessera configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TesseraConfig {
    /// Consumer service behavior.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Known datasources, keyed by datasource name.
    #[serde(default)]
    pub datasources: BTreeMap<String, DataSourceConfig>,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// What to do when a second consumer claims an already registered type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Register the newcomer and destroy the displaced consumer.
    #[default]
    Replace,
    /// Keep the registered consumer and refuse the newcomer.
    Reject,
}

/// Consumer service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Master switch. When false the service activates but never starts.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Open a fresh connection per operation instead of sharing one.
    #[serde(default)]
    pub use_pseudo_pool: bool,

    /// Name of the datasource the persistence manager binds to.
    #[serde(default = "default_data_source_name")]
    pub data_source_name: String,

    /// Name under which the service identifies itself.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Seconds between attempts to construct the persistence manager.
    #[serde(default = "default_start_poll_secs")]
    pub start_poll_secs: u64,

    /// Milliseconds between connection pool readiness checks.
    #[serde(default = "default_post_init_poll_ms")]
    pub post_init_poll_ms: u64,

    /// Maximum depth of a cascading delete.
    #[serde(default = "default_max_cascade_depth")]
    pub max_cascade_depth: usize,

    /// Handling of duplicate consumer registrations.
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Lifetime of cached authorization decisions. `0` (the default) disables the cache.
    #[serde(default = "default_decision_cache_ttl_secs")]
    pub decision_cache_ttl_secs: u64,
}

impl ServiceConfig {
    /// At least one second, even for a config that skipped validation.
    pub fn start_poll_interval(&self) -> Duration {
        Duration::from_secs(self.start_poll_secs.max(1))
    }

    /// At least one millisecond.
    pub fn post_init_poll_interval(&self) -> Duration {
        Duration::from_millis(self.post_init_poll_ms.max(1))
    }

    /// `None` when the decision cache is disabled.
    pub fn decision_cache_ttl(&self) -> Option<Duration> {
        (self.decision_cache_ttl_secs > 0).then(|| Duration::from_secs(self.decision_cache_ttl_secs))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            use_pseudo_pool: false,
            data_source_name: default_data_source_name(),
            service_name: default_service_name(),
            start_poll_secs: default_start_poll_secs(),
            post_init_poll_ms: default_post_init_poll_ms(),
            max_cascade_depth: default_max_cascade_depth(),
            duplicate_policy: DuplicatePolicy::default(),
            decision_cache_ttl_secs: default_decision_cache_ttl_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_data_source_name() -> String {
    "db_sop".to_string()
}

fn default_service_name() -> String {
    "common".to_string()
}

fn default_start_poll_secs() -> u64 {
    10
}

fn default_post_init_poll_ms() -> u64 {
    250
}

fn default_max_cascade_depth() -> usize {
    64
}

fn default_decision_cache_ttl_secs() -> u64 {
    0
}

/// A SQLite-backed datasource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceConfig {
    /// Path to the SQLite database file.
    pub path: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

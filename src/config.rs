//! Configuration loading and validation.
//!
//! All tunables live in an optional `backlog.toml` at the store root;
//! a missing file means defaults. Section structs live next to the
//! components they configure and are aggregated here.
//!
//! ```toml
//! cache_ttl_secs = 5
//! test_command = "cargo test --quiet"
//!
//! [monitor]
//! stuck_hours = 2.0
//! stale_days = 3.0
//!
//! [remediation]
//! max_auto_fixes = 10
//! confidence_threshold = 0.7
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::health::monitor::MonitorThresholds;
use crate::remediation::RemediationConfig;

/// File name looked up under the store root.
pub const CONFIG_FILE: &str = "backlog.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklogConfig {
    /// Read-cache time-to-live in seconds (0 disables caching)
    pub cache_ttl_secs: u64,
    /// Shell command for the best-effort test signal
    pub test_command: Option<String>,
    pub monitor: MonitorThresholds,
    pub remediation: RemediationConfig,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 5,
            test_command: None,
            monitor: MonitorThresholds::default(),
            remediation: RemediationConfig::default(),
        }
    }
}

impl BacklogConfig {
    /// Load configuration from `<root>/backlog.toml`, falling back to
    /// defaults when the file is absent.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(CONFIG_FILE);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = toml::from_str(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// The read-cache TTL as a [`Duration`].
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn with_test_command(mut self, command: impl Into<String>) -> Self {
        self.test_command = Some(command.into());
        self
    }

    #[must_use]
    pub fn with_monitor(mut self, monitor: MonitorThresholds) -> Self {
        self.monitor = monitor;
        self
    }

    #[must_use]
    pub fn with_remediation(mut self, remediation: RemediationConfig) -> Self {
        self.remediation = remediation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BacklogConfig::default();
        assert_eq!(config.cache_ttl_secs, 5);
        assert_eq!(config.cache_ttl(), Duration::from_secs(5));
        assert!(config.test_command.is_none());
        assert_eq!(config.monitor.stuck_hours, 2.0);
        assert_eq!(config.remediation.max_auto_fixes, 10);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = BacklogConfig::load(dir.path()).unwrap();
        assert_eq!(config, BacklogConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_some_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
cache_ttl_secs = 30
test_command = "cargo test --quiet"

[monitor]
stuck_hours = 6.0

[remediation]
confidence_threshold = 0.9
"#,
        )
        .unwrap();

        let config = BacklogConfig::load(dir.path()).unwrap();
        assert_eq!(config.cache_ttl_secs, 30);
        assert_eq!(config.test_command.as_deref(), Some("cargo test --quiet"));
        assert_eq!(config.monitor.stuck_hours, 6.0);
        // Untouched sections keep their defaults.
        assert_eq!(config.monitor.stale_days, 3.0);
        assert_eq!(config.remediation.confidence_threshold, 0.9);
        assert_eq!(config.remediation.max_auto_fixes, 10);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "cache_ttl_secs = \"soon\"").unwrap();
        assert!(BacklogConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_builders() {
        let config = BacklogConfig::default()
            .with_cache_ttl_secs(0)
            .with_test_command("make test");
        assert_eq!(config.cache_ttl(), Duration::ZERO);
        assert_eq!(config.test_command.as_deref(), Some("make test"));
    }
}

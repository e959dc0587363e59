//! Configuration management for Hostpace.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{HostpaceError, Result};

/// Prefix of environment variables that override file settings,
/// e.g. `HOSTPACE__LOGGING__LEVEL=debug`.
const ENV_PREFIX: &str = "HOSTPACE";

/// Main configuration for the Hostpace throttle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostpaceConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to the rate limit rules file
    #[serde(default)]
    pub rules_path: Option<String>,

    /// Rules reload interval in seconds, 0 to disable
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            reload_interval_secs: default_reload_interval(),
        }
    }
}

impl RateLimitingConfig {
    /// The reload interval, or `None` if reloading is disabled.
    pub fn reload_interval(&self) -> Option<Duration> {
        match self.reload_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn default_reload_interval() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl HostpaceConfig {
    /// Load configuration from an optional YAML file, with `HOSTPACE__*`
    /// environment variables layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| HostpaceError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = HostpaceConfig::default();

        assert_eq!(config.rate_limiting.rules_path, None);
        assert_eq!(
            config.rate_limiting.reload_interval(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "rate_limiting:\n  rules_path: /etc/hostpace/rules.yaml\n  reload_interval_secs: 0"
        )
        .unwrap();

        let config = HostpaceConfig::load(Some(file.path())).unwrap();

        assert_eq!(
            config.rate_limiting.rules_path.as_deref(),
            Some("/etc/hostpace/rules.yaml")
        );
        assert_eq!(config.rate_limiting.reload_interval(), None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  level: debug\n  json: true").unwrap();

        let config = HostpaceConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.rate_limiting.reload_interval_secs, 60);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = HostpaceConfig::load(Some(Path::new("/nonexistent/hostpace.yaml")));
        assert!(matches!(result, Err(HostpaceError::Config(_))));
    }
}

//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `ruleflow.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use serde::Deserialize;

use ruleflow_app::runtime::RuntimeSettings;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Background scheduler settings.
    pub scheduler: SchedulerConfig,
    /// In-memory history sizes.
    pub history: HistoryConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run schedule-triggered rules in the background.
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Emitted events kept in memory.
    pub event_capacity: usize,
    /// Execution results kept per rule.
    pub execution_capacity: usize,
}

impl Config {
    /// Load configuration from `ruleflow.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("ruleflow.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("RULEFLOW_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("RULEFLOW_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RULEFLOW_SCHEDULER_ENABLED") {
            match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.scheduler.enabled = true,
                "0" | "false" | "no" | "off" => self.scheduler.enabled = false,
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.history.event_capacity == 0 {
            return Err(ConfigError::Validation(
                "history.event_capacity must be non-zero".to_string(),
            ));
        }
        if self.history.execution_capacity == 0 {
            return Err(ConfigError::Validation(
                "history.execution_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    #[must_use]
    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            event_history_capacity: self.history.event_capacity,
            execution_history_capacity: self.history.execution_capacity,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:ruleflow.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "ruleflowd=info,ruleflow=info".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        let defaults = RuntimeSettings::default();
        Self {
            event_capacity: defaults.event_history_capacity,
            execution_capacity: defaults.execution_history_capacity,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.database.url, "sqlite:ruleflow.db?mode=rwc");
        assert!(config.scheduler.enabled);
        assert_eq!(config.history.event_capacity, 1000);
        assert_eq!(config.history.execution_capacity, 100);
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.scheduler.enabled);
        assert_eq!(config.history.event_capacity, 1000);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [database]
            url = 'sqlite:test.db'

            [logging]
            filter = 'debug'

            [scheduler]
            enabled = false

            [history]
            event_capacity = 50
            execution_capacity = 5
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.url, "sqlite:test.db");
        assert_eq!(config.logging.filter, "debug");
        assert!(!config.scheduler.enabled);
        assert_eq!(
            config.runtime_settings(),
            RuntimeSettings {
                event_history_capacity: 50,
                execution_history_capacity: 5,
            }
        );
    }

    #[test]
    fn should_parse_partial_toml_with_defaults() {
        let toml = "
            [history]
            event_capacity = 10
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.history.event_capacity, 10);
        assert_eq!(config.history.execution_capacity, 100);
        assert_eq!(config.database.url, "sqlite:ruleflow.db?mode=rwc");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }

    #[test]
    fn should_apply_environment_overrides() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("RULEFLOW_DATABASE_URL", "sqlite::memory:"),
            ("RULEFLOW_LOG", "warn"),
            ("RULEFLOW_SCHEDULER_ENABLED", "false"),
        ]));
        assert_eq!(config.database_url(), "sqlite::memory:");
        assert_eq!(config.logging.filter, "warn");
        assert!(!config.scheduler.enabled);
    }

    #[test]
    fn should_prefer_rust_log_over_ruleflow_log() {
        let mut config = Config::default();
        config.apply_overrides(env(&[("RULEFLOW_LOG", "warn"), ("RUST_LOG", "trace")]));
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_ignore_unparseable_scheduler_toggle() {
        let mut config = Config::default();
        config.apply_overrides(env(&[("RULEFLOW_SCHEDULER_ENABLED", "maybe")]));
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn should_reject_zero_capacities() {
        let mut config = Config::default();
        config.history.event_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.execution_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_accept_defaults() {
        assert!(Config::default().validate().is_ok());
    }
}

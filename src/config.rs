//! Process settings read from the environment.

use crate::runtime::RuntimeOptions;
use camino::Utf8PathBuf;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DATABASE_URL: &str = "DATABASE_URL";
const DISPATCH_INTERVAL: &str = "SCHEMAFLOW_DISPATCH_INTERVAL_SECS";
const SYNC_INTERVAL: &str = "SCHEMAFLOW_SYNC_INTERVAL_SECS";
const BACKUP_INTERVAL: &str = "SCHEMAFLOW_BACKUP_INTERVAL_SECS";
const MAX_CONCURRENT_TASKS: &str = "SCHEMAFLOW_MAX_CONCURRENT_TASKS";
const SYNC_TIMEOUT: &str = "SCHEMAFLOW_SYNC_TIMEOUT_SECS";
const SHUTDOWN_GRACE: &str = "SCHEMAFLOW_SHUTDOWN_GRACE_SECS";
const BACKUP_DIR: &str = "SCHEMAFLOW_BACKUP_DIR";
const POOL_SIZE: &str = "SCHEMAFLOW_POOL_SIZE";
const LOG_FORMAT: &str = "SCHEMAFLOW_LOG_FORMAT";

/// Errors raised while reading settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("required setting {0} is not set")]
    Missing(&'static str),

    /// A variable could not be parsed or is out of range.
    #[error("invalid value {value:?} for {key}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    fn from_setting(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Settings for the `schemaflow` process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `PostgreSQL` URL of the metadata store.
    pub database_url: String,
    /// Scheduler tick.
    pub dispatch_interval: Duration,
    /// Schema syncer tick.
    pub sync_interval: Duration,
    /// Backup runner tick.
    pub backup_interval: Duration,
    /// Upper bound on concurrently running tasks.
    pub max_concurrent_tasks: usize,
    /// Upper bound on one instance's sync.
    pub sync_timeout: Duration,
    /// Grace period for running tasks at shutdown.
    pub shutdown_grace: Duration,
    /// Directory holding backup artifacts.
    pub backup_dir: Utf8PathBuf,
    /// Metadata store connection pool size.
    pub pool_size: u32,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which returns a variable's value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// value is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let database_url = read(DATABASE_URL).ok_or(ConfigError::Missing(DATABASE_URL))?;
        let pool_size = parse_or(read(POOL_SIZE), POOL_SIZE, 8_u32)?;
        if pool_size == 0 {
            return Err(invalid(POOL_SIZE, pool_size));
        }
        let max_concurrent_tasks = parse_or(read(MAX_CONCURRENT_TASKS), MAX_CONCURRENT_TASKS, 8)?;
        if max_concurrent_tasks == 0 {
            return Err(invalid(MAX_CONCURRENT_TASKS, max_concurrent_tasks));
        }
        let log_format = match read(LOG_FORMAT) {
            Some(value) => LogFormat::from_setting(&value).ok_or(ConfigError::Invalid {
                key: LOG_FORMAT,
                value,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            database_url,
            dispatch_interval: seconds(read(DISPATCH_INTERVAL), DISPATCH_INTERVAL, 1)?,
            sync_interval: seconds(read(SYNC_INTERVAL), SYNC_INTERVAL, 600)?,
            backup_interval: seconds(read(BACKUP_INTERVAL), BACKUP_INTERVAL, 600)?,
            max_concurrent_tasks,
            sync_timeout: seconds(read(SYNC_TIMEOUT), SYNC_TIMEOUT, 60)?,
            shutdown_grace: seconds(read(SHUTDOWN_GRACE), SHUTDOWN_GRACE, 30)?,
            backup_dir: read(BACKUP_DIR)
                .map_or_else(|| Utf8PathBuf::from("./backups"), Utf8PathBuf::from),
            pool_size,
            log_format,
        })
    }

    /// Returns the loop intervals and shutdown grace period.
    #[must_use]
    pub const fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            dispatch_interval: self.dispatch_interval,
            sync_interval: self.sync_interval,
            backup_interval: self.backup_interval,
            shutdown_grace: self.shutdown_grace,
        }
    }
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn parse_or<T: FromStr>(
    raw: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    raw.map_or(Ok(default), |value| {
        value.parse().map_err(|_| ConfigError::Invalid { key, value })
    })
}

fn seconds(raw: Option<String>, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs = match raw {
        Some(value) => value
            .parse::<NonZeroU64>()
            .map_err(|_| ConfigError::Invalid { key, value })?
            .get(),
        None => default,
    };
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, LogFormat, Settings};
    use rstest::rstest;
    use std::collections::HashMap;
    use std::time::Duration;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let loaded = settings(&[("DATABASE_URL", "postgres://localhost/meta")])
            .expect("settings should load");

        assert_eq!(loaded.dispatch_interval, Duration::from_secs(1));
        assert_eq!(loaded.sync_interval, Duration::from_secs(600));
        assert_eq!(loaded.backup_interval, Duration::from_secs(600));
        assert_eq!(loaded.max_concurrent_tasks, 8);
        assert_eq!(loaded.sync_timeout, Duration::from_secs(60));
        assert_eq!(loaded.shutdown_grace, Duration::from_secs(30));
        assert_eq!(loaded.backup_dir.as_str(), "./backups");
        assert_eq!(loaded.pool_size, 8);
        assert_eq!(loaded.log_format, LogFormat::Pretty);
    }

    #[test]
    fn missing_database_url_is_reported() {
        assert_eq!(settings(&[]), Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn overrides_are_parsed() {
        let loaded = settings(&[
            ("DATABASE_URL", "postgres://db/meta"),
            ("SCHEMAFLOW_SYNC_INTERVAL_SECS", "120"),
            ("SCHEMAFLOW_MAX_CONCURRENT_TASKS", "2"),
            ("SCHEMAFLOW_BACKUP_DIR", "/var/lib/schemaflow"),
            ("SCHEMAFLOW_LOG_FORMAT", "JSON"),
        ])
        .expect("settings should load");

        assert_eq!(loaded.sync_interval, Duration::from_secs(120));
        assert_eq!(loaded.max_concurrent_tasks, 2);
        assert_eq!(loaded.backup_dir.as_str(), "/var/lib/schemaflow");
        assert_eq!(loaded.log_format, LogFormat::Json);
    }

    #[rstest]
    #[case("SCHEMAFLOW_DISPATCH_INTERVAL_SECS", "0")]
    #[case("SCHEMAFLOW_SYNC_INTERVAL_SECS", "soon")]
    #[case("SCHEMAFLOW_MAX_CONCURRENT_TASKS", "0")]
    #[case("SCHEMAFLOW_POOL_SIZE", "-1")]
    #[case("SCHEMAFLOW_LOG_FORMAT", "xml")]
    fn invalid_values_are_rejected(#[case] key: &str, #[case] value: &str) {
        let result = settings(&[("DATABASE_URL", "postgres://db/meta"), (key, value)]);

        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: rejected, value: ref shown })
                if rejected == key && shown == value
        ));
    }
}

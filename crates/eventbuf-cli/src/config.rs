//! Configuration loading from file and environment variables.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use eventbuf_store::{DbRuntimeSettings, RecoveryPolicy, StoreOptions};
use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Startup recovery of events left pending by a previous run.
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Batch settings for taking events.
    #[serde(default)]
    pub upload: UploadConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Lock wait before a write fails as busy, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// Wait for a free pooled connection, in milliseconds.
    #[serde(default = "default_checkout_timeout_ms")]
    pub checkout_timeout_ms: u64,
}

/// When pending events are returned to the queue on open.
///
/// Every `eventbuf` invocation opens the store, so resetting on open would
/// undo the `take` that the following `purge` refers to. The default only
/// reclaims batches older than `stale_after_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    /// Reset every pending event. Only suitable when nothing else takes
    /// batches from the file between invocations.
    OnOpen,
    /// Reset events pending longer than `stale_after_secs`.
    #[default]
    Stale,
    /// Never reset automatically.
    Manual,
}

/// Recovery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default)]
    pub mode: RecoveryMode,

    /// Age after which a pending batch counts as abandoned (`mode = "stale"`).
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

/// Batch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Events per batch when `take` is given no explicit size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "eventbuf_store=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_db_path() -> String {
    "events.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_checkout_timeout_ms() -> u64 {
    DbRuntimeSettings::default().checkout_timeout_ms
}

fn default_stale_after_secs() -> u64 {
    300
}

fn default_batch_size() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            checkout_timeout_ms: default_checkout_timeout_ms(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            mode: RecoveryMode::default(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Store options derived from the `[database]` and `[recovery]` sections.
    pub fn store_options(&self) -> StoreOptions {
        let recovery = match self.recovery.mode {
            RecoveryMode::OnOpen => RecoveryPolicy::ResetOnOpen,
            RecoveryMode::Stale => {
                RecoveryPolicy::ResetStale(Duration::from_secs(self.recovery.stale_after_secs))
            }
            RecoveryMode::Manual => RecoveryPolicy::Manual,
        };

        StoreOptions {
            db: DbRuntimeSettings {
                busy_timeout_ms: self.database.busy_timeout_ms,
                pool_max_size: self.database.pool_max_size,
                checkout_timeout_ms: self.database.checkout_timeout_ms,
            },
            recovery,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults when the
/// file does not exist, then applies environment overrides.
///
/// Environment variable overrides:
/// - `EVENTBUF_DB_PATH` overrides `database.path`
/// - `EVENTBUF_BUSY_TIMEOUT_MS` overrides `database.busy_timeout_ms`
/// - `EVENTBUF_POOL_MAX_SIZE` overrides `database.pool_max_size`
/// - `EVENTBUF_CHECKOUT_TIMEOUT_MS` overrides `database.checkout_timeout_ms`
/// - `EVENTBUF_LOG_LEVEL` overrides `logging.level`
/// - `EVENTBUF_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %p.display(), "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    let env: HashMap<String, String> = std::env::vars()
        .filter(|(key, _)| key.starts_with("EVENTBUF_"))
        .collect();
    apply_env_overrides(&mut config, |key| env.get(key).cloned());

    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = var("EVENTBUF_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(timeout) = var("EVENTBUF_BUSY_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.parse() {
            config.database.busy_timeout_ms = parsed;
        }
    }
    if let Some(size) = var("EVENTBUF_POOL_MAX_SIZE") {
        if let Ok(parsed) = size.parse() {
            config.database.pool_max_size = parsed;
        }
    }
    if let Some(timeout) = var("EVENTBUF_CHECKOUT_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.parse() {
            config.database.checkout_timeout_ms = parsed;
        }
    }
    if let Some(level) = var("EVENTBUF_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("EVENTBUF_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = load_config(Some(dir.path().join("absent.toml").as_path())).expect("load");

        assert_eq!(config.database.path, "events.db");
        assert_eq!(config.recovery.mode, RecoveryMode::Stale);
        assert_eq!(config.upload.batch_size, 100);
        assert_eq!(
            config.store_options().recovery,
            RecoveryPolicy::ResetStale(Duration::from_secs(300))
        );
    }

    #[test]
    fn parses_partial_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("eventbuf.toml");
        std::fs::write(
            &path,
            r#"
[database]
path = "/var/lib/app/events.db"
busy_timeout_ms = 750

[recovery]
mode = "stale"
stale_after_secs = 90

[upload]
batch_size = 25
"#,
        )
        .expect("write config");

        let config = load_config(Some(path.as_path())).expect("load");
        assert_eq!(config.database.path, "/var/lib/app/events.db");
        assert_eq!(config.database.pool_max_size, 4);
        assert_eq!(config.upload.batch_size, 25);
        assert!(!config.logging.json);

        let options = config.store_options();
        assert_eq!(options.db.busy_timeout_ms, 750);
        assert_eq!(
            options.recovery,
            RecoveryPolicy::ResetStale(Duration::from_secs(90))
        );
    }

    #[test]
    fn rejects_unknown_recovery_mode() {
        let err = toml::from_str::<Config>("[recovery]\nmode = \"sometimes\"\n")
            .expect_err("unknown mode should fail");
        assert!(err.to_string().contains("sometimes"), "got: {err}");
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = HashMap::from([
            ("EVENTBUF_DB_PATH", "/tmp/override.db"),
            ("EVENTBUF_POOL_MAX_SIZE", "9"),
            ("EVENTBUF_CHECKOUT_TIMEOUT_MS", "1500"),
            ("EVENTBUF_BUSY_TIMEOUT_MS", "not-a-number"),
            ("EVENTBUF_LOG_JSON", "1"),
        ]);

        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, "/tmp/override.db");
        assert_eq!(config.database.pool_max_size, 9);
        assert_eq!(config.database.checkout_timeout_ms, 1_500);
        assert_eq!(config.store_options().db.checkout_timeout_ms, 1_500);
        assert_eq!(config.database.busy_timeout_ms, 5_000, "bad value is ignored");
        assert!(config.logging.json);
    }
}

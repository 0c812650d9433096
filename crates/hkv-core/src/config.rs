//! Configuration structures for hkv.
//!
//! Configuration is loaded from TOML files. Every table setting has a default so
//! an empty `[table]` section is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operation timeout value meaning "not configured".
///
/// Any other value switches reads into the private execution pool unless
/// `execute_in_pool` says otherwise.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = i32::MAX as u64;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Remote table service connection
    pub remote: RemoteConfig,

    /// Table client behaviour
    #[serde(default)]
    pub table: TableConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity of the remote table service.
///
/// Two configurations with the same endpoint, user and database share one
/// client in the [`ClientRegistry`](crate::rpc::ClientRegistry).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct RemoteConfig {
    /// Service endpoint (config server URL or proxy address)
    pub endpoint: String,

    /// Full user name, e.g. `user@tenant#cluster`
    #[serde(default)]
    pub full_user_name: String,

    /// Database holding the tables
    #[serde(default = "default_database")]
    pub database: String,
}

/// Table client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableConfig {
    /// Client-observed operation timeout in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Force reads in or out of the private pool; derived from the timeout when unset
    #[serde(default)]
    pub execute_in_pool: Option<bool>,

    /// Maximum concurrent calls in the private pool
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Idle keep-alive for extra pool threads, in seconds
    #[serde(default = "default_keep_alive_seconds")]
    pub keep_alive_seconds: u64,

    /// Buffered put bytes that trigger a flush
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: u64,

    /// Check the write buffer every this many buffered puts
    #[serde(default = "default_put_write_buffer_check")]
    pub put_write_buffer_check: usize,

    /// Maximum size of a single cell value in bytes (0 disables the check)
    #[serde(default = "default_max_key_value_size")]
    pub max_key_value_size: usize,

    /// Flush after every put call
    #[serde(default = "default_true")]
    pub auto_flush: bool,

    /// Drop buffered puts after a flush attempt even if some failed
    #[serde(default = "default_true")]
    pub clear_buffer_on_fail: bool,

    /// Route operations to shadow tables for load testing
    #[serde(default)]
    pub test_load_enable: bool,

    /// Suffix inserted before the family separator in test-load mode
    #[serde(default = "default_test_load_suffix")]
    pub test_load_suffix: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout_ms(),
            execute_in_pool: None,
            max_threads: default_max_threads(),
            keep_alive_seconds: default_keep_alive_seconds(),
            write_buffer_size: default_write_buffer_size(),
            put_write_buffer_check: default_put_write_buffer_check(),
            max_key_value_size: default_max_key_value_size(),
            auto_flush: default_true(),
            clear_buffer_on_fail: default_true(),
            test_load_enable: false,
            test_load_suffix: default_test_load_suffix(),
        }
    }
}

impl TableConfig {
    /// Whether reads run in the private pool.
    pub fn execute_in_pool(&self) -> bool {
        self.execute_in_pool
            .unwrap_or(self.operation_timeout_ms != DEFAULT_OPERATION_TIMEOUT_MS)
    }

    /// Pool keep-alive as a duration.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.operation_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "operation_timeout_ms must be positive".into(),
            ));
        }

        if self.max_threads == 0 {
            return Err(crate::Error::Config("max_threads must be positive".into()));
        }

        if self.write_buffer_size == 0 {
            return Err(crate::Error::Config(
                "write_buffer_size must be positive".into(),
            ));
        }

        if self.put_write_buffer_check == 0 {
            return Err(crate::Error::Config(
                "put_write_buffer_check must be positive".into(),
            ));
        }

        if self.test_load_enable && self.test_load_suffix.is_empty() {
            return Err(crate::Error::Config(
                "test_load_suffix is required when test load is enabled".into(),
            ));
        }

        if !self.auto_flush && !self.clear_buffer_on_fail {
            tracing::warn!(
                "clear_buffer_on_fail is off: failed puts stay buffered and are retried on the next flush"
            );
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

// Default value functions
fn default_database() -> String {
    "test".to_string()
}
fn default_operation_timeout_ms() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_MS
}
fn default_max_threads() -> usize {
    256
}
fn default_keep_alive_seconds() -> u64 {
    60
}
fn default_write_buffer_size() -> u64 {
    2 * 1024 * 1024
}
fn default_put_write_buffer_check() -> usize {
    10
}
fn default_max_key_value_size() -> usize {
    10 * 1024 * 1024
}
fn default_true() -> bool {
    true
}
fn default_test_load_suffix() -> String {
    "_t".to_string()
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.remote.endpoint.trim().is_empty() {
            return Err(crate::Error::Config("Remote endpoint is required".into()));
        }

        if self.remote.database.trim().is_empty() {
            return Err(crate::Error::Config("Database name is required".into()));
        }

        self.table.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn remote() -> RemoteConfig {
        RemoteConfig {
            endpoint: "http://127.0.0.1:8080/services?Action=ObRootServiceInfo".into(),
            full_user_name: "root@sys#obcluster".into(),
            database: "test".into(),
        }
    }

    #[test]
    fn test_default_table_config() {
        let config = TableConfig::default();
        assert_eq!(config.operation_timeout_ms, DEFAULT_OPERATION_TIMEOUT_MS);
        assert_eq!(config.write_buffer_size, 2_097_152);
        assert_eq!(config.put_write_buffer_check, 10);
        assert!(config.auto_flush);
        assert!(config.clear_buffer_on_fail);
        assert!(!config.execute_in_pool());
    }

    #[test]
    fn test_pool_mode_follows_timeout() {
        let mut config = TableConfig {
            operation_timeout_ms: 500,
            ..Default::default()
        };
        assert!(config.execute_in_pool());

        config.execute_in_pool = Some(false);
        assert!(!config.execute_in_pool());

        config.operation_timeout_ms = DEFAULT_OPERATION_TIMEOUT_MS;
        config.execute_in_pool = Some(true);
        assert!(config.execute_in_pool());
    }

    #[test]
    fn test_config_validation() {
        let config = Config {
            remote: remote(),
            table: TableConfig::default(),
            logging: LoggingConfig::default(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_endpoint() {
        let config = Config {
            remote: RemoteConfig {
                endpoint: "  ".into(),
                ..remote()
            },
            table: TableConfig::default(),
            logging: LoggingConfig::default(),
        };
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_config_validation_zero_check_interval() {
        let table = TableConfig {
            put_write_buffer_check: 0,
            ..Default::default()
        };
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[remote]
endpoint = "http://config-server:8080"
full_user_name = "app@tenant#cluster"

[table]
operation_timeout_ms = 3000
write_buffer_size = 4096
auto_flush = false

[logging]
log_level = "debug"
log_format = "text"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.remote.database, "test");
        assert_eq!(config.table.write_buffer_size, 4096);
        assert!(!config.table.auto_flush);
        assert!(config.table.execute_in_pool());
        assert_eq!(config.table.test_load_suffix, "_t");
        assert_eq!(config.logging.log_level, LogLevel::Debug);
        assert_eq!(config.logging.log_format, LogFormat::Text);
    }

    #[test]
    fn test_config_from_file_missing_remote() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[table]\nauto_flush = true").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }
}

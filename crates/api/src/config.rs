//! Application configuration loaded from environment variables.

use std::time::Duration;

use thiserror::Error;

/// An environment variable held a value that could not be used.
#[derive(Debug, Error)]
#[error("invalid value {value:?} for {name}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

/// Largest lock timeout PostgreSQL accepts for `lock_timeout`.
pub const MAX_LOCK_TIMEOUT_MS: u64 = i32::MAX as u64;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `DB_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `LOCK_TIMEOUT_MS`: row lock wait limit, 1 to [`MAX_LOCK_TIMEOUT_MS`]
///   (default: `5000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub lock_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let log_format = match lookup("LOG_FORMAT") {
            None => defaults.log_format,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "text" | "pretty" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError {
                        name: "LOG_FORMAT",
                        value,
                        reason: "expected `text` or `json`".to_string(),
                    });
                }
            },
        };

        let lock_timeout = match parse_var::<u64>(&lookup, "LOCK_TIMEOUT_MS")? {
            None => defaults.lock_timeout,
            Some(millis) if millis == 0 || millis > MAX_LOCK_TIMEOUT_MS => {
                return Err(ConfigError {
                    name: "LOCK_TIMEOUT_MS",
                    value: millis.to_string(),
                    reason: format!("expected 1 to {MAX_LOCK_TIMEOUT_MS} milliseconds"),
                });
            }
            Some(millis) => Duration::from_millis(millis),
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT")?.unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            db_max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.db_max_connections),
            lock_timeout,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError {
                name,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            db_max_connections: 10,
            lock_timeout: Duration::from_millis(5000),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_reads_every_variable() {
        let config = from_vars(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("RUST_LOG", "debug"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("DB_MAX_CONNECTIONS", "25"),
            ("LOCK_TIMEOUT_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/orders")
        );
        assert_eq!(config.db_max_connections, 25);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_blank_database_url_means_in_memory() {
        let config = from_vars(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = from_vars(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.name, "PORT");

        let err = from_vars(&[("LOCK_TIMEOUT_MS", "-1")]).unwrap_err();
        assert_eq!(err.name, "LOCK_TIMEOUT_MS");
    }

    #[test]
    fn test_lock_timeout_above_postgres_limit_is_rejected() {
        let too_long = (MAX_LOCK_TIMEOUT_MS + 1).to_string();
        let err = from_vars(&[("LOCK_TIMEOUT_MS", too_long.as_str())]).unwrap_err();
        assert_eq!(err.name, "LOCK_TIMEOUT_MS");
        assert_eq!(err.value, too_long);

        let err = from_vars(&[("LOCK_TIMEOUT_MS", "0")]).unwrap_err();
        assert_eq!(err.name, "LOCK_TIMEOUT_MS");

        let max = MAX_LOCK_TIMEOUT_MS.to_string();
        let config = from_vars(&[("LOCK_TIMEOUT_MS", max.as_str())]).unwrap();
        assert_eq!(config.lock_timeout, Duration::from_millis(MAX_LOCK_TIMEOUT_MS));
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        let err = from_vars(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert_eq!(err.name, "LOG_FORMAT");
        assert!(err.to_string().contains("xml"));
    }
}

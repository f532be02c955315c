//! Application configuration loaded from environment variables.

use std::time::Duration;

use service::{DEFAULT_OUT_OF_STOCK_DESTINATION, RetryPolicy};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Process configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for structured output, anything else for text
/// - `DATABASE_URL`: PostgreSQL connection string; unset means the in-memory store
/// - `REDIS_URL`: Redis connection string; unset means the in-memory publisher
/// - `EVENT_RETRY_ATTEMPTS`: attempts per event handler (default: `3`)
/// - `EVENT_RETRY_BASE_DELAY_MS`: first retry delay (default: `1000`)
/// - `EVENT_RETRY_MAX_DELAY_MS`: retry delay cap (default: `10000`)
/// - `OUT_OF_STOCK_EMAIL`: out-of-stock notification address (default: `stock@made.com`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub event_retry_attempts: u32,
    pub event_retry_base_delay_ms: u64,
    pub event_retry_max_delay_ms: u64,
    pub out_of_stock_email: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parse_or(non_empty("PORT"), defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: non_empty("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            event_retry_attempts: parse_or(
                non_empty("EVENT_RETRY_ATTEMPTS"),
                defaults.event_retry_attempts,
            ),
            event_retry_base_delay_ms: parse_or(
                non_empty("EVENT_RETRY_BASE_DELAY_MS"),
                defaults.event_retry_base_delay_ms,
            ),
            event_retry_max_delay_ms: parse_or(
                non_empty("EVENT_RETRY_MAX_DELAY_MS"),
                defaults.event_retry_max_delay_ms,
            ),
            out_of_stock_email: non_empty("OUT_OF_STOCK_EMAIL")
                .unwrap_or(defaults.out_of_stock_email),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the event handler retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.event_retry_attempts.max(1),
            Duration::from_millis(self.event_retry_base_delay_ms),
            Duration::from_millis(self.event_retry_max_delay_ms),
        )
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            redis_url: None,
            event_retry_attempts: 3,
            event_retry_base_delay_ms: 1000,
            event_retry_max_delay_ms: 10_000,
            out_of_stock_email: DEFAULT_OUT_OF_STOCK_DESTINATION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.out_of_stock_email, "stock@made.com");
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_empty_lookup_yields_defaults() {
        let config = from_vars(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.event_retry_attempts, 3);
    }

    #[test]
    fn test_reads_variables() {
        let config = from_vars(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/allocation"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("EVENT_RETRY_ATTEMPTS", "5"),
            ("OUT_OF_STOCK_EMAIL", "buyers@made.com"),
        ]);

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/allocation")
        );
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.event_retry_attempts, 5);
        assert_eq!(config.out_of_stock_email, "buyers@made.com");
    }

    #[test]
    fn test_invalid_and_blank_values_fall_back() {
        let config = from_vars(&[("PORT", "not-a-port"), ("DATABASE_URL", "  ")]);
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_retry_policy() {
        let config = from_vars(&[
            ("EVENT_RETRY_ATTEMPTS", "4"),
            ("EVENT_RETRY_BASE_DELAY_MS", "10"),
            ("EVENT_RETRY_MAX_DELAY_MS", "25"),
        ]);
        let policy = config.retry_policy();

        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(3), Duration::from_millis(25));
    }
}

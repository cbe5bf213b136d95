//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::coordinator::RetryPolicy;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Number of transfer workers consuming the command queue
    pub worker_count: usize,

    /// Local retries of the apply loop on transient store errors
    pub apply_retries: u32,

    /// Retries per event publish
    pub publish_retries: u32,

    /// Transport deliveries before dead-lettering
    pub max_delivery_attempts: u32,

    /// Base backoff delay in milliseconds
    pub backoff_base_ms: u64,

    /// End-to-end deadline per command, in seconds
    pub command_deadline_secs: u64,

    /// Transient-failure retries for notification delivery
    pub notification_retry_cap: u32,

    /// Email provider endpoint; unset means the sandbox (log-only) provider
    pub email_endpoint: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_env("DATABASE_MAX_CONNECTIONS", "10")?;
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env("PORT", "3000")?;
        let worker_count = parse_env("WORKER_COUNT", "4")?;
        let apply_retries = parse_env("APPLY_RETRIES", "3")?;
        let publish_retries = parse_env("PUBLISH_RETRIES", "3")?;
        let max_delivery_attempts = parse_env("MAX_DELIVERY_ATTEMPTS", "5")?;
        let backoff_base_ms = parse_env("BACKOFF_BASE_MS", "50")?;
        let command_deadline_secs = parse_env("COMMAND_DEADLINE_SECS", "30")?;
        let notification_retry_cap = parse_env("NOTIFICATION_RETRY_CAP", "4")?;
        let email_endpoint = env::var("EMAIL_ENDPOINT").ok();

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            worker_count,
            apply_retries,
            publish_retries,
            max_delivery_attempts,
            backoff_base_ms,
            command_deadline_secs,
            notification_retry_cap,
            email_endpoint,
        })
    }

    /// Retry bounds for the coordinator
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            apply_retries: self.apply_retries,
            publish_retries: self.publish_retries,
            max_delivery_attempts: self.max_delivery_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            command_deadline: Duration::from_secs(self.command_deadline_secs),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_mapping() {
        let config = Config {
            database_url: "postgres://localhost/bank".to_string(),
            database_max_connections: 10,
            host: "127.0.0.1".to_string(),
            port: 3000,
            worker_count: 4,
            apply_retries: 2,
            publish_retries: 1,
            max_delivery_attempts: 7,
            backoff_base_ms: 25,
            command_deadline_secs: 10,
            notification_retry_cap: 4,
            email_endpoint: None,
        };

        let policy = config.retry_policy();
        assert_eq!(policy.apply_retries, 2);
        assert_eq!(policy.publish_retries, 1);
        assert_eq!(policy.max_delivery_attempts, 7);
        assert_eq!(policy.backoff_base, Duration::from_millis(25));
        assert_eq!(policy.command_deadline, Duration::from_secs(10));
    }
}

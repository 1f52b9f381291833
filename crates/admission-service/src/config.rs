//! Admission service configuration.
//!
//! Configuration is loaded from environment variables. Sensitive fields are
//! redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default bound on every provider call, in seconds.
pub const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound accepted for `PROVIDER_TIMEOUT_SECONDS`.
pub const MAX_PROVIDER_TIMEOUT_SECONDS: u64 = 120;

/// Default graceful-shutdown drain period, in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Admission service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Media provider base URL.
    pub provider_url: String,

    /// Media provider API secret.
    pub provider_secret: SecretString,

    /// Bound on each provider call.
    pub provider_timeout: Duration,

    /// HS256 key for caller tokens.
    pub jwt_secret: SecretString,

    /// JWT clock skew tolerance.
    pub jwt_clock_skew: Duration,

    /// Graceful shutdown drain period.
    pub drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("provider_url", &self.provider_url)
            .field("provider_secret", &"[REDACTED]")
            .field("provider_timeout", &self.provider_timeout)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid provider timeout configuration: {0}")]
    InvalidProviderTimeout(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid drain configuration: {0}")]
    InvalidDrainSeconds(String),
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = required(vars, "DATABASE_URL")?;
        let provider_url = required(vars, "PROVIDER_URL")?;
        let provider_secret = SecretString::from(required(vars, "PROVIDER_SECRET")?);
        let jwt_secret = SecretString::from(required(vars, "JWT_SECRET")?);

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let provider_timeout_seconds = if let Some(value_str) = vars.get("PROVIDER_TIMEOUT_SECONDS")
        {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidProviderTimeout(format!(
                    "PROVIDER_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidProviderTimeout(
                    "PROVIDER_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_PROVIDER_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidProviderTimeout(format!(
                    "PROVIDER_TIMEOUT_SECONDS must not exceed {} seconds, got {}",
                    MAX_PROVIDER_TIMEOUT_SECONDS, value
                )));
            }

            value
        } else {
            DEFAULT_PROVIDER_TIMEOUT_SECONDS
        };

        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidJwtClockSkew(
                    "JWT_CLOCK_SKEW_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs()
        };

        let drain_seconds = if let Some(value_str) = vars.get("DRAIN_SECONDS") {
            value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainSeconds(format!(
                    "DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            DEFAULT_DRAIN_SECONDS
        };

        Ok(Config {
            database_url,
            bind_address,
            provider_url,
            provider_secret,
            provider_timeout: Duration::from_secs(provider_timeout_seconds),
            jwt_secret,
            jwt_clock_skew: Duration::from_secs(jwt_clock_skew_seconds),
            drain_seconds,
        })
    }
}

//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use bourse_engine::EqualPolicy;
use bourse_exec::{MatchingConfig, MatchingMode};
use std::env;
use std::str::FromStr;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Matching mode and `Equal` policy
    pub matching: MatchingConfig,

    /// Batch scheduler configuration
    pub batch: BatchConfig,

    /// Event bus buffer size
    pub event_bus_capacity: usize,

    /// Emit JSON log lines
    pub log_json: bool,

    /// PostgreSQL connection string (in-memory store when absent)
    pub database_url: Option<String>,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Batch scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Seconds between scheduled passes; 0 leaves only price-triggered passes
    pub interval_secs: u64,
}

impl BatchConfig {
    /// Check if the fixed-interval pass is enabled
    pub fn interval_enabled(&self) -> bool {
        self.interval_secs > 0
    }
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (in-memory store)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let matching = Self::load_matching_config()?;
        let interval_secs = Self::load_parsed_env("BOURSE_BATCH_INTERVAL_SECS", 30u64)?;
        let event_bus_capacity = Self::load_parsed_env("BOURSE_EVENT_BUS_CAPACITY", 1000usize)?;
        if event_bus_capacity == 0 {
            return Err(DaemonError::Config(
                "BOURSE_EVENT_BUS_CAPACITY must be greater than 0".to_string(),
            ));
        }
        let log_json = Self::load_flag_env("BOURSE_LOG_JSON")?;
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        Ok(Self {
            matching,
            batch: BatchConfig { interval_secs },
            event_bus_capacity,
            log_json,
            database_url,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            matching: MatchingConfig::inventory(),
            batch: BatchConfig { interval_secs: 0 }, // Passes only on demand
            event_bus_capacity: 100,
            log_json: false,
            database_url: None,
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("BOURSE_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid BOURSE_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_matching_config() -> DaemonResult<MatchingConfig> {
        let mode = match env::var("BOURSE_MATCHING_MODE") {
            Ok(val) => MatchingMode::from_str(&val).map_err(DaemonError::Config)?,
            Err(_) => MatchingMode::default(),
        };
        let equal_policy = match env::var("BOURSE_EQUAL_POLICY") {
            Ok(val) => EqualPolicy::from_str(&val).map_err(DaemonError::Config)?,
            Err(_) => EqualPolicy::default(),
        };

        Ok(MatchingConfig { mode, equal_policy })
    }

    fn load_parsed_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(val) => val
                .trim()
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_flag_env(key: &str) -> DaemonResult<bool> {
        match env::var(key) {
            Ok(val) => match val.to_lowercase().as_str() {
                "1" | "true" | "yes" => Ok(true),
                "0" | "false" | "no" | "" => Ok(false),
                _ => Err(DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            },
            Err(_) => Ok(false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            matching: MatchingConfig::default(),
            batch: BatchConfig { interval_secs: 30 },
            event_bus_capacity: 1000,
            log_json: false,
            database_url: None,
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.batch.interval_secs, 30);
        assert_eq!(config.event_bus_capacity, 1000);
        assert_eq!(config.matching.mode, MatchingMode::Inventory);
        assert_eq!(config.matching.equal_policy, EqualPolicy::AtOrAbove);
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert!(!config.batch.interval_enabled());
        assert!(config.database_url.is_none());
        assert_eq!(config.environment, Environment::Test);
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}

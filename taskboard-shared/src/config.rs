//! Configuration management
//!
//! Configuration is read from the environment, with a `.env` file loaded
//! first when present (for development).
//!
//! # Environment Variables
//!
//! Nested keys use the `TASKBOARD` prefix and `__` as separator:
//!
//! - `TASKBOARD__DATABASE__URL`: PostgreSQL connection string (falls back to `DATABASE_URL`)
//! - `TASKBOARD__DATABASE__MAX_CONNECTIONS`: Pool size (default: 10)
//! - `TASKBOARD__DATABASE__MIN_CONNECTIONS`: Warm connections (default: 2)
//! - `TASKBOARD__SESSION__TTL_SECONDS`: Session lifetime (default: 7 days)
//! - `TASKBOARD__SESSION__PURGE_INTERVAL_SECONDS`: Expired-session sweep (default: 300)
//! - `TASKBOARD__TRANSACTIONS__TIMEOUT_MS`: Transaction budget (default: 5000)
//! - `TASKBOARD__TRANSACTIONS__STATEMENT_TIMEOUT_MS`: Per-statement limit (default: 4000)
//! - `RUST_LOG`: Log filter for the binaries
//!
//! # Example
//!
//! ```no_run
//! use taskboard_shared::config::Config;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Sessions live for {:?}", config.session.ttl());
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::db::pool::DatabaseConfig;
use crate::db::transaction::TransactionPolicy;

const ENV_PREFIX: &str = "TASKBOARD";
const ENV_SEPARATOR: &str = "__";

/// Complete configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseSettings,
    pub session: SessionSettings,
    pub transactions: TransactionSettings,
}

/// Database connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of pooled connections
    pub max_connections: u32,

    /// Minimum number of idle connections
    pub min_connections: u32,

    /// Seconds to wait for a free connection
    pub acquire_timeout_seconds: u64,
}

/// Session lifetime settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Lifetime of a newly created session
    pub ttl_seconds: i64,

    /// How often the worker deletes expired sessions
    pub purge_interval_seconds: u64,
}

/// Transaction time limits
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionSettings {
    pub timeout_ms: u64,
    pub statement_timeout_ms: u64,
}

impl Config {
    /// Loads configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed or a required value is
    /// missing.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load(None)?;
        if config.database.url.is_empty() {
            config.database.url = std::env::var("DATABASE_URL").unwrap_or_default();
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from an explicit variable map
    ///
    /// Keys use the same names as the environment
    /// (`TASKBOARD__DATABASE__URL`, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed or validation fails.
    pub fn from_vars(vars: HashMap<String, String>) -> anyhow::Result<Self> {
        let config = Self::load(Some(vars))?;
        config.validate()?;
        Ok(config)
    }

    fn load(vars: Option<HashMap<String, String>>) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10_i64)?
            .set_default("database.min_connections", 2_i64)?
            .set_default("database.acquire_timeout_seconds", 30_i64)?
            .set_default("session.ttl_seconds", 7 * 24 * 60 * 60_i64)?
            .set_default("session.purge_interval_seconds", 300_i64)?
            .set_default("transactions.timeout_ms", 5_000_i64)?
            .set_default("transactions.statement_timeout_ms", 4_000_i64)?
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Checks cross-field requirements
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("TASKBOARD__DATABASE__URL or DATABASE_URL is required");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!("database.min_connections must not exceed database.max_connections");
        }
        if self.session.ttl_seconds <= 0 {
            anyhow::bail!("session.ttl_seconds must be positive");
        }
        if self.session.purge_interval_seconds == 0 {
            anyhow::bail!("session.purge_interval_seconds must be positive");
        }
        if self.transactions.timeout_ms == 0 || self.transactions.statement_timeout_ms == 0 {
            anyhow::bail!("transaction timeouts must be positive");
        }

        Ok(())
    }

    /// Pool settings derived from the database section
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            min_connections: self.database.min_connections,
            acquire_timeout_seconds: self.database.acquire_timeout_seconds,
            ..Default::default()
        }
    }

    /// Transaction limits derived from the transactions section
    pub fn transaction_policy(&self) -> TransactionPolicy {
        TransactionPolicy {
            timeout: Duration::from_millis(self.transactions.timeout_ms),
            statement_timeout: Duration::from_millis(self.transactions.statement_timeout_ms),
        }
    }
}

impl SessionSettings {
    /// Session lifetime as a chrono duration
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_seconds)
    }

    /// Purge interval as a std duration
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds)
    }
}

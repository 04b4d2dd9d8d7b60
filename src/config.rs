//! Environment-driven configuration for the server, storage, gateway relay
//! and reconciliation policy. `.env` is honoured when present.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::payments::providers::mpesa::MpesaConfig;
use crate::services::fee_calculation::DEFAULT_SERVICE_FEE_BPS;
use crate::workers::reconciliation::RetryPolicy;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` when `DATABASE_URL` is unset; only valid with `SKIP_EXTERNALS`.
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub gateway: MpesaConfig,
    pub reconciliation: ReconciliationConfig,
    pub wallet: WalletConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
    pub run_migrations: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub policy: RetryPolicy,
    pub stuck_threshold: Duration,
    pub stuck_scan_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub service_fee_bps: u32,
    pub currency: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env_optional()?,
            logging: LoggingConfig::from_env()?,
            gateway: MpesaConfig::from_env()
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?,
            reconciliation: ReconciliationConfig::from_env()?,
            wallet: WalletConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.gateway
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
        self.reconciliation.validate()?;
        self.wallet.validate()?;

        Ok(())
    }
}

/// Reads `name`, falling back to `default` when unset. A set but unparsable
/// value is an error rather than a silent fallback.
fn var_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &str, default: u64) -> Result<Duration, ConfigError> {
    var_or(name, default).map(Duration::from_secs)
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: var_or("SERVER_HOST", "127.0.0.1".to_string())?,
            port: var_or("SERVER_PORT", 8000)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("SERVER_PORT must be > 0".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingVariable("SERVER_HOST".to_string()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_optional()?
            .ok_or_else(|| ConfigError::MissingVariable("DATABASE_URL".to_string()))
    }

    fn from_env_optional() -> Result<Option<Self>, ConfigError> {
        let Ok(url) = env::var("DATABASE_URL") else {
            return Ok(None);
        };
        let idle_timeout = match env::var("DB_IDLE_TIMEOUT") {
            Ok(_) => Some(var_or("DB_IDLE_TIMEOUT", 0)?),
            Err(_) => None,
        };
        Ok(Some(DatabaseConfig {
            url,
            max_connections: var_or("DB_MAX_CONNECTIONS", 20)?,
            min_connections: var_or("DB_MIN_CONNECTIONS", 2)?,
            connection_timeout: var_or("DB_CONNECTION_TIMEOUT", 30)?,
            idle_timeout,
            run_migrations: var_or("DB_RUN_MIGRATIONS", true)?,
        }))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingVariable("DATABASE_URL".to_string()));
        }
        match (self.min_connections, self.max_connections) {
            (_, 0) => Err(ConfigError::InvalidValue(
                "DB_MAX_CONNECTIONS must be > 0".to_string(),
            )),
            (min, max) if min > max => Err(ConfigError::ValidationFailed(format!(
                "DB_MIN_CONNECTIONS ({}) exceeds DB_MAX_CONNECTIONS ({})",
                min, max
            ))),
            _ => Ok(()),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "plain" | "pretty" | "text" => Ok(LogFormat::Plain),
            _ => Err(ConfigError::InvalidValue("LOG_FORMAT".to_string())),
        }
    }
}

impl LoggingConfig {
    const LEVELS: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: var_or("LOG_LEVEL", "info".to_string())?.to_ascii_lowercase(),
            format: var_or("LOG_FORMAT", LogFormat::Plain)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Self::LEVELS.contains(&self.level.as_str()) {
            Ok(())
        } else {
            Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()))
        }
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ReconciliationConfig {
            policy: RetryPolicy {
                backoff: secs_var("RECONCILIATION_BACKOFF_SECONDS", 60)?,
                max_attempts: var_or("RECONCILIATION_MAX_ATTEMPTS", 5)?,
                initial_delay: secs_var("RECONCILIATION_INITIAL_DELAY_SECONDS", 0)?,
            },
            stuck_threshold: secs_var("STUCK_SETTLEMENT_THRESHOLD_SECONDS", 900)?,
            stuck_scan_interval: secs_var("STUCK_SETTLEMENT_SCAN_SECONDS", 60)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "RECONCILIATION_MAX_ATTEMPTS must be > 0".to_string(),
            ));
        }
        if self.stuck_scan_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "STUCK_SETTLEMENT_SCAN_SECONDS must be > 0".to_string(),
            ));
        }
        // A row should have had its full poll budget before it counts as stuck.
        let budget = self.policy.backoff * self.policy.max_attempts;
        if self.stuck_threshold < budget {
            return Err(ConfigError::ValidationFailed(format!(
                "STUCK_SETTLEMENT_THRESHOLD_SECONDS ({}s) is shorter than the poll budget ({}s)",
                self.stuck_threshold.as_secs(),
                budget.as_secs()
            )));
        }
        Ok(())
    }
}

impl WalletConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WalletConfig {
            service_fee_bps: var_or("SERVICE_FEE_BPS", DEFAULT_SERVICE_FEE_BPS)?,
            currency: var_or("WALLET_CURRENCY", "KES".to_string())?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_fee_bps > 10_000 {
            return Err(ConfigError::InvalidValue(
                "SERVICE_FEE_BPS must be <= 10000".to_string(),
            ));
        }
        if self.currency.len() != 3 {
            return Err(ConfigError::InvalidValue("WALLET_CURRENCY".to_string()));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl From<ConfigError> for crate::error::AppError {
    fn from(err: ConfigError) -> Self {
        crate::error::AppError::new(crate::error::AppErrorKind::Infrastructure(
            crate::error::InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}

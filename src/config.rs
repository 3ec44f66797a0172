use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Application configuration with validation.
///
/// Values are layered: built-in defaults, then optional `config/default`
/// and `config/<env>` files, then `APP__`-prefixed environment variables
/// (e.g. `APP__DATABASE_URL`).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Maximum number of pooled database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum number of pooled database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Optional statement timeout; `None` relies on the driver default
    #[serde(default)]
    pub db_statement_timeout_secs: Option<u64>,

    /// Application environment (development, test, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Document number formatting for generated order/transfer numbers
    #[serde(default)]
    pub document_numbers: DocumentNumberConfig,
}

/// Prefixes for generated document numbers (`PO000042` and friends).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DocumentNumberConfig {
    #[serde(default = "default_po_prefix")]
    pub purchase_order: String,
    #[serde(default = "default_so_prefix")]
    pub sales_order: String,
    #[serde(default = "default_adj_prefix")]
    pub stock_adjustment: String,
    #[serde(default = "default_trf_prefix")]
    pub stock_transfer: String,
    /// Zero-padded width of the numeric part
    #[serde(default = "default_number_width")]
    #[validate(range(min = 4, max = 12))]
    pub width: usize,
}

impl Default for DocumentNumberConfig {
    fn default() -> Self {
        Self {
            purchase_order: default_po_prefix(),
            sales_order: default_so_prefix(),
            stock_adjustment: default_adj_prefix(),
            stock_transfer: default_trf_prefix(),
            width: default_number_width(),
        }
    }
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_po_prefix() -> String {
    "PO".to_string()
}
fn default_so_prefix() -> String {
    "SO".to_string()
}
fn default_adj_prefix() -> String {
    "ADJ".to_string()
}
fn default_trf_prefix() -> String {
    "TRF".to_string()
}
fn default_number_width() -> usize {
    6
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Loads configuration for the current environment.
///
/// The profile is selected by `RUN_ENV` or `APP_ENV`; environment
/// variables always win over file values.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://stockflow.db?mode=rwc")?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config
        .validate()
        .map_err(|e| AppConfigError::ValidationError(e.to_string()))?;

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_valid_config() {
        let cfg = load_config().expect("default config should load");
        assert!(!cfg.database_url.is_empty());
        assert_eq!(cfg.document_numbers.width, 6);
        assert_eq!(cfg.document_numbers.purchase_order, "PO");
    }
}

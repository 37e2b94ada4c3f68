//! Configuration module for dispensary-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct DispensaryConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// `None` runs on in-memory stores.
    pub database: Option<DatabaseConfig>,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub bill_number_prefix: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            bill_number_prefix: "DSP".to_string(),
        }
    }
}

impl DispensaryConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            }),
            _ => None,
        };

        let bill_number_prefix = env::var("BILL_NUMBER_PREFIX")
            .map(|p| p.trim().to_uppercase())
            .unwrap_or_else(|_| BillingConfig::default().bill_number_prefix);
        if bill_number_prefix.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BILL_NUMBER_PREFIX must not be empty"
            )));
        }

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "dispensary-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database,
            billing: BillingConfig { bill_number_prefix },
        })
    }
}

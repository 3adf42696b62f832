//! Server configuration module.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults. Provider credentials are optional: a missing credential
//! disables the corresponding boundary (planning or gateway payments fail
//! with a configuration error) without stopping the process.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use std::env;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,

    /// SQLite database path
    pub database_path: String,

    /// Routing/geocoding provider API key (optional)
    pub maps_api_key: Option<String>,

    /// Payment gateway secret key (optional)
    pub gateway_secret_key: Option<String>,

    /// Payment gateway webhook signing secret (optional)
    pub gateway_webhook_secret: Option<String>,

    /// Checkout currency code
    pub checkout_currency: String,

    /// Checkout success redirect URL
    pub checkout_success_url: String,

    /// Checkout cancel redirect URL
    pub checkout_cancel_url: String,

    /// Timeout applied to every external provider call, in seconds
    pub provider_timeout_secs: u64,

    /// Period of the scheduled reconciliation pass, in seconds
    pub reconcile_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = ServerConfig {
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("HTTP_PORT".to_string()))?,

            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "rutero.db".to_string()),

            maps_api_key: env::var("GOOGLE_MAPS_API_KEY").ok().filter(|k| !k.is_empty()),

            gateway_secret_key: env::var("STRIPE_SECRET_KEY").ok().filter(|k| !k.is_empty()),

            gateway_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .ok()
                .filter(|k| !k.is_empty()),

            checkout_currency: env::var("CHECKOUT_CURRENCY")
                .unwrap_or_else(|_| "BOB".to_string()),

            checkout_success_url: env::var("CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|_| "https://rutero.example/pay/success".to_string()),

            checkout_cancel_url: env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| "https://rutero.example/pay/cancel".to_string()),

            provider_timeout_secs: env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PROVIDER_TIMEOUT_SECS".to_string()))?,

            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string()) // 5 minutes
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RECONCILE_INTERVAL_SECS".to_string()))?,
        };

        if config.provider_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PROVIDER_TIMEOUT_SECS".to_string(),
            ));
        }
        if config.reconcile_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "RECONCILE_INTERVAL_SECS".to_string(),
            ));
        }

        Ok(config)
    }

    /// Timeout for provider calls as a Duration.
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Reconciliation period as a Duration.
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

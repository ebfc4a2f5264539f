//! Application-level configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::services::{BillingConfig, ReplicateConfig, SupabaseConfig};
use super::training::{GenerationConfig, RetryConfig, TrainingConfig};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8046
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[validate(range(min = 1_u16))]
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used to build webhook callbacks
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), public_url: None }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write daily-rotated log files under `<data_dir>/logs`
    #[serde(default)]
    pub to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), to_file: false }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Identity, storage and subscriptions backend
    #[serde(default)]
    pub supabase: SupabaseConfig,
    /// Training backend
    #[serde(default)]
    pub replicate: ReplicateConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[validate(nested)]
    #[serde(default)]
    pub training: TrainingConfig,
    #[validate(nested)]
    #[serde(default)]
    pub generation: GenerationConfig,
    #[validate(nested)]
    #[serde(default)]
    pub retry: RetryConfig,
    /// Persist ledger, models and jobs as JSON under the data directory
    #[serde(default = "default_true")]
    pub persist_state: bool,
}

impl AppConfig {
    /// Create default configuration.
    pub fn new() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            supabase: SupabaseConfig::default(),
            replicate: ReplicateConfig::default(),
            billing: BillingConfig::default(),
            training: TrainingConfig::default(),
            generation: GenerationConfig::default(),
            retry: RetryConfig::default(),
            persist_state: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap_or_default();
        assert_eq!(config, AppConfig::new());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let config: Result<AppConfig, _> =
            serde_json::from_str(r#"{"server": {"port": 9000}, "training": {"max_images": 20}}"#);
        let config = config.unwrap_or_default();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.training.max_images, 20);
        assert_eq!(config.training.min_images, 8);
    }
}

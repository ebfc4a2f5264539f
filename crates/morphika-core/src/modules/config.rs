//! Application configuration persistence.
//!
//! The config lives in `config.json` inside the data directory. Missing files
//! yield defaults; every load and save runs the `validator` rules.

use std::fs;
use std::path::Path;

use morphika_types::models::AppConfig;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::modules::paths::get_data_dir;

const CONFIG_FILE: &str = "config.json";

/// Load the application config from the default data directory.
pub fn load_config() -> AppResult<AppConfig> {
    load_config_from(&get_data_dir()?)
}

/// Load the application config from `dir`.
pub fn load_config_from(dir: &Path) -> AppResult<AppConfig> {
    let config_path = dir.join(CONFIG_FILE);

    if !config_path.exists() {
        return Ok(AppConfig::new());
    }

    let content = fs::read_to_string(&config_path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Save the application config to the default data directory.
pub fn save_config(config: &AppConfig) -> AppResult<()> {
    save_config_to(&get_data_dir()?, config)
}

/// Save the application config into `dir`.
pub fn save_config_to(dir: &Path, config: &AppConfig) -> AppResult<()> {
    validate(config)?;

    let config_path = dir.join(CONFIG_FILE);
    let temp_path = dir.join(format!("{}.tmp", CONFIG_FILE));
    let content = serde_json::to_string_pretty(config)?;

    // Atomic write
    if let Err(e) = fs::write(&temp_path, content) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    fs::rename(&temp_path, &config_path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        AppError::Io(e)
    })
}

fn validate(config: &AppConfig) -> AppResult<()> {
    config.validate().map_err(|e| AppError::Config(e.to_string()))
}

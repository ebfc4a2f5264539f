//! Data directory resolution.

use std::fs;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

const DATA_DIR: &str = ".morphika";

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "MORPHIKA_DATA_DIR";

/// Get the data directory path, creating it if needed.
///
/// `MORPHIKA_DATA_DIR` wins over `~/.morphika`.
pub fn get_data_dir() -> AppResult<PathBuf> {
    let data_dir = if let Ok(custom_dir) = std::env::var(DATA_DIR_ENV) {
        PathBuf::from(custom_dir)
    } else {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Config("Cannot get home directory".to_string()))?;
        home.join(DATA_DIR)
    };

    if !data_dir.exists() {
        fs::create_dir_all(&data_dir)?;
    }

    Ok(data_dir)
}

/// Get the state directory used by the JSON repository.
pub fn get_state_dir() -> AppResult<PathBuf> {
    let state_dir = get_data_dir()?.join("state");
    if !state_dir.exists() {
        fs::create_dir_all(&state_dir)?;
    }
    Ok(state_dir)
}

/// Get the log directory.
pub fn get_log_dir() -> AppResult<PathBuf> {
    let log_dir = get_data_dir()?.join("logs");
    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)?;
    }
    Ok(log_dir)
}

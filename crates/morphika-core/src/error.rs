//! Unified error types for Morphika Core.
//!
//! Domain failures (quota, assets, models, training) are expressed with the
//! typed errors from `morphika-types`. `AppError` covers the plumbing around
//! them: files, JSON and configuration.

use thiserror::Error;

/// Main error type for infrastructure operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// File system I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for Morphika infrastructure operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_number(raw: &str) -> AppResult<u32> {
        Ok(serde_json::from_str(raw)?)
    }

    #[test]
    fn test_sources_convert_with_question_mark() {
        assert!(matches!(parse_number("nope"), Err(AppError::Json(_))));

        let io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "config.json").into();
        assert_eq!(io.to_string(), "IO error: config.json");
        assert_eq!(
            AppError::Config("port out of range".to_string()).to_string(),
            "Configuration error: port out of range"
        );
    }
}

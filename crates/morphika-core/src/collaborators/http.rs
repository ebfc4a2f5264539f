//! Shared HTTP plumbing for the REST collaborators.

use std::time::Duration;

use morphika_types::error::CollaboratorError;

use crate::error::{AppError, AppResult};

/// Build the HTTP client used for collaborator calls.
pub fn build_http_client(timeout_secs: u64) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(5)))
        .tcp_nodelay(true)
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Read a required secret from the environment.
pub fn secret_from_env(var: &str) -> AppResult<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(AppError::Config(format!("Environment variable {} is not set", var))),
    }
}

/// Validate a base URL and strip the trailing slash.
pub fn normalize_base_url(raw: &str) -> AppResult<String> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| AppError::Config(format!("Invalid base URL '{}': {}", raw, e)))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// Map a transport failure.
pub fn transport_error(service: &str, error: reqwest::Error) -> CollaboratorError {
    CollaboratorError::unavailable(service, error.to_string())
}

/// Pass successful responses through; turn error statuses into `Rejected`.
pub async fn check_status(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let status_code = status.as_u16();
    let error_text = response.text().await.unwrap_or_else(|_| format!("HTTP {}", status_code));
    Err(CollaboratorError::rejected(service, status_code, truncate(&error_text, 512)))
}

/// Decode a JSON body.
pub async fn read_json<T: serde::de::DeserializeOwned>(
    service: &str,
    response: reqwest::Response,
) -> Result<T, CollaboratorError> {
    response.json::<T>().await.map_err(|e| {
        if e.is_decode() {
            CollaboratorError::invalid_response(service, e.to_string())
        } else {
            transport_error(service, e)
        }
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://x.supabase.co/").unwrap(), "https://x.supabase.co");
        assert!(normalize_base_url("not a url").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}

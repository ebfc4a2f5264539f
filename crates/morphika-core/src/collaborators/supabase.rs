//! Supabase-backed identity, object storage and subscriptions.
//!
//! Talks to the Supabase REST surfaces directly with the service role key:
//! GoTrue (`/auth/v1`), Storage (`/storage/v1`) and PostgREST (`/rest/v1`).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use morphika_types::error::{AuthError, CollaboratorError};
use morphika_types::models::{PlanTier, SupabaseConfig, UserId};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::http::{build_http_client, check_status, read_json, secret_from_env, transport_error};
use super::{BillingProvider, IdentityProvider, ObjectStorage, StoredObject};
use crate::error::{AppError, AppResult};

const AUTH_SERVICE: &str = "supabase-auth";
const STORAGE_SERVICE: &str = "storage";
const BILLING_SERVICE: &str = "billing";
const LIST_PAGE_SIZE: u32 = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
    /// `null` for folder placeholders
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    metadata: Option<ObjectMetadata>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionRow {
    #[serde(default)]
    plan: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

pub struct SupabaseClient {
    http: reqwest::Client,
    base: Url,
    service_key: String,
    bucket: String,
    subscriptions_table: String,
}

impl SupabaseClient {
    pub fn new(
        base_url: &str,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
        subscriptions_table: impl Into<String>,
    ) -> AppResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid Supabase URL '{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(AppError::Config(format!("Invalid Supabase URL '{}'", base_url)));
        }
        Ok(Self {
            http: build_http_client(REQUEST_TIMEOUT_SECS)?,
            base,
            service_key: service_key.into(),
            bucket: bucket.into(),
            subscriptions_table: subscriptions_table.into(),
        })
    }

    /// Build from config, reading the service key from the configured env var.
    pub fn from_config(config: &SupabaseConfig) -> AppResult<Self> {
        let service_key = secret_from_env(&config.service_key_env)?;
        Self::new(&config.url, service_key, &config.bucket, &config.subscriptions_table)
    }

    /// Base URL extended with percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.extend(segment.split('/'));
            }
        }
        url
    }

    fn service_request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn current_user(&self, access_token: &str) -> Result<UserId, AuthError> {
        let token = access_token.trim();
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        let response = self
            .http
            .get(self.endpoint(&["auth/v1/user"]))
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnavailable { message: e.to_string() })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("[Supabase] Access token rejected");
                Err(AuthError::Unauthenticated)
            },
            status if status.is_success() => {
                let user: AuthUser = response
                    .json()
                    .await
                    .map_err(|e| AuthError::ProviderUnavailable { message: e.to_string() })?;
                Ok(UserId::new(user.id))
            },
            status => Err(AuthError::ProviderUnavailable {
                message: format!("{} answered {}", AUTH_SERVICE, status.as_u16()),
            }),
        }
    }
}

#[async_trait]
impl ObjectStorage for SupabaseClient {
    async fn put(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<String, CollaboratorError> {
        let url = self.endpoint(&["storage/v1/object", self.bucket.as_str(), path]);
        let response = self
            .service_request(reqwest::Method::POST, url)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .header("cache-control", "3600")
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport_error(STORAGE_SERVICE, e))?;
        check_status(STORAGE_SERVICE, response).await?;

        debug!("[Supabase] Stored {}", path);
        Ok(self.public_url(path))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, CollaboratorError> {
        let url = self.endpoint(&["storage/v1/object/list", self.bucket.as_str()]);
        let body = json!({
            "prefix": prefix.trim_end_matches('/'),
            "limit": LIST_PAGE_SIZE,
            "offset": 0,
            "sortBy": { "column": "name", "order": "asc" },
        });
        let response = self
            .service_request(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(STORAGE_SERVICE, e))?;
        let response = check_status(STORAGE_SERVICE, response).await?;
        let entries: Vec<ObjectEntry> = read_json(STORAGE_SERVICE, response).await?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.id.is_some())
            .map(|entry| StoredObject {
                name: entry.name,
                size_bytes: entry.metadata.and_then(|m| m.size),
                updated_at: entry
                    .updated_at
                    .as_deref()
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|ts| ts.with_timezone(&Utc)),
            })
            .collect())
    }

    fn public_url(&self, path: &str) -> String {
        self.endpoint(&["storage/v1/object/public", self.bucket.as_str(), path]).to_string()
    }

    async fn remove(&self, path: &str) -> Result<(), CollaboratorError> {
        let url = self.endpoint(&["storage/v1/object", self.bucket.as_str()]);
        let response = self
            .service_request(reqwest::Method::DELETE, url)
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await
            .map_err(|e| transport_error(STORAGE_SERVICE, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("[Supabase] {} already absent", path);
            return Ok(());
        }
        check_status(STORAGE_SERVICE, response).await?;
        Ok(())
    }
}

#[async_trait]
impl BillingProvider for SupabaseClient {
    async fn plan_for(&self, user_id: &UserId) -> Result<Option<PlanTier>, CollaboratorError> {
        let mut url = self.endpoint(&["rest/v1", self.subscriptions_table.as_str()]);
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{}", user_id))
            .append_pair("select", "plan,status")
            .append_pair("limit", "1");

        let response = self
            .service_request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| transport_error(BILLING_SERVICE, e))?;
        let response = check_status(BILLING_SERVICE, response).await?;
        let rows: Vec<SubscriptionRow> = read_json(BILLING_SERVICE, response).await?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        if let Some(status) = row.status.as_deref() {
            if !matches!(status, "active" | "trialing") {
                debug!("[Supabase] Subscription for {} is {}", user_id, status);
                return Ok(None);
            }
        }
        let Some(plan) = row.plan else {
            return Ok(None);
        };
        plan.parse::<PlanTier>().map(Some).map_err(|e| {
            warn!("[Supabase] Unknown plan '{}' for {}", plan, user_id);
            CollaboratorError::invalid_response(BILLING_SERVICE, e)
        })
    }
}

//! External collaborator endpoints. Secrets are read from the environment
//! variables named here, never stored in the config file.

use serde::{Deserialize, Serialize};

use crate::models::PlanTier;

fn default_bucket() -> String {
    "morphika-images".to_string()
}

fn default_service_key_env() -> String {
    "SUPABASE_SERVICE_KEY".to_string()
}

fn default_subscriptions_table() -> String {
    "subscriptions".to_string()
}

fn default_replicate_url() -> String {
    "https://api.replicate.com".to_string()
}

fn default_replicate_token_env() -> String {
    "REPLICATE_API_TOKEN".to_string()
}

fn default_trainer_owner() -> String {
    "ostris".to_string()
}

fn default_trainer_model() -> String {
    "flux-dev-lora-trainer".to_string()
}

fn default_trainer_version() -> String {
    "b6af14222e6bd9be257cbc1ea4afda3cd0503e1133083b9d1de0364d8568e6ef".to_string()
}

fn default_generation_version() -> String {
    "flux-dev-image-generation".to_string()
}

fn default_destination_owner() -> String {
    "morphika".to_string()
}

fn default_billing_secret_env() -> String {
    "MORPHIKA_BILLING_SECRET".to_string()
}

/// Supabase project used for auth, object storage and subscriptions.
///
/// An empty `url` selects the in-memory collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_service_key_env")]
    pub service_key_env: String,
    #[serde(default = "default_subscriptions_table")]
    pub subscriptions_table: String,
}

impl SupabaseConfig {
    pub fn is_enabled(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            bucket: default_bucket(),
            service_key_env: default_service_key_env(),
            subscriptions_table: default_subscriptions_table(),
        }
    }
}

/// Replicate trainer selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicateConfig {
    /// Use the in-memory backend when false
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_replicate_url")]
    pub base_url: String,
    #[serde(default = "default_replicate_token_env")]
    pub token_env: String,
    #[serde(default = "default_trainer_owner")]
    pub owner: String,
    #[serde(default = "default_trainer_model")]
    pub model: String,
    #[serde(default = "default_trainer_version")]
    pub version: String,
    /// Account that receives trained weights
    #[serde(default = "default_destination_owner")]
    pub destination_owner: String,
    /// Model version that runs predictions against trained weights
    #[serde(default = "default_generation_version")]
    pub generation_version: String,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_replicate_url(),
            token_env: default_replicate_token_env(),
            owner: default_trainer_owner(),
            model: default_trainer_model(),
            version: default_trainer_version(),
            destination_owner: default_destination_owner(),
            generation_version: default_generation_version(),
        }
    }
}

/// Billing integration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillingConfig {
    /// Tier assumed for users without a subscription record
    #[serde(default)]
    pub default_tier: PlanTier,
    /// Shared secret expected on billing event callbacks
    #[serde(default = "default_billing_secret_env")]
    pub webhook_secret_env: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self { default_tier: PlanTier::Starter, webhook_secret_env: default_billing_secret_env() }
    }
}

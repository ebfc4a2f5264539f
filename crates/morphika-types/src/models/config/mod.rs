//! Application and collaborator configuration models.

mod app;
mod services;
mod training;

pub use app::{AppConfig, LoggingConfig, ServerConfig};
pub use services::{BillingConfig, ReplicateConfig, SupabaseConfig};
pub use training::{GenerationConfig, RetryConfig, TrainingConfig};

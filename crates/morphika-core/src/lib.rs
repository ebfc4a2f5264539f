//! # Morphika Core
//!
//! Core business logic for the Morphika model studio.
//!
//! ## Architecture
//!
//! ```text
//! morphika-core/src/
//! ├── modules/
//! │   ├── plan_catalog.rs   # tier -> resource limits
//! │   ├── quota.rs          # per-user ledger, atomic reserve/release
//! │   ├── assets.rs         # training images in object storage
//! │   ├── models.rs         # named models and their training state
//! │   ├── training/         # orchestrator + poller
//! │   ├── generation.rs     # predictions from trained weights
//! │   ├── studio.rs         # facade used by the HTTP API
//! │   ├── repository.rs     # persistence trait
//! │   └── json_store.rs     # file-backed repository
//! └── collaborators/        # identity, storage, training, generation, billing
//!     ├── supabase.rs
//!     ├── replicate.rs
//!     └── memory.rs
//! ```
//!
//! Ownership of units is strict: every model, asset and submitted training
//! holds exactly one unit in the quota ledger, and every failure path that
//! does not end in such a record gives its unit back.

#![allow(
    clippy::significant_drop_tightening,
    reason = "DashMap guards are scoped explicitly before every await"
)]
#![allow(clippy::map_err_ignore, reason = "Error context is provided in the replacement message")]
#![allow(
    clippy::cast_possible_truncation,
    clippy::as_conversions,
    reason = "millisecond and byte counts fit comfortably in u64/i64"
)]
// Test-only lints: allow panic!, println!, etc. in test code
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::needless_collect,
        clippy::assertions_on_result_states
    )
)]

pub mod collaborators;
pub mod error;
pub mod modules;

// Re-export commonly used types
pub use collaborators::{
    BillingProvider, Collaborators, IdentityProvider, ImageGenerator, ObjectStorage, StoredObject,
    TrainingBackend,
};
pub use error::{AppError, AppResult};
pub use modules::assets::{AssetRegistry, ReconcileReport};
pub use modules::generation::GenerationService;
pub use modules::json_store::JsonRepository;
pub use modules::models::ModelRegistry;
pub use modules::quota::QuotaLedger;
pub use modules::repository::{RepositoryError, StateRepository};
pub use modules::studio::{RestoreReport, Studio, StudioStats};
pub use modules::training::{SweepReport, TrainingOrchestrator, TrainingPoller};

//! Application State
//!
//! Holds the studio and the settings the HTTP layer needs next to it.

use std::sync::Arc;
use std::time::Instant;

use morphika_core::{Studio, StudioStats, TrainingPoller};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub(crate) inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub studio: Arc<Studio>,
    /// Expected value of the billing callback header; `None` rejects every callback
    pub billing_secret: Option<String>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(studio: Arc<Studio>, billing_secret: Option<String>) -> Self {
        let billing_secret = billing_secret.filter(|s| !s.trim().is_empty());
        if billing_secret.is_none() {
            tracing::warn!("⚠️ No billing webhook secret configured, billing events will be rejected");
        }
        Self {
            inner: Arc::new(AppStateInner { studio, billing_secret, started_at: Instant::now() }),
        }
    }

    pub fn studio(&self) -> &Studio {
        &self.inner.studio
    }

    pub fn billing_secret(&self) -> Option<&str> {
        self.inner.billing_secret.as_deref()
    }

    pub fn stats(&self) -> StudioStats {
        self.inner.studio.stats()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    pub fn training_poller(&self) -> TrainingPoller {
        TrainingPoller::new(self.inner.studio.training().clone())
    }
}

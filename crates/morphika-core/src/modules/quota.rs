//! Per-user quota ledger.
//!
//! Each account sits behind its own `tokio::sync::Mutex`, so reservations for
//! different users never contend and reservations for the same user are
//! serialized. The check-and-increment happens under that lock, and so does the
//! write-through to the repository. No lock is held across calls to external
//! collaborators: callers reserve first, call out, then keep or release.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use morphika_types::error::QuotaError;
use morphika_types::models::{PlanTier, Resource, UsageSnapshot, UserAccount, UserId};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::plan_catalog::limits_for;
use super::repository::StateRepository;

pub struct QuotaLedger {
    accounts: DashMap<UserId, Arc<Mutex<UserAccount>>>,
    repository: Option<Arc<dyn StateRepository>>,
}

fn snapshot(account: &UserAccount) -> UsageSnapshot {
    UsageSnapshot::new(account.tier, account.consumed, limits_for(account.tier))
}

impl QuotaLedger {
    pub fn new(repository: Option<Arc<dyn StateRepository>>) -> Self {
        Self { accounts: DashMap::new(), repository }
    }

    /// Replace in-memory state with previously persisted accounts.
    pub fn restore(&self, accounts: Vec<UserAccount>) {
        self.accounts.clear();
        for account in accounts {
            self.accounts.insert(account.user_id.clone(), Arc::new(Mutex::new(account)));
        }
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.accounts.contains_key(user_id)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    fn handle(&self, user_id: &UserId) -> Result<Arc<Mutex<UserAccount>>, QuotaError> {
        self.accounts
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| QuotaError::AccountNotFound { user_id: user_id.to_string() })
    }

    /// Create the account with zero usage if it does not exist yet.
    ///
    /// An existing account keeps its tier and counters.
    pub async fn open_account(&self, user_id: &UserId, tier: PlanTier) -> UsageSnapshot {
        let (handle, created) = match self.accounts.entry(user_id.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let handle = Arc::new(Mutex::new(UserAccount::new(user_id.clone(), tier)));
                entry.insert(handle.clone());
                (handle, true)
            },
        };

        let account = handle.lock().await;
        if created {
            info!("[QuotaLedger] Opened account {} on {} plan", user_id, tier);
            self.persist(&account).await;
        }
        snapshot(&account)
    }

    /// Atomically check `consumed + count <= limit` and record the consumption.
    pub async fn reserve(
        &self,
        user_id: &UserId,
        resource: Resource,
        count: u32,
    ) -> Result<(), QuotaError> {
        let handle = self.handle(user_id)?;
        let mut account = handle.lock().await;

        let limit = limits_for(account.tier).limit(resource);
        let consumed = account.consumed.get(resource);
        let total = consumed.checked_add(count).filter(|total| *total <= limit);

        let Some(total) = total else {
            debug!(
                "[QuotaLedger] Denied {} x{} for {} ({}/{})",
                resource, count, user_id, consumed, limit
            );
            return Err(QuotaError::Exceeded { resource, requested: count, consumed, limit });
        };

        *account.consumed.get_mut(resource) = total;
        account.touch();
        self.persist(&account).await;

        debug!("[QuotaLedger] Reserved {} x{} for {} ({}/{})", resource, count, user_id, total, limit);
        Ok(())
    }

    /// Return previously reserved units. Never drops a counter below zero.
    pub async fn release(&self, user_id: &UserId, resource: Resource, count: u32) {
        let Ok(handle) = self.handle(user_id) else {
            warn!("[QuotaLedger] Release of {} x{} for unknown user {}", resource, count, user_id);
            return;
        };
        let mut account = handle.lock().await;

        let consumed = account.consumed.get(resource);
        if consumed < count {
            warn!(
                "[QuotaLedger] Release of {} x{} exceeds consumption {} for {}",
                resource, count, consumed, user_id
            );
        }
        *account.consumed.get_mut(resource) = consumed.saturating_sub(count);
        account.touch();
        self.persist(&account).await;

        debug!("[QuotaLedger] Released {} x{} for {}", resource, count, user_id);
    }

    pub async fn usage(&self, user_id: &UserId) -> Result<UsageSnapshot, QuotaError> {
        let handle = self.handle(user_id)?;
        let account = handle.lock().await;
        Ok(snapshot(&account))
    }

    /// Move the account to `tier`, opening it if needed.
    ///
    /// Counters are left untouched. After a downgrade the account may sit above
    /// its new limits; further reservations of that resource fail until usage
    /// drops back under the limit.
    pub async fn set_tier(&self, user_id: &UserId, tier: PlanTier) -> UsageSnapshot {
        let handle = match self.handle(user_id) {
            Ok(handle) => handle,
            Err(_) => return self.open_account(user_id, tier).await,
        };
        let mut account = handle.lock().await;

        if account.tier != tier {
            info!("[QuotaLedger] {} moved from {} to {}", user_id, account.tier, tier);
            account.tier = tier;
            account.touch();
            self.persist(&account).await;
        }

        let usage = snapshot(&account);
        if !usage.is_within_limits() {
            warn!("[QuotaLedger] {} is above the {} limits after tier change", user_id, tier);
        }
        usage
    }

    /// Start a new billing period: training attempts are granted afresh.
    pub async fn reset_period(&self, user_id: &UserId) -> Result<UsageSnapshot, QuotaError> {
        let handle = self.handle(user_id)?;
        let mut account = handle.lock().await;

        account.consumed.trainings = 0;
        account.touch();
        self.persist(&account).await;

        info!("[QuotaLedger] Training allowance renewed for {}", user_id);
        Ok(snapshot(&account))
    }

    async fn persist(&self, account: &UserAccount) {
        if let Some(repository) = &self.repository {
            if let Err(e) = repository.save_account(account).await {
                error!("[QuotaLedger] Failed to persist account {}: {}", account.user_id, e);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[tokio::test]
    async fn test_open_account_starts_empty() {
        let ledger = QuotaLedger::new(None);
        let usage = ledger.open_account(&user("u1"), PlanTier::Starter).await;

        assert_eq!(usage.tier, PlanTier::Starter);
        assert_eq!(usage.consumed.models, 0);
        assert_eq!(usage.remaining.photos, 50);
        assert!(ledger.contains(&user("u1")));
    }

    #[tokio::test]
    async fn test_open_account_keeps_existing_state() {
        let ledger = QuotaLedger::new(None);
        ledger.open_account(&user("u1"), PlanTier::Pro).await;
        ledger.reserve(&user("u1"), Resource::Models, 2).await.unwrap();

        let usage = ledger.open_account(&user("u1"), PlanTier::Starter).await;
        assert_eq!(usage.tier, PlanTier::Pro);
        assert_eq!(usage.consumed.models, 2);
    }

    #[tokio::test]
    async fn test_reserve_up_to_limit() {
        let ledger = QuotaLedger::new(None);
        ledger.open_account(&user("u1"), PlanTier::Starter).await;

        for _ in 0..5 {
            ledger.reserve(&user("u1"), Resource::Models, 1).await.unwrap();
        }
        let err = ledger.reserve(&user("u1"), Resource::Models, 1).await.unwrap_err();
        assert_eq!(
            err,
            QuotaError::Exceeded { resource: Resource::Models, requested: 1, consumed: 5, limit: 5 }
        );
        assert_eq!(ledger.usage(&user("u1")).await.unwrap().consumed.models, 5);
    }

    #[tokio::test]
    async fn test_bulk_reserve_is_all_or_nothing() {
        let ledger = QuotaLedger::new(None);
        ledger.open_account(&user("u1"), PlanTier::Starter).await;
        ledger.reserve(&user("u1"), Resource::Photos, 45).await.unwrap();

        assert!(ledger.reserve(&user("u1"), Resource::Photos, 6).await.is_err());
        assert_eq!(ledger.usage(&user("u1")).await.unwrap().consumed.photos, 45);
        ledger.reserve(&user("u1"), Resource::Photos, 5).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let ledger = QuotaLedger::new(None);
        let err = ledger.reserve(&user("ghost"), Resource::Models, 1).await.unwrap_err();
        assert!(matches!(err, QuotaError::AccountNotFound { .. }));

        // Releasing for an unknown user is a logged no-op.
        ledger.release(&user("ghost"), Resource::Models, 1).await;
        assert!(!ledger.contains(&user("ghost")));
    }

    #[tokio::test]
    async fn test_release_saturates_at_zero() {
        let ledger = QuotaLedger::new(None);
        ledger.open_account(&user("u1"), PlanTier::Starter).await;
        ledger.reserve(&user("u1"), Resource::Trainings, 1).await.unwrap();

        ledger.release(&user("u1"), Resource::Trainings, 3).await;
        assert_eq!(ledger.usage(&user("u1")).await.unwrap().consumed.trainings, 0);
    }

    #[tokio::test]
    async fn test_downgrade_blocks_further_reservations() {
        let ledger = QuotaLedger::new(None);
        ledger.open_account(&user("u1"), PlanTier::Team).await;
        ledger.reserve(&user("u1"), Resource::Models, 8).await.unwrap();

        let usage = ledger.set_tier(&user("u1"), PlanTier::Starter).await;
        assert_eq!(usage.consumed.models, 8);
        assert_eq!(usage.remaining.models, 0);
        assert!(!usage.is_within_limits());
        assert!(ledger.reserve(&user("u1"), Resource::Models, 1).await.is_err());

        for _ in 0..4 {
            ledger.release(&user("u1"), Resource::Models, 1).await;
        }
        assert!(ledger.reserve(&user("u1"), Resource::Models, 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_period_only_clears_trainings() {
        let ledger = QuotaLedger::new(None);
        ledger.open_account(&user("u1"), PlanTier::Starter).await;
        ledger.reserve(&user("u1"), Resource::Trainings, 5).await.unwrap();
        ledger.reserve(&user("u1"), Resource::Photos, 10).await.unwrap();

        let usage = ledger.reset_period(&user("u1")).await.unwrap();
        assert_eq!(usage.consumed.trainings, 0);
        assert_eq!(usage.consumed.photos, 10);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_overshoot() {
        let ledger = Arc::new(QuotaLedger::new(None));
        ledger.open_account(&user("u1"), PlanTier::Starter).await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve(&user("u1"), Resource::Models, 1).await.is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
        assert_eq!(ledger.usage(&user("u1")).await.unwrap().consumed.models, 5);
    }
}

//! User account and usage models.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::plan::{PlanTier, Resource, ResourceLimits};

/// Opaque user identifier issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One counter per [`Resource`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResourceCounts {
    pub models: u32,
    pub photos: u32,
    pub trainings: u32,
}

impl ResourceCounts {
    pub const fn get(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Models => self.models,
            Resource::Photos => self.photos,
            Resource::Trainings => self.trainings,
        }
    }

    pub fn get_mut(&mut self, resource: Resource) -> &mut u32 {
        match resource {
            Resource::Models => &mut self.models,
            Resource::Photos => &mut self.photos,
            Resource::Trainings => &mut self.trainings,
        }
    }
}

/// Ledger record for a single user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccount {
    pub user_id: UserId,
    pub tier: PlanTier,
    #[serde(default)]
    pub consumed: ResourceCounts,
    /// Unix timestamp of the last committed mutation
    #[serde(default)]
    pub updated_at: i64,
}

impl UserAccount {
    pub fn new(user_id: UserId, tier: PlanTier) -> Self {
        Self {
            user_id,
            tier,
            consumed: ResourceCounts::default(),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp();
    }
}

/// Read-only usage projection for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub tier: PlanTier,
    pub consumed: ResourceCounts,
    pub limits: ResourceLimits,
    pub remaining: ResourceCounts,
}

impl UsageSnapshot {
    pub fn new(tier: PlanTier, consumed: ResourceCounts, limits: ResourceLimits) -> Self {
        let remaining = ResourceCounts {
            models: limits.max_models.saturating_sub(consumed.models),
            photos: limits.max_photos.saturating_sub(consumed.photos),
            trainings: limits.max_trainings.saturating_sub(consumed.trainings),
        };
        Self { tier, consumed, limits, remaining }
    }

    /// False after a downgrade left the account above its new limits.
    pub fn is_within_limits(&self) -> bool {
        Resource::ALL.iter().all(|r| self.consumed.get(*r) <= self.limits.limit(*r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_saturates() {
        let limits = ResourceLimits { max_models: 5, max_photos: 50, max_trainings: 5 };
        let consumed = ResourceCounts { models: 6, photos: 8, trainings: 1 };
        let snapshot = UsageSnapshot::new(PlanTier::Starter, consumed, limits);

        assert_eq!(snapshot.remaining.models, 0);
        assert_eq!(snapshot.remaining.photos, 42);
        assert_eq!(snapshot.remaining.trainings, 4);
        assert!(!snapshot.is_within_limits());
    }

    #[test]
    fn test_user_id_is_transparent() {
        let id = UserId::from("u-123");
        assert_eq!(serde_json::to_string(&id).ok().as_deref(), Some("\"u-123\""));
    }
}

//! Notifications from the billing collaborator.

use serde::{Deserialize, Serialize};

use super::{PlanTier, UserId};

/// Billing-side change that the quota ledger has to follow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    /// The user's subscription moved to another tier.
    TierChanged { user_id: UserId, tier: PlanTier },
    /// A new billing period started; training attempts are granted afresh.
    PeriodRenewed { user_id: UserId },
}

impl BillingEvent {
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::TierChanged { user_id, .. } | Self::PeriodRenewed { user_id } => user_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event: BillingEvent =
            serde_json::from_str(r#"{"type":"tier_changed","user_id":"u-1","tier":"pro"}"#).unwrap();
        assert_eq!(
            event,
            BillingEvent::TierChanged { user_id: UserId::new("u-1"), tier: PlanTier::Pro }
        );

        let event: BillingEvent =
            serde_json::from_str(r#"{"type":"period_renewed","user_id":"u-2"}"#).unwrap();
        assert_eq!(event.user_id().as_str(), "u-2");
    }
}

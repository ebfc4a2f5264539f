//! Static plan catalog: tier to resource limits.

use morphika_types::models::{PlanEntry, PlanTier, ResourceLimits};

/// Limits for `tier`. Total over all tiers.
pub const fn limits_for(tier: PlanTier) -> ResourceLimits {
    match tier {
        PlanTier::Starter => ResourceLimits { max_models: 5, max_photos: 50, max_trainings: 5 },
        PlanTier::Team => ResourceLimits { max_models: 20, max_photos: 200, max_trainings: 20 },
        PlanTier::Pro => ResourceLimits { max_models: 50, max_photos: 500, max_trainings: 50 },
        PlanTier::Business => {
            ResourceLimits { max_models: 200, max_photos: 2000, max_trainings: 200 }
        },
    }
}

/// All tiers in ascending order.
pub fn catalog() -> Vec<PlanEntry> {
    PlanTier::ALL.iter().map(|&tier| PlanEntry { tier, limits: limits_for(tier) }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use morphika_types::models::Resource;

    #[test]
    fn test_starter_limits() {
        let limits = limits_for(PlanTier::Starter);
        assert_eq!(limits.max_models, 5);
        assert_eq!(limits.max_photos, 50);
        assert_eq!(limits.max_trainings, 5);
    }

    #[test]
    fn test_higher_tiers_never_grant_less() {
        let entries = catalog();
        assert_eq!(entries.len(), 4);
        for pair in entries.windows(2) {
            for resource in Resource::ALL {
                assert!(pair[0].limits.limit(resource) <= pair[1].limits.limit(resource));
            }
        }
    }
}

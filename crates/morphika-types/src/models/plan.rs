//! Subscription plans and the resources they limit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription tier, supplied by the billing collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Starter,
    Team,
    Pro,
    Business,
}

impl PlanTier {
    pub const ALL: [Self; 4] = [Self::Starter, Self::Team, Self::Pro, Self::Business];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Team => "team",
            Self::Pro => "pro",
            Self::Business => "business",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    /// Billing records use display names ("Starter", "PRO"), so matching ignores case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starter" | "start" => Ok(Self::Starter),
            "team" => Ok(Self::Team),
            "pro" => Ok(Self::Pro),
            "business" => Ok(Self::Business),
            other => Err(format!("unknown plan tier: {other}")),
        }
    }
}

/// Counted resource kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Models,
    Photos,
    Trainings,
}

impl Resource {
    pub const ALL: [Self; 3] = [Self::Models, Self::Photos, Self::Trainings];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Models => "models",
            Self::Photos => "photos",
            Self::Trainings => "trainings",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tier resource ceilings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_models: u32,
    pub max_photos: u32,
    pub max_trainings: u32,
}

impl ResourceLimits {
    pub const fn limit(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Models => self.max_models,
            Resource::Photos => self.max_photos,
            Resource::Trainings => self.max_trainings,
        }
    }
}

/// One row of the plan catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanEntry {
    pub tier: PlanTier,
    pub limits: ResourceLimits,
}

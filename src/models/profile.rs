//! Marketplace listings and their identity verification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    /// Created, never paid for
    Draft,
    /// Visible in public listings
    Active,
    /// Hidden by its owner, plan keeps running
    Paused,
    /// Plan ran out
    Expired,
}

impl ProfileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Expired => "expired",
        }
    }
}

/// Plan currently purchased against a profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanAssignment {
    pub plan_id: Uuid,
    pub plan_name: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PlanAssignment {
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Add-on purchased against a profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpgradeAssignment {
    pub upgrade_id: Uuid,
    pub upgrade_name: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    /// Unique, derived from the display name
    pub slug: String,
    pub bio: String,
    pub category: String,
    pub city: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub status: ProfileStatus,
    #[serde(default)]
    pub plan: Option<PlanAssignment>,
    #[serde(default)]
    pub upgrades: Vec<UpgradeAssignment>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    /// Plan that has not yet expired
    pub fn current_plan(&self, now: DateTime<Utc>) -> Option<&PlanAssignment> {
        self.plan.as_ref().filter(|p| p.is_current(now))
    }

    /// Case-insensitive match on name, bio and category
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.display_name.to_lowercase().contains(&query)
            || self.bio.to_lowercase().contains(&query)
            || self.category.to_lowercase().contains(&query)
    }
}

// ============================================
// Verification
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    Identity,
    Selfie,
    Phone,
}

impl VerificationKind {
    pub const ALL: [VerificationKind; 3] = [Self::Identity, Self::Selfie, Self::Phone];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "identity" => Some(Self::Identity),
            "selfie" => Some(Self::Selfie),
            "phone" => Some(Self::Phone),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Submitted,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationStep {
    pub kind: VerificationKind,
    pub status: StepStatus,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileVerification {
    pub id: Uuid,
    /// One verification document per profile
    pub profile_id: Uuid,
    pub status: VerificationStatus,
    pub steps: Vec<VerificationStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileVerification {
    pub fn new(profile_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_id,
            status: VerificationStatus::Pending,
            steps: VerificationKind::ALL
                .iter()
                .map(|&kind| VerificationStep {
                    kind,
                    status: StepStatus::Pending,
                    evidence: None,
                    note: None,
                    updated_at: now,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step_mut(&mut self, kind: VerificationKind) -> Option<&mut VerificationStep> {
        self.steps.iter_mut().find(|s| s.kind == kind)
    }

    /// Verified when every step is approved, rejected when any step is
    pub fn recompute_status(&mut self) -> VerificationStatus {
        self.status = if self.steps.iter().any(|s| s.status == StepStatus::Rejected) {
            VerificationStatus::Rejected
        } else if self.steps.iter().all(|s| s.status == StepStatus::Approved) {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Pending
        };
        self.status
    }
}

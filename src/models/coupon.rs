//! Discount codes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    /// `value` is a percentage in (0, 100]
    Percentage,
    /// `value` is subtracted from the price
    FixedAmount,
    /// Grants `assigned_plan_id` for free; never discounts a price
    PlanAssignment,
}

impl CouponType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::FixedAmount => "fixed_amount",
            Self::PlanAssignment => "plan_assignment",
        }
    }

    pub fn is_discount(&self) -> bool {
        !matches!(self, Self::PlanAssignment)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    /// Uppercased, unique
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: CouponType,
    pub value: f64,
    /// Empty means every paid plan is eligible
    #[serde(default)]
    pub valid_plan_ids: Vec<Uuid>,
    /// Upgrades are only discounted when listed here
    #[serde(default)]
    pub valid_upgrade_ids: Vec<Uuid>,
    #[serde(default)]
    pub assigned_plan_id: Option<Uuid>,
    /// Overrides the assigned plan's duration
    #[serde(default)]
    pub assigned_days: Option<u32>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub used_count: u32,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_exhausted(&self) -> bool {
        self.max_uses.map_or(false, |max| self.used_count >= max)
    }
}

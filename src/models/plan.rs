//! Subscription plans and their add-on upgrades

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Add-on purchasable on top of a plan (featured placement, extra photos, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Upgrade {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub price: f64,
    pub duration_days: u32,
}

impl Upgrade {
    pub fn is_free(&self) -> bool {
        self.price <= 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    /// Lowercased, unique
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub duration_days: u32,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub upgrades: Vec<Upgrade>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Zero-price plans can never be discounted
    pub fn is_free(&self) -> bool {
        self.price <= 0.0
    }

    pub fn upgrade(&self, upgrade_id: Uuid) -> Option<&Upgrade> {
        self.upgrades.iter().find(|u| u.id == upgrade_id)
    }
}

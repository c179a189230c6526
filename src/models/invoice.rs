//! Invoices produced by checkout

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Plan,
    Upgrade,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceItem {
    pub kind: ItemKind,
    /// Plan id or upgrade id
    pub ref_id: Uuid,
    pub description: String,
    pub unit_price: f64,
    pub discount: f64,
    pub amount: f64,
    pub duration_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    /// `INV-YYYYMM-NNNNNN`, unique
    pub number: String,
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub items: Vec<InvoiceItem>,
    pub subtotal: f64,
    pub discount: f64,
    pub total: f64,
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Coupon consumed on payment; survives a later rename of its code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_id: Option<Uuid>,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn format_number(now: DateTime<Utc>, seq: u64) -> String {
        format!("INV-{}-{:06}", now.format("%Y%m"), seq)
    }

    /// Sequence part of an invoice number
    pub fn parse_sequence(number: &str) -> Option<u64> {
        number.rsplit('-').next()?.parse().ok()
    }
}

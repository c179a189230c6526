//! CMS pages and runtime configuration parameters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::{AppError, AppResult};
use crate::utils::constants::{
    MAX_TTL_HOURS, SETTING_DRAFT_TTL_HOURS, SETTING_MAX_PROFILES_PER_USER,
    SETTING_PENDING_INVOICE_TTL_HOURS,
};

/// Static content page (terms, FAQ, landing copy)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPage {
    pub id: Uuid,
    /// Unique
    pub slug: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub section: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Generic key/value setting editable from the admin dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigParameter {
    pub id: Uuid,
    /// Unique
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Exposed on the unauthenticated `/api/config` endpoint
    pub is_public: bool,
    pub updated_at: DateTime<Utc>,
}

/// JSON numbers and numeric strings
fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ConfigParameter {
    pub fn as_u64(&self) -> Option<u64> {
        value_as_u64(&self.value)
    }

    /// Reject values the services reading `key` could not use.
    /// Unknown keys are free-form.
    pub fn check_value(key: &str, value: &Value) -> AppResult<()> {
        let max = match key {
            SETTING_DRAFT_TTL_HOURS | SETTING_PENDING_INVOICE_TTL_HOURS => MAX_TTL_HOURS,
            SETTING_MAX_PROFILES_PER_USER => u32::MAX as u64,
            _ => return Ok(()),
        };
        match value_as_u64(value) {
            Some(n) if (1..=max).contains(&n) => Ok(()),
            _ => Err(AppError::validation(format!(
                "{} must be a whole number between 1 and {}",
                key, max
            ))),
        }
    }
}

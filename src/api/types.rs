//! API Request/Response Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::core::{CleanupStatus, Quote};
use crate::models::{AppError, CouponType, Role, UserView};
use crate::utils::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn error(error: AppError) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(error.message.clone()),
            error: Some(ApiError::from(&error)),
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Success without a payload
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            error: None,
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// API Error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&AppError> for ApiError {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

// ============================================
// Pagination
// ============================================

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl PageQuery {
    /// 1-based page and a limit clamped to `MAX_PAGE_SIZE`
    pub fn bounds(&self) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

impl<T: Serialize> Page<T> {
    pub fn slice(all: Vec<T>, query: &PageQuery) -> Self {
        let (page, limit) = query.bounds();
        let total = all.len();
        let items = all
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(limit))
            .take(limit)
            .collect();
        Self {
            items,
            total,
            page,
            limit,
        }
    }
}

// ============================================
// Health
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

// ============================================
// Auth & account
// ============================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleSignInRequest {
    pub id_token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionData {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub image: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

// ============================================
// Profiles
// ============================================

#[derive(Debug, Default, Deserialize)]
pub struct ProfileListQuery {
    pub category: Option<String>,
    pub city: Option<String>,
    pub q: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl ProfileListQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitStepRequest {
    pub evidence: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewStepRequest {
    pub approved: bool,
    #[serde(default)]
    pub note: Option<String>,
}

// ============================================
// Catalog
// ============================================

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    /// Keeps the id stable when editing an existing upgrade
    #[serde(default)]
    pub id: Option<Uuid>,
    pub code: String,
    pub name: String,
    pub price: f64,
    pub duration_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub duration_days: u32,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub upgrades: Vec<UpgradeRequest>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CouponRequest {
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: CouponType,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub valid_plan_ids: Vec<Uuid>,
    #[serde(default)]
    pub valid_upgrade_ids: Vec<Uuid>,
    #[serde(default)]
    pub assigned_plan_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_days: Option<u32>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct CouponValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
}

// ============================================
// Invoices
// ============================================

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceListQuery {
    pub status: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

// ============================================
// Content & settings
// ============================================

#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfigParameterRequest {
    pub value: serde_json::Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

// ============================================
// Dashboard
// ============================================

#[derive(Debug, Serialize)]
pub struct DashboardData {
    pub users: usize,
    pub admins: usize,
    pub profiles: usize,
    pub profiles_by_status: BTreeMap<String, usize>,
    pub verified_profiles: usize,
    pub invoices_by_status: BTreeMap<String, usize>,
    pub revenue: f64,
    pub active_coupons: usize,
    pub cleanup: CleanupStatus,
}

fn default_true() -> bool {
    true
}

//! Plans, upgrades and coupons

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{created, done, ok, ApiResult, AppState};
use crate::api::extract::{AdminUser, ApiJson, ApiPath, CurrentUser, MaybeUser};
use crate::api::types::{ApiResponse, CouponRequest, CouponValidation, PlanRequest};
use crate::core::checkout::{self, CheckoutRequest};
use crate::core::coupon::validate_coupon_definition;
use crate::models::{AppError, AppResult, Coupon, ErrorCode, Plan, Upgrade};
use crate::utils::helpers::{normalize_code, normalize_key};

// ============================================
// Plans
// ============================================

fn check_price(price: f64, what: &str) -> AppResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::validation(format!("{} price must be zero or positive", what)));
    }
    Ok(())
}

/// Validate a plan request into a document; `existing` keeps id and timestamps
fn build_plan(req: PlanRequest, existing: Option<&Plan>) -> AppResult<Plan> {
    let code = normalize_key(&req.code);
    let name = req.name.trim().to_string();
    if code.is_empty() || name.is_empty() {
        return Err(AppError::validation("Plan code and name are required"));
    }
    check_price(req.price, "Plan")?;
    if req.duration_days == 0 {
        return Err(AppError::validation("Plan duration_days must be positive"));
    }

    let mut codes = HashSet::new();
    let mut upgrades = Vec::with_capacity(req.upgrades.len());
    for upgrade in req.upgrades {
        let upgrade_code = normalize_key(&upgrade.code);
        if upgrade_code.is_empty() || upgrade.name.trim().is_empty() {
            return Err(AppError::validation("Upgrade code and name are required"));
        }
        if !codes.insert(upgrade_code.clone()) {
            return Err(AppError::validation(format!("Duplicate upgrade code '{}'", upgrade_code)));
        }
        check_price(upgrade.price, "Upgrade")?;
        if upgrade.duration_days == 0 {
            return Err(AppError::validation("Upgrade duration_days must be positive"));
        }
        upgrades.push(Upgrade {
            id: upgrade.id.unwrap_or_else(Uuid::new_v4),
            code: upgrade_code,
            name: upgrade.name.trim().to_string(),
            price: upgrade.price,
            duration_days: upgrade.duration_days,
        });
    }

    let now = Utc::now();
    Ok(Plan {
        id: existing.map_or_else(Uuid::new_v4, |p| p.id),
        code,
        name,
        description: req.description.trim().to_string(),
        price: req.price,
        duration_days: req.duration_days,
        features: req.features,
        upgrades,
        active: req.active,
        created_at: existing.map_or(now, |p| p.created_at),
        updated_at: now,
    })
}

pub async fn list_plans(State(state): State<Arc<AppState>>, MaybeUser(viewer): MaybeUser) -> ApiResult<Vec<Plan>> {
    let show_all = viewer.as_ref().map_or(false, |v| v.is_admin());
    let mut plans = state.store.plans.filter(|p| show_all || p.active);
    plans.sort_by(|a, b| a.price.total_cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
    ok(plans)
}

pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Plan> {
    let plan = state.store.plans.require(&id)?;
    if !plan.active && !viewer.as_ref().map_or(false, |v| v.is_admin()) {
        return Err(AppError::not_found("Plan not found"));
    }
    ok(plan)
}

pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(req): ApiJson<PlanRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Plan>>)> {
    let plan = state.store.plans.insert(build_plan(req, None)?)?;
    info!("📦 Plan {} created ({:.2})", plan.code, plan.price);
    created(plan)
}

pub async fn update_plan(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<PlanRequest>,
) -> ApiResult<Plan> {
    let existing = state.store.plans.require(&id)?;
    let replacement = build_plan(req, Some(&existing))?;
    ok(state.store.plans.update(&id, |p| {
        *p = replacement;
        Ok(())
    })?)
}

/// Refused while any profile still holds the plan
pub async fn delete_plan(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    let plan = state.store.plans.require(&id)?;
    let in_use = state
        .store
        .profiles
        .any(|p| p.plan.as_ref().map_or(false, |a| a.plan_id == id));
    if in_use {
        return Err(AppError::conflict(format!(
            "Plan '{}' is assigned to profiles; deactivate it instead",
            plan.code
        )));
    }
    state.store.plans.remove(&id);
    info!("🗑️ Plan {} deleted", plan.code);
    done("Plan deleted")
}

// ============================================
// Coupons
// ============================================

fn build_coupon(state: &AppState, req: CouponRequest, existing: Option<&Coupon>) -> AppResult<Coupon> {
    let code = normalize_code(&req.code);
    if code.is_empty() {
        return Err(AppError::validation("Coupon code is required"));
    }
    validate_coupon_definition(req.kind, req.value, req.assigned_plan_id)?;

    if let Some(plan_id) = req.assigned_plan_id {
        state
            .store
            .plans
            .get(&plan_id)
            .ok_or_else(|| AppError::validation("assigned_plan_id does not match a plan"))?;
    }
    if let Some(unknown) = req.valid_plan_ids.iter().find(|id| state.store.plans.get(id).is_none()) {
        return Err(AppError::validation(format!("Unknown plan id {}", unknown)));
    }
    if let Some(unknown) = req
        .valid_upgrade_ids
        .iter()
        .find(|id| state.store.plan_for_upgrade(**id).is_none())
    {
        return Err(AppError::validation(format!("Unknown upgrade id {}", unknown)));
    }
    if let (Some(start), Some(end)) = (req.starts_at, req.expires_at) {
        if end <= start {
            return Err(AppError::validation("expires_at must be after starts_at"));
        }
    }
    if req.assigned_days == Some(0) {
        return Err(AppError::validation("assigned_days must be positive"));
    }

    let now = Utc::now();
    Ok(Coupon {
        id: existing.map_or_else(Uuid::new_v4, |c| c.id),
        code,
        description: req.description.trim().to_string(),
        kind: req.kind,
        value: req.value,
        valid_plan_ids: req.valid_plan_ids,
        valid_upgrade_ids: req.valid_upgrade_ids,
        assigned_plan_id: req.assigned_plan_id,
        assigned_days: req.assigned_days,
        max_uses: req.max_uses,
        used_count: existing.map_or(0, |c| c.used_count),
        starts_at: req.starts_at,
        expires_at: req.expires_at,
        active: req.active,
        created_at: existing.map_or(now, |c| c.created_at),
        updated_at: now,
    })
}

pub async fn list_coupons(State(state): State<Arc<AppState>>, _admin: AdminUser) -> ApiResult<Vec<Coupon>> {
    let mut coupons = state.store.coupons.list();
    coupons.sort_by(|a, b| a.code.cmp(&b.code));
    ok(coupons)
}

pub async fn get_coupon(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Coupon> {
    ok(state.store.coupons.require(&id)?)
}

pub async fn create_coupon(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(req): ApiJson<CouponRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Coupon>>)> {
    let coupon = state.store.coupons.insert(build_coupon(&state, req, None)?)?;
    info!("🎟️ Coupon {} created ({})", coupon.code, coupon.kind.as_str());
    created(coupon)
}

pub async fn update_coupon(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CouponRequest>,
) -> ApiResult<Coupon> {
    let existing = state.store.coupons.require(&id)?;
    let replacement = build_coupon(&state, req, Some(&existing))?;
    ok(state.store.coupons.update(&id, |c| {
        *c = replacement;
        Ok(())
    })?)
}

pub async fn delete_coupon(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    let coupon = state
        .store
        .coupons
        .remove(&id)
        .ok_or_else(|| AppError::not_found("Coupon not found"))?;
    info!("🗑️ Coupon {} deleted", coupon.code);
    done("Coupon deleted")
}

/// Dry-run a coupon against a cart; coupon problems are reported, not raised
pub async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CheckoutRequest>,
) -> ApiResult<CouponValidation> {
    if req.coupon_code.as_deref().map_or(true, |c| c.trim().is_empty()) {
        return Err(AppError::validation("coupon_code is required"));
    }
    let profile = state.store.profiles.require(&req.profile_id)?;
    user.ensure_can_manage(&profile)?;

    match checkout::quote(&state.store, &req, Utc::now()) {
        Ok(quote) => ok(CouponValidation {
            valid: true,
            reason: None,
            message: None,
            quote: Some(quote),
        }),
        Err(e) if e.code == ErrorCode::CouponInvalid => ok(CouponValidation {
            valid: false,
            reason: e.details,
            message: Some(e.message),
            quote: None,
        }),
        Err(e) => Err(e),
    }
}

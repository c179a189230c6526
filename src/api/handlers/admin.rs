//! Admin: users, dashboard and the cleanup scheduler

use axum::extract::State;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{done, ok, ApiResult, AppState};
use crate::api::extract::{AdminUser, ApiJson, ApiPath, ApiQuery};
use crate::api::types::{DashboardData, Page, PageQuery, RoleRequest};
use crate::core::{accounts, CleanupReport, CleanupStatus};
use crate::models::{AppError, InvoiceStatus, ProfileStatus, UserView};
use crate::utils::helpers::round_cents;

// ============================================
// Users
// ============================================

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Page<UserView>> {
    let mut users = state.store.users.list();
    users.sort_by_key(|u| u.created_at);
    let views = users.iter().map(UserView::from).collect();
    ok(Page::slice(views, &query))
}

pub async fn set_user_role(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<RoleRequest>,
) -> ApiResult<UserView> {
    let user = accounts::set_role(&state.store, admin.sub, id, req.role, Utc::now())?;
    info!("🛡️ {} set role of {} to {}", admin.email, user.email, user.role.as_str());
    ok(UserView::from(&user))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    let removed = accounts::delete_user(&state.store, admin.sub, id)?;
    done(format!("User deleted with {} profiles", removed))
}

// ============================================
// Dashboard
// ============================================

pub async fn dashboard(State(state): State<Arc<AppState>>, _admin: AdminUser) -> ApiResult<DashboardData> {
    let store = &state.store;
    let now = Utc::now();

    let profiles = store.profiles.list();
    let mut profiles_by_status = BTreeMap::new();
    for status in [
        ProfileStatus::Draft,
        ProfileStatus::Active,
        ProfileStatus::Paused,
        ProfileStatus::Expired,
    ] {
        let count = profiles.iter().filter(|p| p.status == status).count();
        profiles_by_status.insert(status.as_str().to_string(), count);
    }

    let invoices = store.invoices.list();
    let mut invoices_by_status = BTreeMap::new();
    for status in [InvoiceStatus::Pending, InvoiceStatus::Paid, InvoiceStatus::Cancelled] {
        let count = invoices.iter().filter(|i| i.status == status).count();
        invoices_by_status.insert(status.as_str().to_string(), count);
    }
    let revenue = round_cents(
        invoices
            .iter()
            .filter(|i| i.status == InvoiceStatus::Paid)
            .map(|i| i.total)
            .sum(),
    );

    ok(DashboardData {
        users: store.users.len(),
        admins: store.users.count(|u| u.is_admin()),
        profiles: profiles.len(),
        profiles_by_status,
        verified_profiles: profiles.iter().filter(|p| p.verified).count(),
        invoices_by_status,
        revenue,
        active_coupons: store
            .coupons
            .count(|c| c.active && !c.is_exhausted() && c.expires_at.map_or(true, |e| e > now)),
        cleanup: state.scheduler.status(),
    })
}

// ============================================
// Cleanup scheduler
// ============================================

pub async fn cleanup_status(State(state): State<Arc<AppState>>, _admin: AdminUser) -> ApiResult<CleanupStatus> {
    ok(state.scheduler.status())
}

pub async fn cleanup_run(State(state): State<Arc<AppState>>, _admin: AdminUser) -> ApiResult<CleanupReport> {
    ok(state.scheduler.run_now().await)
}

pub async fn cleanup_start(State(state): State<Arc<AppState>>, _admin: AdminUser) -> ApiResult<CleanupStatus> {
    if !state.scheduler.start() {
        return Err(AppError::conflict("Cleanup scheduler is already running"));
    }
    ok(state.scheduler.status())
}

pub async fn cleanup_stop(State(state): State<Arc<AppState>>, _admin: AdminUser) -> ApiResult<CleanupStatus> {
    if !state.scheduler.stop() {
        return Err(AppError::conflict("Cleanup scheduler is not running"));
    }
    ok(state.scheduler.status())
}

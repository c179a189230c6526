//! Checkout and invoices

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::cmp::Reverse;
use std::sync::Arc;
use uuid::Uuid;

use super::{created, ok, ApiResult, AppState};
use crate::api::extract::{AdminUser, ApiJson, ApiPath, ApiQuery, CurrentUser};
use crate::api::types::{ApiResponse, InvoiceListQuery, Page, PageQuery};
use crate::core::checkout::{self, CheckoutRequest, Quote};
use crate::models::{AppError, AppResult, Invoice, InvoiceStatus};

fn owned_invoice(state: &AppState, user: &CurrentUser, id: Uuid) -> AppResult<Invoice> {
    let invoice = state.store.invoices.require(&id)?;
    if invoice.user_id != user.id() && !user.0.is_admin() {
        return Err(AppError::forbidden("You do not own this invoice"));
    }
    Ok(invoice)
}

pub async fn quote_checkout(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CheckoutRequest>,
) -> ApiResult<Quote> {
    let profile = state.store.profiles.require(&req.profile_id)?;
    user.ensure_can_manage(&profile)?;
    ok(checkout::quote(&state.store, &req, Utc::now())?)
}

/// Invoice belongs to the profile owner even when an admin checks out
pub async fn create_invoice(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Invoice>>)> {
    let profile = state.store.profiles.require(&req.profile_id)?;
    user.ensure_can_manage(&profile)?;
    let invoice = checkout::create_invoice(&state.store, profile.user_id, &req, Utc::now())?;
    created(invoice)
}

pub async fn my_invoices(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Page<Invoice>> {
    let mut invoices = state.store.invoices.filter(|i| i.user_id == user.id());
    invoices.sort_by_key(|i| Reverse(i.created_at));
    ok(Page::slice(invoices, &query))
}

pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Invoice> {
    ok(owned_invoice(&state, &user, id)?)
}

pub async fn cancel_invoice(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Invoice> {
    owned_invoice(&state, &user, id)?;
    ok(checkout::cancel_invoice(&state.store, id, Utc::now())?)
}

/// Payment confirmation is manual: an admin marks the invoice paid
pub async fn pay_invoice(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Invoice> {
    ok(checkout::pay_invoice(&state.store, id, Utc::now())?)
}

pub async fn admin_invoices(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<InvoiceListQuery>,
) -> ApiResult<Page<Invoice>> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            InvoiceStatus::parse(raw)
                .ok_or_else(|| AppError::validation(format!("Unknown invoice status '{}'", raw)))?,
        ),
        None => None,
    };

    let mut invoices = state
        .store
        .invoices
        .filter(|i| status.map_or(true, |s| i.status == s));
    invoices.sort_by_key(|i| Reverse(i.created_at));

    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    ok(Page::slice(invoices, &page))
}

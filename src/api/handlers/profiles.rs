//! Profile listings and verification

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{created, done, ok, ApiResult, AppState};
use crate::api::extract::{AdminUser, ApiJson, ApiPath, ApiQuery, CurrentUser, MaybeUser};
use crate::api::types::{
    ApiResponse, Page, ProfileListQuery, ReviewStepRequest, SubmitStepRequest,
};
use crate::core::listings::{self, ProfileInput};
use crate::models::{
    AppError, AppResult, Profile, ProfileStatus, ProfileVerification, VerificationKind,
};

fn managed_profile(state: &AppState, user: &CurrentUser, id: Uuid) -> AppResult<Profile> {
    let profile = state.store.profiles.require(&id)?;
    user.ensure_can_manage(&profile)?;
    Ok(profile)
}

fn parse_kind(raw: &str) -> AppResult<VerificationKind> {
    VerificationKind::parse(raw)
        .ok_or_else(|| AppError::validation(format!("Unknown verification step '{}'", raw)))
}

fn same_text(filter: &Option<String>, value: &str) -> bool {
    match filter.as_deref().map(str::trim) {
        Some(wanted) if !wanted.is_empty() => value.eq_ignore_ascii_case(wanted),
        _ => true,
    }
}

/// Public directory: active profiles only, verified and upgraded first
pub async fn list_profiles(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ProfileListQuery>,
) -> ApiResult<Page<Profile>> {
    let search = query.q.as_deref().map(str::trim).unwrap_or_default();

    let mut profiles = state.store.profiles.filter(|p| {
        p.status == ProfileStatus::Active
            && same_text(&query.category, &p.category)
            && same_text(&query.city, &p.city)
            && (search.is_empty() || p.matches_query(search))
    });
    profiles.sort_by_key(|p| (Reverse(p.verified), Reverse(p.upgrades.len()), Reverse(p.updated_at)));

    ok(Page::slice(profiles, &query.page_query()))
}

/// Non-active profiles are only visible to their owner or an admin
pub async fn get_profile_by_slug(
    State(state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<Profile> {
    let profile = state
        .store
        .profiles
        .find_by_key(&slug)
        .ok_or_else(|| AppError::not_found("Profile not found"))?;

    let privileged = viewer
        .as_ref()
        .map_or(false, |v| v.is_admin() || profile.is_owned_by(v.sub));
    if profile.status != ProfileStatus::Active && !privileged {
        return Err(AppError::not_found("Profile not found"));
    }
    ok(profile)
}

pub async fn my_profiles(State(state): State<Arc<AppState>>, user: CurrentUser) -> ApiResult<Vec<Profile>> {
    let mut profiles = state.store.profiles.filter(|p| p.is_owned_by(user.id()));
    profiles.sort_by_key(|p| p.created_at);
    ok(profiles)
}

pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(input): ApiJson<ProfileInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Profile>>)> {
    let profile = listings::create_profile(
        &state.store,
        user.id(),
        user.0.is_admin(),
        input,
        Utc::now(),
    )?;
    created(profile)
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Profile> {
    ok(managed_profile(&state, &user, id)?)
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<ProfileInput>,
) -> ApiResult<Profile> {
    managed_profile(&state, &user, id)?;
    ok(listings::update_profile(&state.store, id, input, Utc::now())?)
}

pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    let profile = managed_profile(&state, &user, id)?;
    state.store.delete_profile(&profile.id);
    info!("🗑️ Profile {} deleted by {}", profile.slug, user.0.email);
    done("Profile deleted")
}

pub async fn pause_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Profile> {
    managed_profile(&state, &user, id)?;
    ok(listings::set_paused(&state.store, id, true, Utc::now())?)
}

pub async fn resume_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Profile> {
    managed_profile(&state, &user, id)?;
    ok(listings::set_paused(&state.store, id, false, Utc::now())?)
}

// ============================================
// Verification
// ============================================

pub async fn get_verification(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<ProfileVerification> {
    managed_profile(&state, &user, id)?;
    ok(listings::verification_for(&state.store, id)?)
}

/// Only the owner submits evidence, admins review it
pub async fn submit_verification_step(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath((id, kind)): ApiPath<(Uuid, String)>,
    ApiJson(req): ApiJson<SubmitStepRequest>,
) -> ApiResult<ProfileVerification> {
    let profile = state.store.profiles.require(&id)?;
    if !profile.is_owned_by(user.id()) {
        return Err(AppError::forbidden("Only the profile owner can submit verification"));
    }
    let kind = parse_kind(&kind)?;
    ok(listings::submit_step(&state.store, id, kind, &req.evidence, Utc::now())?)
}

pub async fn review_verification_step(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath((profile_id, kind)): ApiPath<(Uuid, String)>,
    ApiJson(req): ApiJson<ReviewStepRequest>,
) -> ApiResult<ProfileVerification> {
    let kind = parse_kind(&kind)?;
    ok(listings::review_step(
        &state.store,
        profile_id,
        kind,
        req.approved,
        req.note,
        Utc::now(),
    )?)
}

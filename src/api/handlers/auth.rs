//! Sign-in, sessions and the caller's own account

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::{created, done, ok, ApiResult, AppState};
use crate::api::extract::{ApiJson, CurrentUser};
use crate::api::types::{
    ApiResponse, GoogleSignInRequest, LoginRequest, RegisterRequest, SessionData, UpdateMeRequest,
};
use crate::core::{accounts, SessionClaims};
use crate::models::{AppResult, User, UserView};

fn session_for(state: &AppState, user: &User) -> AppResult<SessionData> {
    let issued = state.sessions.issue(user, Utc::now())?;
    Ok(SessionData {
        token: issued.token,
        expires_at: issued.expires_at,
        user: UserView::from(user),
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<SessionData>>)> {
    let user = accounts::register(&state.store, &req.email, &req.name, &req.password, Utc::now())?;
    created(session_for(&state, &user)?)
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<SessionData> {
    let user = accounts::login(&state.store, &req.email, &req.password)?;
    info!("🔓 {} signed in", user.email);
    ok(session_for(&state, &user)?)
}

pub async fn google_sign_in(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<GoogleSignInRequest>,
) -> ApiResult<SessionData> {
    let identity = state.google.verify(&req.id_token).await?;
    let user = accounts::upsert_google_user(&state.store, &identity, Utc::now())?;
    ok(session_for(&state, &user)?)
}

pub async fn get_session(user: CurrentUser) -> ApiResult<SessionClaims> {
    ok(user.0)
}

/// New token built from the stored user, so profile and role edits propagate
pub async fn refresh_session(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<SessionData> {
    let stored = state.store.users.require(&user.id())?;
    let session = session_for(&state, &stored)?;
    state.sessions.revoke(&user.0);
    ok(session)
}

pub async fn logout(State(state): State<Arc<AppState>>, user: CurrentUser) -> ApiResult<()> {
    state.sessions.revoke(&user.0);
    info!("🔒 {} signed out", user.0.email);
    done("Signed out")
}

pub async fn get_me(State(state): State<Arc<AppState>>, user: CurrentUser) -> ApiResult<UserView> {
    let stored = state.store.users.require(&user.id())?;
    ok(UserView::from(&stored))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(req): ApiJson<UpdateMeRequest>,
) -> ApiResult<UserView> {
    let update = accounts::AccountUpdate {
        name: req.name,
        image: req.image,
        current_password: req.current_password,
        new_password: req.new_password,
    };
    let updated = accounts::update_account(&state.store, user.id(), update, Utc::now())?;
    ok(UserView::from(&updated))
}

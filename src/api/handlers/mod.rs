//! API Request Handlers

pub mod admin;
pub mod auth;
pub mod billing;
pub mod catalog;
pub mod content;
pub mod profiles;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use super::middleware::RateLimiter;
use super::types::{ApiResponse, HealthData};
use crate::core::{CleanupScheduler, CleanupService, GoogleVerifier, SessionManager};
use crate::models::{AppConfig, AppResult};
use crate::store::Store;

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<Store>,
    pub sessions: Arc<SessionManager>,
    pub google: GoogleVerifier,
    pub rate_limiter: Arc<RateLimiter>,
    pub scheduler: Arc<CleanupScheduler>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire services around `store`; the scheduler is created stopped
    pub fn new(config: AppConfig, store: Arc<Store>) -> Self {
        let sessions = Arc::new(SessionManager::new(
            &config.session_secret,
            config.session_ttl,
            store.clone(),
        ));
        let google = GoogleVerifier::new(
            config.google_tokeninfo_url.clone(),
            config.google_client_id.clone(),
        );
        let rate_limiter = Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute));

        let service = Arc::new(CleanupService::new(store.clone(), sessions.clone()));
        let scheduler = Arc::new(
            CleanupScheduler::new(service, config.cleanup_interval)
                .with_snapshot(config.data_file.clone()),
        );

        Self {
            config,
            store,
            sessions,
            google,
            rate_limiter,
            scheduler,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Handler result carrying the success envelope
pub type ApiResult<T> = AppResult<Json<ApiResponse<T>>>;

pub(crate) fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

pub(crate) fn created<T: Serialize>(data: T) -> AppResult<(StatusCode, Json<ApiResponse<T>>)> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

pub(crate) fn done(message: impl Into<String>) -> ApiResult<()> {
    Ok(Json(ApiResponse::message(message)))
}

// ============================================
// Health Check
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    Json(ApiResponse::success(HealthData {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    }))
}

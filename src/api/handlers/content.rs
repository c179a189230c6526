//! CMS pages and configuration parameters

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{created, done, ok, ApiResult, AppState};
use crate::api::extract::{AdminUser, ApiJson, ApiPath, ApiQuery, MaybeUser};
use crate::api::types::{ApiResponse, ConfigParameterRequest, ContentRequest};
use crate::models::{AppError, AppResult, ConfigParameter, ContentPage};
use crate::utils::helpers::slugify;

#[derive(Debug, Default, Deserialize)]
pub struct SectionQuery {
    pub section: Option<String>,
}

fn sorted_pages(mut pages: Vec<ContentPage>) -> Vec<ContentPage> {
    pages.sort_by(|a, b| a.section.cmp(&b.section).then_with(|| a.title.cmp(&b.title)));
    pages
}

pub async fn list_pages(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SectionQuery>,
) -> ApiResult<Vec<ContentPage>> {
    let pages = state.store.pages.filter(|p| {
        p.published && query.section.as_deref().map_or(true, |s| p.section == s)
    });
    ok(sorted_pages(pages))
}

pub async fn get_page(
    State(state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<ContentPage> {
    let page = state
        .store
        .pages
        .find_by_key(&slug)
        .filter(|p| p.published || viewer.as_ref().map_or(false, |v| v.is_admin()))
        .ok_or_else(|| AppError::not_found("Page not found"))?;
    ok(page)
}

pub async fn admin_list_pages(State(state): State<Arc<AppState>>, _admin: AdminUser) -> ApiResult<Vec<ContentPage>> {
    ok(sorted_pages(state.store.pages.list()))
}

fn page_fields(req: &ContentRequest) -> AppResult<(String, String)> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::validation("Page title is required"));
    }
    let slug = match req.slug.as_deref().map(str::trim) {
        Some(slug) if !slug.is_empty() => slugify(slug),
        _ => slugify(&title),
    };
    Ok((title, slug))
}

pub async fn create_page(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(req): ApiJson<ContentRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ContentPage>>)> {
    let (title, slug) = page_fields(&req)?;
    let now = Utc::now();
    let page = state.store.pages.insert(ContentPage {
        id: Uuid::new_v4(),
        slug,
        title,
        body: req.body,
        section: req.section.trim().to_lowercase(),
        published: req.published,
        created_at: now,
        updated_at: now,
    })?;
    info!("📄 Page {} created", page.slug);
    created(page)
}

pub async fn update_page(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ContentRequest>,
) -> ApiResult<ContentPage> {
    let (title, slug) = page_fields(&req)?;
    ok(state.store.pages.update(&id, |p| {
        p.title = title;
        p.slug = slug;
        p.body = req.body;
        p.section = req.section.trim().to_lowercase();
        p.published = req.published;
        p.updated_at = Utc::now();
        Ok(())
    })?)
}

pub async fn delete_page(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    let page = state
        .store
        .pages
        .remove(&id)
        .ok_or_else(|| AppError::not_found("Page not found"))?;
    info!("🗑️ Page {} deleted", page.slug);
    done("Page deleted")
}

// ============================================
// Configuration parameters
// ============================================

/// `{ key: value }` of every public parameter
pub async fn public_config(State(state): State<Arc<AppState>>) -> ApiResult<BTreeMap<String, Value>> {
    let params = state
        .store
        .settings
        .filter(|p| p.is_public)
        .into_iter()
        .map(|p| (p.key, p.value))
        .collect();
    ok(params)
}

pub async fn admin_list_config(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Vec<ConfigParameter>> {
    let mut params = state.store.settings.list();
    params.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.key.cmp(&b.key)));
    ok(params)
}

/// Create or replace the parameter stored under `key`
pub async fn upsert_config(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(key): ApiPath<String>,
    ApiJson(req): ApiJson<ConfigParameterRequest>,
) -> ApiResult<ConfigParameter> {
    let key = key.trim().to_string();
    if key.is_empty() {
        return Err(AppError::validation("Parameter key is required"));
    }
    ConfigParameter::check_value(&key, &req.value)?;
    let now = Utc::now();

    let saved = match state.store.settings.find_by_key(&key) {
        Some(existing) => state.store.settings.update(&existing.id, |p| {
            p.value = req.value;
            if let Some(description) = req.description {
                p.description = description;
            }
            if let Some(category) = req.category {
                p.category = category;
            }
            if let Some(is_public) = req.is_public {
                p.is_public = is_public;
            }
            p.updated_at = now;
            Ok(())
        })?,
        None => state.store.settings.insert(ConfigParameter {
            id: Uuid::new_v4(),
            category: req
                .category
                .unwrap_or_else(|| key.split('.').next().unwrap_or_default().to_string()),
            key,
            value: req.value,
            description: req.description.unwrap_or_default(),
            is_public: req.is_public.unwrap_or(false),
            updated_at: now,
        })?,
    };
    info!(key = %saved.key, value = %saved.value, "⚙️ Config parameter saved");
    ok(saved)
}

pub async fn delete_config(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(key): ApiPath<String>,
) -> ApiResult<()> {
    let param = state
        .store
        .settings
        .find_by_key(key.trim())
        .ok_or_else(|| AppError::not_found("Parameter not found"))?;
    state.store.settings.remove(&param.id);
    done("Parameter deleted")
}

//! End-to-end tests driving the router in-process

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use marketplace::api::{create_router, AppState};
use marketplace::core::accounts;
use marketplace::{AppConfig, Store};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-password";

fn test_app(rate_limit_per_minute: u32) -> (Router, Arc<AppState>) {
    let config = AppConfig {
        data_file: std::env::temp_dir().join(format!("marketplace-api-{}.json", Uuid::new_v4())),
        rate_limit_per_minute,
        ..AppConfig::default()
    };
    let store = Arc::new(Store::new());
    accounts::ensure_admin(&store, ADMIN_EMAIL, ADMIN_PASSWORD, Utc::now()).unwrap();
    let state = Arc::new(AppState::new(config, store));
    (create_router(state.clone()), state)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/user/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["data"]["token"].as_str().unwrap().to_string()
}

async fn register(app: &Router, email: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/user/register",
        None,
        Some(json!({ "email": email, "name": "Ana", "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"]["token"].as_str().unwrap().to_string()
}

async fn create_plan(app: &Router, admin: &str, code: &str, price: f64) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/plans",
        Some(admin),
        Some(json!({
            "code": code,
            "name": code.to_uppercase(),
            "price": price,
            "duration_days": 30,
            "upgrades": [
                { "code": "featured", "name": "Featured", "price": 10.0, "duration_days": 7 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"].clone()
}

async fn create_profile(app: &Router, token: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/profiles",
        Some(token),
        Some(json!({ "display_name": "Ana Cleaning", "category": "cleaning", "city": "Porto" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"].clone()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app(120);
    for path in ["/health", "/api/health"] {
        let (status, body) = call(&app, Method::GET, path, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "healthy");
    }
}

#[tokio::test]
async fn test_register_login_logout() {
    let (app, _) = test_app(120);
    let token = register(&app, "ana@example.com").await;

    let (status, body) = call(&app, Method::GET, "/api/user/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "ana@example.com");
    assert_eq!(body["data"]["role"], "user");

    // Wrong password uses the error envelope
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/user/login",
        None,
        Some(json!({ "email": "ana@example.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_INVALID_CREDENTIALS");
    assert!(body["message"].is_string());
    assert!(body["timestamp"].is_i64());

    let fresh = login(&app, "ana@example.com", "s3cret-pass").await;
    let (status, _) = call(&app, Method::POST, "/api/user/logout", Some(&fresh), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::GET, "/api/user/session", Some(&fresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_INVALID_SESSION");

    // The first token is still valid
    let (status, _) = call(&app, Method::GET, "/api/user/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_role_enforcement() {
    let (app, _) = test_app(120);
    let user = register(&app, "bo@example.com").await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, body) = call(&app, Method::GET, "/api/admin/dashboard", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "API_UNAUTHORIZED");

    let (status, body) = call(&app, Method::GET, "/api/admin/dashboard", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "API_FORBIDDEN");

    let (status, body) = call(&app, Method::GET, "/api/admin/dashboard", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["users"], 2);
    assert_eq!(body["data"]["admins"], 1);
}

#[tokio::test]
async fn test_demotion_applies_to_existing_tokens() {
    let (app, _) = test_app(120);
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let other_token = register(&app, "second@example.com").await;

    let (_, me) = call(&app, Method::GET, "/api/user/me", Some(&other_token), None).await;
    let other_id = me["data"]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/admin/users/{}/role", other_id);
    let (status, _) = call(&app, Method::PUT, &uri, Some(&admin), Some(json!({ "role": "admin" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, "/api/admin/users", Some(&other_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::PUT, &uri, Some(&admin), Some(json!({ "role": "user" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, "/api/admin/users", Some(&other_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_checkout_with_coupon_activates_profile() {
    let (app, _) = test_app(120);
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let user = register(&app, "ana@example.com").await;

    let plan = create_plan(&app, &admin, "pro", 50.0).await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/coupons",
        Some(&admin),
        Some(json!({ "code": "save10", "type": "percentage", "value": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let profile = create_profile(&app, &user).await;
    assert_eq!(profile["status"], "draft");

    let cart = json!({
        "profile_id": profile["id"],
        "plan_id": plan["id"],
        "coupon_code": "Save10"
    });

    let (status, body) = call(&app, Method::POST, "/api/coupons/validate", Some(&user), Some(cart.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["quote"]["total"], 45.0);

    let (status, body) = call(&app, Method::POST, "/api/checkout", Some(&user), Some(cart)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let invoice = body["data"].clone();
    assert_eq!(invoice["status"], "pending");
    assert_eq!(invoice["total"], 45.0);
    assert_eq!(invoice["coupon_code"], "SAVE10");

    // Only admins confirm payment
    let pay_uri = format!("/api/invoices/{}/pay", invoice["id"].as_str().unwrap());
    let (status, _) = call(&app, Method::POST, &pay_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::POST, &pay_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "paid");

    let profile_uri = format!("/api/profiles/{}", profile["id"].as_str().unwrap());
    let (_, body) = call(&app, Method::GET, &profile_uri, Some(&user), None).await;
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["plan"]["plan_id"], plan["id"]);

    let (_, body) = call(&app, Method::GET, "/api/profiles?city=porto", None, None).await;
    assert_eq!(body["data"]["total"], 1);

    let (_, body) = call(&app, Method::GET, "/api/invoices", Some(&user), None).await;
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn test_coupon_rejected_for_free_plan() {
    let (app, _) = test_app(120);
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let user = register(&app, "ana@example.com").await;

    let free = create_plan(&app, &admin, "starter", 0.0).await;
    call(
        &app,
        Method::POST,
        "/api/coupons",
        Some(&admin),
        Some(json!({ "code": "HALF", "type": "percentage", "value": 50 })),
    )
    .await;
    let profile = create_profile(&app, &user).await;

    let cart = json!({
        "profile_id": profile["id"],
        "plan_id": free["id"],
        "coupon_code": "HALF"
    });

    let (status, body) = call(&app, Method::POST, "/api/coupons/validate", Some(&user), Some(cart.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["reason"], "free_plan");

    let (status, body) = call(&app, Method::POST, "/api/checkout/quote", Some(&user), Some(cart)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "COUPON_INVALID");
    assert_eq!(body["error"]["details"], "free_plan");
}

#[tokio::test]
async fn test_other_users_profiles_are_forbidden() {
    let (app, _) = test_app(120);
    let owner = register(&app, "owner@example.com").await;
    let stranger = register(&app, "stranger@example.com").await;
    let profile = create_profile(&app, &owner).await;

    let uri = format!("/api/profiles/{}", profile["id"].as_str().unwrap());
    let (status, _) = call(&app, Method::GET, &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Drafts are hidden from the public slug lookup
    let slug_uri = format!("/api/profiles/slug/{}", profile["slug"].as_str().unwrap());
    let (status, _) = call(&app, Method::GET, &slug_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, Method::GET, &slug_uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bad_input_uses_envelope() {
    let (app, _) = test_app(120);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/user/login")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "API_BAD_REQUEST");

    let (status, body) = call(&app, Method::GET, "/api/plans/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "API_BAD_REQUEST");

    let (status, body) = call(&app, Method::GET, &format!("/api/plans/{}", Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "API_NOT_FOUND");

    let (status, body) = call(&app, Method::GET, "/api/user/session", Some("forged.token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_INVALID_SESSION");
}

#[tokio::test]
async fn test_rate_limit() {
    let (app, _) = test_app(2);

    let send = || {
        let request = Request::builder()
            .uri("/api/plans")
            .header("X-Forwarded-For", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request)
    };

    let first = send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["X-RateLimit-Remaining"], "1");
    assert_eq!(send().await.unwrap().status(), StatusCode::OK);

    let limited = send().await.unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers()["X-RateLimit-Remaining"], "0");

    // Health is exempt
    let (status, _) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cleanup_endpoints() {
    let (app, state) = test_app(120);
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, body) = call(&app, Method::POST, "/api/cleanup/run", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expired_profiles"], 0);

    let (_, body) = call(&app, Method::GET, "/api/cleanup/status", Some(&admin), None).await;
    assert_eq!(body["data"]["running"], false);
    assert_eq!(body["data"]["total_runs"], 1);

    let (status, body) = call(&app, Method::POST, "/api/cleanup/stop", Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "API_CONFLICT");

    let (status, body) = call(&app, Method::POST, "/api/cleanup/start", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["running"], true);
    let (status, _) = call(&app, Method::POST, "/api/cleanup/start", Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, Method::POST, "/api/cleanup/stop", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!state.scheduler.is_running());

    let _ = std::fs::remove_file(&state.config.data_file);
}

#[tokio::test]
async fn test_cleanup_settings_are_bounded() {
    let (app, state) = test_app(120);
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/admin/config/cleanup.draft_ttl_hours",
        Some(&admin),
        Some(json!({ "value": 10_000_000_000u64 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["error"]["code"], "API_VALIDATION_FAILED");

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/admin/config/cleanup.draft_ttl_hours",
        Some(&admin),
        Some(json!({ "value": 48 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::POST, "/api/cleanup/run", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let _ = std::fs::remove_file(&state.config.data_file);
}

#[tokio::test]
async fn test_huge_page_number() {
    let (app, _) = test_app(120);
    let uri = format!("/api/profiles?page={}&limit=50", usize::MAX);
    let (status, body) = call(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["items"], json!([]));
}

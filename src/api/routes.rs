//! API Route Configuration

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{self, admin, auth, billing, catalog, content, profiles, AppState};
use super::middleware::{logging_middleware, rate_limit_middleware, session_middleware};

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Accounts & sessions
    let user_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/google", post(auth::google_sign_in))
        .route("/session", get(auth::get_session))
        .route("/session/refresh", post(auth::refresh_session))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::get_me).put(auth::update_me));

    // Listings & verification
    let profile_routes = Router::new()
        .route("/", get(profiles::list_profiles).post(profiles::create_profile))
        .route("/mine", get(profiles::my_profiles))
        .route("/slug/:slug", get(profiles::get_profile_by_slug))
        .route(
            "/:id",
            get(profiles::get_profile)
                .put(profiles::update_profile)
                .delete(profiles::delete_profile),
        )
        .route("/:id/pause", post(profiles::pause_profile))
        .route("/:id/resume", post(profiles::resume_profile))
        .route("/:id/verification", get(profiles::get_verification))
        .route("/:id/verification/:kind", post(profiles::submit_verification_step));

    // Catalog
    let plan_routes = Router::new()
        .route("/", get(catalog::list_plans).post(catalog::create_plan))
        .route(
            "/:id",
            get(catalog::get_plan)
                .put(catalog::update_plan)
                .delete(catalog::delete_plan),
        );

    let coupon_routes = Router::new()
        .route("/", get(catalog::list_coupons).post(catalog::create_coupon))
        .route("/validate", post(catalog::validate_coupon))
        .route(
            "/:id",
            get(catalog::get_coupon)
                .put(catalog::update_coupon)
                .delete(catalog::delete_coupon),
        );

    // Billing
    let checkout_routes = Router::new()
        .route("/", post(billing::create_invoice))
        .route("/quote", post(billing::quote_checkout));

    let invoice_routes = Router::new()
        .route("/", get(billing::my_invoices))
        .route("/:id", get(billing::get_invoice))
        .route("/:id/pay", post(billing::pay_invoice))
        .route("/:id/cancel", post(billing::cancel_invoice));

    // Content
    let content_routes = Router::new()
        .route("/", get(content::list_pages).post(content::create_page))
        // Read by slug, edit by id
        .route(
            "/:page",
            get(content::get_page)
                .put(content::update_page)
                .delete(content::delete_page),
        );

    // Admin
    let admin_routes = Router::new()
        .route("/dashboard", get(admin::dashboard))
        .route("/users", get(admin::list_users))
        .route("/users/:id", delete(admin::delete_user))
        .route("/users/:id/role", put(admin::set_user_role))
        .route("/invoices", get(billing::admin_invoices))
        .route("/content", get(content::admin_list_pages))
        .route("/config", get(content::admin_list_config))
        .route(
            "/config/:key",
            put(content::upsert_config).delete(content::delete_config),
        )
        .route(
            "/verifications/:profile_id/:kind",
            post(profiles::review_verification_step),
        );

    let cleanup_routes = Router::new()
        .route("/status", get(admin::cleanup_status))
        .route("/run", post(admin::cleanup_run))
        .route("/start", post(admin::cleanup_start))
        .route("/stop", post(admin::cleanup_stop));

    let api = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/config", get(content::public_config))
        .nest("/user", user_routes)
        .nest("/profiles", profile_routes)
        .nest("/plans", plan_routes)
        .nest("/coupons", coupon_routes)
        .nest("/checkout", checkout_routes)
        .nest("/invoices", invoice_routes)
        .nest("/content", content_routes)
        .nest("/admin", admin_routes)
        .nest("/cleanup", cleanup_routes);

    // Build full router
    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health_check))
        .with_state(state.clone())
        // Middleware (order matters - bottom runs first)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(middleware::from_fn_with_state(state, session_middleware))
}

//! Marketplace REST API
//! Axum router, extractors, middleware and handlers

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;

pub use handlers::AppState;
pub use routes::create_router;
pub use types::*;

//! Marketplace Backend Library
//!
//! Backend for a service-provider marketplace:
//! - Profiles (listings) with an identity-verification workflow
//! - Subscription plans, upgrades and discount coupons
//! - Invoices and plan activation
//! - Periodic cleanup of expired plans, stale drafts and invoices
//! - Credential and Google sign-in with signed session tokens

pub mod api;
pub mod core;
pub mod models;
pub mod store;
pub mod utils;

pub use crate::core::{CleanupScheduler, CleanupService, SessionManager};
pub use models::{AppConfig, AppError, AppResult, ErrorCode};
pub use store::Store;

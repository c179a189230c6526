//! Core Module - Business Logic
//!
//! Pricing, checkout, accounts, listings, sessions and the cleanup job.
//! Nothing here knows about HTTP; handlers call into these functions.

pub mod accounts;
pub mod checkout;
pub mod cleanup;
pub mod coupon;
pub mod google;
pub mod listings;
pub mod password;
pub mod session;

pub use checkout::{CheckoutRequest, Quote};
pub use cleanup::{CleanupReport, CleanupScheduler, CleanupService, CleanupStatus};
pub use coupon::{CouponRejection, Discount};
pub use google::{GoogleIdentity, GoogleVerifier};
pub use listings::ProfileInput;
pub use session::{IssuedSession, SessionClaims, SessionManager};

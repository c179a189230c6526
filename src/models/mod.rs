//! Models Module - Data Structures & Configuration
//!
//! Single source of truth for the persisted documents, the error type and
//! environment configuration.

pub mod config;
pub mod content;
pub mod coupon;
pub mod errors;
pub mod invoice;
pub mod plan;
pub mod profile;
pub mod user;

pub use config::*;
pub use content::*;
pub use coupon::*;
pub use errors::*;
pub use invoice::*;
pub use plan::*;
pub use profile::*;
pub use user::*;

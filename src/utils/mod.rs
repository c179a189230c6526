//! Utils Module - Helper Functions & Shared Utilities

pub mod constants;
pub mod helpers;

pub use constants::*;
pub use helpers::*;

//! Application constants
//!
//! Defaults for environment configuration and ConfigParameter keys. Nothing
//! outside this module should hardcode these values.

// ============================================
// Environment defaults
// ============================================

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "8080";
pub const DEFAULT_DATA_FILE: &str = "./data/marketplace.json";
pub const DEFAULT_SESSION_TTL_HOURS: &str = "720";
pub const DEFAULT_CLEANUP_INTERVAL_SECS: &str = "300";
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: &str = "120";
pub const DEFAULT_GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

// ============================================
// Runtime settings (ConfigParameter keys)
// ============================================

/// Hours a draft profile may sit without an invoice before cleanup removes it
pub const SETTING_DRAFT_TTL_HOURS: &str = "cleanup.draft_ttl_hours";
pub const DEFAULT_DRAFT_TTL_HOURS: u64 = 72;

/// Hours a pending invoice stays open before cleanup cancels it
pub const SETTING_PENDING_INVOICE_TTL_HOURS: &str = "cleanup.pending_invoice_ttl_hours";
pub const DEFAULT_PENDING_INVOICE_TTL_HOURS: u64 = 168;

/// Upper bound accepted for the cleanup TTL settings (ten years)
pub const MAX_TTL_HOURS: u64 = 24 * 365 * 10;

/// Maximum profiles a single non-admin user may own
pub const SETTING_MAX_PROFILES_PER_USER: &str = "profiles.max_per_user";
pub const DEFAULT_MAX_PROFILES_PER_USER: u64 = 5;

// ============================================
// Limits
// ============================================

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PAGE_SIZE: usize = 50;
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PROFILE_IMAGES: usize = 12;
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Cookie name carrying the session token (same name the web frontend sets)
pub const SESSION_COOKIE: &str = "session-token";

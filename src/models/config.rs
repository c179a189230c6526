//! Service configuration loaded from the environment
//!
//! Business settings that admins tune at runtime live in ConfigParameter
//! documents instead (see `Store::setting_u64`).

use rand::RngCore;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::errors::{AppError, AppResult};
use crate::utils::constants::{
    DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_DATA_FILE, DEFAULT_GOOGLE_TOKENINFO_URL,
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RATE_LIMIT_PER_MINUTE, DEFAULT_SESSION_TTL_HOURS,
};

/// Bootstrap admin account created at startup when absent
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

/// Top-level service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Snapshot file for the document store
    pub data_file: PathBuf,
    /// HMAC key for session tokens
    pub session_secret: Vec<u8>,
    pub session_ttl: Duration,
    pub cleanup_enabled: bool,
    pub cleanup_interval: Duration,
    pub rate_limit_per_minute: u32,
    /// Expected `aud` of Google ID tokens; unchecked when unset
    pub google_client_id: Option<String>,
    pub google_tokeninfo_url: String,
    pub admin: Option<AdminBootstrap>,
}

impl AppConfig {
    /// Load from environment variables, logging every default used
    pub fn from_env() -> AppResult<Self> {
        let session_secret = match non_empty_var("MARKET_SESSION_SECRET") {
            Some(secret) => secret.into_bytes(),
            None => {
                warn!("MARKET_SESSION_SECRET not set, generating a per-process secret; sessions will not survive restarts");
                random_secret()
            }
        };

        let admin = match (
            non_empty_var("MARKET_ADMIN_EMAIL"),
            non_empty_var("MARKET_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(AdminBootstrap { email, password }),
            (Some(_), None) => return Err(AppError::missing_env("MARKET_ADMIN_PASSWORD")),
            _ => None,
        };

        // PORT is what most hosting platforms inject; MARKET_PORT is for local dev
        let port = match non_empty_var("PORT") {
            Some(raw) => parse_value("PORT", &raw)?,
            None => try_load("MARKET_PORT", DEFAULT_PORT)?,
        };

        let session_ttl = session_ttl_from_hours(try_load(
            "MARKET_SESSION_TTL_HOURS",
            DEFAULT_SESSION_TTL_HOURS,
        )?)?;
        let cleanup_interval_secs: u64 =
            try_load("MARKET_CLEANUP_INTERVAL_SECS", DEFAULT_CLEANUP_INTERVAL_SECS)?;
        if cleanup_interval_secs == 0 {
            return Err(AppError::invalid_config(
                "MARKET_CLEANUP_INTERVAL_SECS",
                "must be greater than zero",
            ));
        }

        Ok(Self {
            host: try_load("MARKET_HOST", DEFAULT_HOST)?,
            port,
            data_file: PathBuf::from(try_load::<String>("MARKET_DATA_FILE", DEFAULT_DATA_FILE)?),
            session_secret,
            session_ttl,
            cleanup_enabled: try_load("MARKET_CLEANUP_ENABLED", "true")?,
            cleanup_interval: Duration::from_secs(cleanup_interval_secs),
            rate_limit_per_minute: try_load(
                "MARKET_RATE_LIMIT_PER_MINUTE",
                DEFAULT_RATE_LIMIT_PER_MINUTE,
            )?,
            google_client_id: non_empty_var("GOOGLE_CLIENT_ID"),
            google_tokeninfo_url: try_load("GOOGLE_TOKENINFO_URL", DEFAULT_GOOGLE_TOKENINFO_URL)?,
            admin,
        })
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.parse().unwrap_or(8080),
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            session_secret: random_secret(),
            session_ttl: Duration::from_secs(
                DEFAULT_SESSION_TTL_HOURS.parse::<u64>().unwrap_or(720) * 3600,
            ),
            cleanup_enabled: true,
            cleanup_interval: Duration::from_secs(
                DEFAULT_CLEANUP_INTERVAL_SECS.parse().unwrap_or(300),
            ),
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE.parse().unwrap_or(120),
            google_client_id: None,
            google_tokeninfo_url: DEFAULT_GOOGLE_TOKENINFO_URL.to_string(),
            admin: None,
        }
    }
}

/// Longest session lifetime accepted (ten years)
const MAX_SESSION_TTL_HOURS: u64 = 24 * 365 * 10;

fn session_ttl_from_hours(hours: u64) -> AppResult<Duration> {
    const KEY: &str = "MARKET_SESSION_TTL_HOURS";
    if hours == 0 || hours > MAX_SESSION_TTL_HOURS {
        return Err(AppError::invalid_config(
            KEY,
            format!("must be between 1 and {}", MAX_SESSION_TTL_HOURS),
        ));
    }
    hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| AppError::invalid_config(KEY, "overflows"))
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> AppResult<T>
where
    T::Err: Display,
{
    let raw = non_empty_var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    parse_value(key, &raw)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> AppResult<T>
where
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        AppError::invalid_config(key, e)
    })
}

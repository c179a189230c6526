//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so logs and API clients can
//! tell them apart without parsing messages.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - API_xxx: request / routing errors
//! - AUTH_xxx: authentication errors
//! - COUPON_xxx: coupon rejections
//! - STORE_xxx: document store errors
//! - CFG_xxx: configuration errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use tracing::{error, warn};

use crate::api::types::ApiResponse;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Extra context returned to the client
    pub details: Option<String>,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: Some(Box::new(source)),
        }
    }

    /// Attach client-visible details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // API Errors
    // ============================================
    /// Invalid request format
    ApiBadRequest,
    /// Request body failed validation
    ApiValidation,
    /// Missing or invalid session
    ApiUnauthorized,
    /// Session valid but not allowed
    ApiForbidden,
    /// Resource not found
    ApiNotFound,
    /// Unique key or state conflict
    ApiConflict,
    /// Rate limit exceeded
    ApiRateLimited,
    /// Internal server error
    ApiInternalError,

    // ============================================
    // Auth Errors
    // ============================================
    /// Wrong email or password
    AuthInvalidCredentials,
    /// Session token malformed, tampered, expired or revoked
    AuthInvalidSession,
    /// Google ID token rejected
    AuthGoogleRejected,

    // ============================================
    // Coupon Errors
    // ============================================
    /// Coupon cannot be applied
    CouponInvalid,

    // ============================================
    // Store Errors
    // ============================================
    /// Snapshot could not be read or written
    StoreSnapshotFailed,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // External Service Errors
    // ============================================
    /// Upstream HTTP service failed
    ExternalServiceError,
    /// External service timeout
    ExternalTimeout,

    // ============================================
    // Generic Errors
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ApiValidation => "API_VALIDATION_FAILED",
            Self::ApiUnauthorized => "API_UNAUTHORIZED",
            Self::ApiForbidden => "API_FORBIDDEN",
            Self::ApiNotFound => "API_NOT_FOUND",
            Self::ApiConflict => "API_CONFLICT",
            Self::ApiRateLimited => "API_RATE_LIMITED",
            Self::ApiInternalError => "API_INTERNAL_ERROR",

            Self::AuthInvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            Self::AuthInvalidSession => "AUTH_INVALID_SESSION",
            Self::AuthGoogleRejected => "AUTH_GOOGLE_REJECTED",

            Self::CouponInvalid => "COUPON_INVALID",

            Self::StoreSnapshotFailed => "STORE_SNAPSHOT_FAILED",

            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            Self::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            Self::ExternalTimeout => "EXTERNAL_TIMEOUT",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ApiBadRequest | Self::ApiValidation | Self::CouponInvalid => 400,
            Self::ApiUnauthorized
            | Self::AuthInvalidCredentials
            | Self::AuthInvalidSession
            | Self::AuthGoogleRejected => 401,
            Self::ApiForbidden => 403,
            Self::ApiNotFound => 404,
            Self::ApiConflict => 409,
            Self::ApiRateLimited => 429,
            Self::ExternalServiceError => 502,
            Self::ExternalTimeout => 504,
            _ => 500,
        }
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// API bad request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    /// Request body failed validation
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiValidation, msg)
    }

    /// Missing session
    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::ApiUnauthorized, "Authentication required")
    }

    /// Authenticated but not allowed
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiForbidden, msg)
    }

    /// Resource not found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiNotFound, msg)
    }

    /// Duplicate key or invalid state transition
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiConflict, msg)
    }

    /// Rate limited
    pub fn rate_limited(retry_after: u64) -> Self {
        Self::new(
            ErrorCode::ApiRateLimited,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after),
        )
        .with_details(format!("retry_after: {}", retry_after))
    }

    /// API internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiInternalError, msg)
    }

    /// Wrong email or password
    pub fn invalid_credentials() -> Self {
        Self::new(ErrorCode::AuthInvalidCredentials, "Invalid email or password")
    }

    /// Bad session token
    pub fn invalid_session(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalidSession, msg)
    }

    /// Google rejected the ID token
    pub fn google_rejected(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthGoogleRejected, msg)
    }

    /// Missing environment variable
    pub fn missing_env(key: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingEnv,
            format!("Missing environment variable: {}", key),
        )
    }

    /// Invalid configuration value
    pub fn invalid_config(key: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid value for {}: {}", key, reason),
        )
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// HTTP response mapping
// ============================================

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(code = self.code_str(), source = ?self.source, "{}", self.message);
        } else {
            warn!(code = self.code_str(), "{}", self.message);
        }

        (status, Json(ApiResponse::error(self))).into_response()
    }
}

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::StoreSnapshotFailed, "IO error", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::ExternalTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::ExternalServiceError, "Connection failed")
        } else {
            Self::new(ErrorCode::ExternalServiceError, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::StoreSnapshotFailed, "JSON error", err)
    }
}

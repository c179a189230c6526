//! Google sign-in bridge
//!
//! Verifies a Google ID token against the tokeninfo endpoint and returns the
//! identity it vouches for.

use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{AppError, AppResult};
use crate::utils::helpers::normalize_key;

/// Identity extracted from a verified Google ID token
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleIdentity {
    /// Stable Google account id
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Raw tokeninfo response; Google returns every field as a string
#[derive(Debug, Deserialize)]
pub struct TokenInfo {
    pub aud: Option<String>,
    pub sub: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl TokenInfo {
    /// Audience and email checks, separated from HTTP for testing
    pub fn into_identity(self, expected_audience: Option<&str>) -> AppResult<GoogleIdentity> {
        if let Some(expected) = expected_audience {
            if self.aud.as_deref() != Some(expected) {
                return Err(AppError::google_rejected("ID token was issued for another client"));
            }
        }
        if self.email_verified.as_deref() != Some("true") {
            return Err(AppError::google_rejected("Google account email is not verified"));
        }
        let sub = self
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::google_rejected("ID token has no subject"))?;
        let email = self
            .email
            .map(|e| normalize_key(&e))
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::google_rejected("ID token has no email"))?;

        Ok(GoogleIdentity {
            sub,
            email,
            name: self.name.filter(|n| !n.trim().is_empty()),
            picture: self.picture.filter(|p| !p.is_empty()),
        })
    }
}

pub struct GoogleVerifier {
    client: reqwest::Client,
    tokeninfo_url: String,
    client_id: Option<String>,
}

impl GoogleVerifier {
    pub fn new(tokeninfo_url: String, client_id: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .gzip(true)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build tuned HTTP client ({}), using defaults", e);
                reqwest::Client::new()
            });

        Self {
            client,
            tokeninfo_url,
            client_id,
        }
    }

    pub async fn verify(&self, id_token: &str) -> AppResult<GoogleIdentity> {
        if id_token.trim().is_empty() {
            return Err(AppError::validation("id_token is required"));
        }

        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        if response.status().is_client_error() {
            warn!(status = %response.status(), "Google rejected ID token");
            return Err(AppError::google_rejected("Invalid Google ID token"));
        }
        if !response.status().is_success() {
            return Err(AppError::new(
                crate::models::ErrorCode::ExternalServiceError,
                format!("Google tokeninfo returned {}", response.status()),
            ));
        }

        let info: TokenInfo = response.json().await?;
        let identity = info.into_identity(self.client_id.as_deref())?;
        info!("🔑 Google identity verified for {}", identity.email);
        Ok(identity)
    }
}

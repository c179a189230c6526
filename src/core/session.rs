//! Session tokens
//!
//! HS256 JWTs carrying [`SessionClaims`]. Stateless apart from the store's
//! revocation list keyed by token id, which only has to remember a token
//! until it would have expired anyway.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::models::{AppError, AppResult, AuthProvider, Role, User};
use crate::store::Store;

/// Fields propagated from the user into every session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// User id
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub role: Role,
    pub provider: AuthProvider,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
    /// Token id, used for revocation
    pub jti: Uuid,
}

impl SessionClaims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// Issued token plus what it encodes
#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub claims: SessionClaims,
}

pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    store: Arc<Store>,
}

impl SessionManager {
    /// Revocations live in `store` so they are persisted with its snapshot
    pub fn new(secret: &[u8], ttl: std::time::Duration, store: Arc<Store>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(30)),
            store,
        }
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> AppResult<IssuedSession> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::internal("Session expiry out of range"))?;
        let claims = SessionClaims {
            sub: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            image: user.image.clone(),
            role: user.role,
            provider: user.provider,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign session: {}", e)))?;

        Ok(IssuedSession {
            token,
            expires_at,
            claims,
        })
    }

    /// Decode and check signature, expiry and revocation
    pub fn verify(&self, token: &str) -> AppResult<SessionClaims> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::invalid_session("Session expired"),
                ErrorKind::InvalidSignature => {
                    AppError::invalid_session("Session signature mismatch")
                }
                _ => AppError::invalid_session("Malformed session token"),
            })?;

        if self.store.revoked_sessions.contains_key(&claims.jti) {
            return Err(AppError::invalid_session("Session revoked"));
        }
        Ok(claims)
    }

    pub fn revoke(&self, claims: &SessionClaims) {
        self.store.revoked_sessions.insert(claims.jti, claims.exp);
        debug!(jti = %claims.jti, "Session revoked");
    }

    /// Forget revocations whose tokens have expired anyway
    pub fn purge_revoked(&self, now: DateTime<Utc>) -> usize {
        let revoked = &self.store.revoked_sessions;
        let before = revoked.len();
        let cutoff = now.timestamp();
        revoked.retain(|_, exp| *exp > cutoff);
        before - revoked.len()
    }
}

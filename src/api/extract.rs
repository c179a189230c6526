//! Request extractors for the authenticated caller
//!
//! `session_middleware` stores verified [`SessionClaims`] in the request
//! extensions; these extractors read them back per auth level.

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::request::Parts,
};
use std::convert::Infallible;
use uuid::Uuid;

use crate::core::SessionClaims;
use crate::models::{AppError, Profile};

/// JSON body whose rejections use the API error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

/// Any signed-in user; 401 otherwise
pub struct CurrentUser(pub SessionClaims);

/// Signed-in admin; 401 when anonymous, 403 for other roles
pub struct AdminUser(pub SessionClaims);

/// Optional session for public endpoints that show more to owners
pub struct MaybeUser(pub Option<SessionClaims>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionClaims>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(AppError::unauthorized)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(claims) = CurrentUser::from_request_parts(parts, state).await?;
        if !claims.is_admin() {
            return Err(AppError::forbidden("Admin access required"));
        }
        Ok(AdminUser(claims))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<SessionClaims>().cloned()))
    }
}

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0.sub
    }

    /// Owner or admin may manage a profile
    pub fn can_manage(&self, profile: &Profile) -> bool {
        self.0.is_admin() || profile.is_owned_by(self.0.sub)
    }

    pub fn ensure_can_manage(&self, profile: &Profile) -> Result<(), AppError> {
        if self.can_manage(profile) {
            Ok(())
        } else {
            Err(AppError::forbidden("You do not manage this profile"))
        }
    }
}

//! Role-based authorization guards.
//!
//! Administrative endpoints (settings, cleanup, logs, admin pages) require the
//! `administrator` role. Download authorization is not a guard: it depends on the
//! runtime `allowed_roles` setting and is checked by the download gate itself.

use crate::core::error::AppError;
use crate::features::auth::model::AuthenticatedUser;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Guard for checking if user is an administrator.
///
/// # Example
/// ```ignore
/// pub async fn handler(RequireAdministrator(user): RequireAdministrator) { ... }
/// ```
pub struct RequireAdministrator(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireAdministrator
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .ok_or_else(|| AppError::Unauthorized("User not authenticated".to_string()))?;

        if !user.is_administrator() {
            return Err(AppError::Forbidden(
                "Administrator access required".to_string(),
            ));
        }

        Ok(RequireAdministrator(user.clone()))
    }
}

/// Optional user, for routes that answer anonymous callers themselves (the download gate).
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}

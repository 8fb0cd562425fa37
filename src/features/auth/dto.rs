use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::model::AuthenticatedUser;

/// DTO for /auth/me response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponseDto {
    pub sub: String,
    pub login: Option<String>,
    pub roles: Vec<String>,
    /// Whether the user's roles currently pass the download role check
    pub can_download: bool,
    pub is_administrator: bool,
}

impl MeResponseDto {
    pub fn new(user: AuthenticatedUser, allowed_roles: &[String]) -> Self {
        Self {
            can_download: user.has_any_role(allowed_roles),
            is_administrator: user.is_administrator(),
            sub: user.sub,
            login: user.login,
            roles: user.roles,
        }
    }
}

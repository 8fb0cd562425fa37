use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::shared::constants::ROLE_ADMINISTRATOR;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Stable user identifier from the host platform
    pub sub: String,
    /// Display login name (`preferred_username` claim), if the host sends one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    pub roles: Vec<String>,
}

impl AuthenticatedUser {
    /// Check if user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_administrator(&self) -> bool {
        self.has_role(ROLE_ADMINISTRATOR)
    }

    /// Check if user holds at least one of the given roles
    pub fn has_any_role<S: AsRef<str>>(&self, allowed: &[S]) -> bool {
        allowed.iter().any(|role| self.has_role(role.as_ref()))
    }

    /// Login name for logs, falling back to the subject
    pub fn display_login(&self) -> &str {
        self.login.as_deref().unwrap_or(&self.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(roles: &[&str]) -> AuthenticatedUser {
        AuthenticatedUser {
            sub: "42".to_string(),
            login: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_role_membership() {
        let editor = user(&["editor"]);
        assert!(!editor.is_administrator());
        assert!(editor.has_any_role(&["administrator", "editor"]));
        assert!(!editor.has_any_role(&["administrator"]));
        assert!(!editor.has_any_role::<&str>(&[]));
        assert!(user(&["administrator"]).is_administrator());
    }

    #[test]
    fn test_display_login_falls_back_to_sub() {
        let mut u = user(&[]);
        assert_eq!(u.display_login(), "42");
        u.login = Some("alice".to_string());
        assert_eq!(u.display_login(), "alice");
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Effective capability level of a profile. Parsed once per request from the
/// profile row; handlers check the enum rather than comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            "superadmin" => Some(Role::Superadmin),
            _ => None,
        }
    }

    /// Admin and superadmin may act on reports, delete content, and ban.
    pub fn is_moderator(&self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }

    pub fn is_superadmin(&self) -> bool {
        matches!(self, Role::Superadmin)
    }
}

/// JWT claims shared between token issuance (auth handlers) and token
/// validation (middleware). Canonical definition lives here in vigil-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::Member, Role::Admin, Role::Superadmin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("moderator"), None);
    }

    #[test]
    fn capability_checks() {
        assert!(!Role::Member.is_moderator());
        assert!(Role::Admin.is_moderator());
        assert!(Role::Superadmin.is_moderator());
        assert!(!Role::Admin.is_superadmin());
        assert!(Role::Superadmin.is_superadmin());
    }
}

//! Caller roles and identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Account role carried in the identity token.
///
/// Ordering follows privilege: a moderator outranks an admin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account.
    #[default]
    User = 1,
    /// Administrator.
    Admin = 2,
    /// Moderator, above admin.
    Moderator = 3,
}

impl Role {
    /// Convert role to its token string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Moderator => "moderator",
        }
    }

    /// Check if this role has at least the required level.
    ///
    /// # Examples
    ///
    /// ```
    /// use filedepot::auth::Role;
    ///
    /// assert!(Role::Moderator.can_access(Role::Admin));
    /// assert!(Role::Admin.can_access(Role::Admin));
    /// assert!(!Role::User.can_access(Role::Admin));
    /// ```
    pub fn can_access(&self, required: Role) -> bool {
        *self >= required
    }

    /// Admins and moderators bypass per-file permission rows.
    pub fn is_elevated(&self) -> bool {
        self.can_access(Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    /// User id (the token subject).
    pub id: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Whether the caller has an elevated role.
    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::User < Role::Admin);
        assert!(Role::Admin < Role::Moderator);
        assert!(Role::Moderator.can_access(Role::User));
        assert!(!Role::Admin.can_access(Role::Moderator));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("moderator".parse::<Role>().unwrap(), Role::Moderator);
        assert!("sysop".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_display_round_trip() {
        for role in [Role::User, Role::Admin, Role::Moderator] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_elevated() {
        assert!(!CurrentUser::new("u1", Role::User).is_elevated());
        assert!(CurrentUser::new("u2", Role::Admin).is_elevated());
        assert!(CurrentUser::new("u3", Role::Moderator).is_elevated());
    }
}

//! Server-verified caller identity.
//!
//! Every workflow operation receives a [`Principal`] that the HTTP layer built
//! from a verified token. Roles are never taken from client-held state.

use crate::error::{BoxOfficeError, Result};
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role granted to a principal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A shopper; may only act on their own orders
    Buyer,
    /// Staff; may set up sessions, view dashboards and cancel any order
    Admin,
}

impl Role {
    /// Claim value for this role
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = BoxOfficeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "buyer" | "user" => Ok(Self::Buyer),
            "admin" => Ok(Self::Admin),
            other => Err(BoxOfficeError::Validation(format!("unknown role: {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Verified user id
    pub user_id: UserId,
    /// Verified role
    pub role: Role,
}

impl Principal {
    /// A buyer principal
    #[must_use]
    pub const fn buyer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Buyer,
        }
    }

    /// An admin principal
    #[must_use]
    pub const fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    /// Whether the principal has the admin role
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// # Errors
    ///
    /// [`BoxOfficeError::Forbidden`] unless the principal is an admin.
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(BoxOfficeError::Forbidden("admin role required".into()))
        }
    }

    /// Ensures the principal owns the resource, or is an admin when
    /// `admin_allowed` is set.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Forbidden`] otherwise.
    pub fn require_owner(&self, owner: UserId, admin_allowed: bool) -> Result<()> {
        if self.user_id == owner || (admin_allowed && self.is_admin()) {
            Ok(())
        } else {
            Err(BoxOfficeError::Forbidden("order belongs to another user".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_rules() {
        let owner = UserId::new();
        let buyer = Principal::buyer(owner);
        let stranger = Principal::buyer(UserId::new());
        let admin = Principal::admin(UserId::new());

        assert!(buyer.require_owner(owner, false).is_ok());
        assert!(stranger.require_owner(owner, true).is_err());
        assert!(admin.require_owner(owner, true).is_ok());
        assert!(admin.require_owner(owner, false).is_err());
    }

    #[test]
    fn roles_parse_from_claims() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("user".parse::<Role>(), Ok(Role::Buyer));
        assert!("root".parse::<Role>().is_err());
        assert!(Principal::buyer(UserId::new()).require_admin().is_err());
    }
}

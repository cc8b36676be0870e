//! Role model and the static role -> route permission table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::error;

/// The two roles the service knows about. Unknown roles fail to parse and are
/// rejected before they ever reach an authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Role -> permitted route names. Read-only after construction.
#[derive(Debug, Clone)]
pub struct RolePermissions {
    permissions: HashMap<Role, Vec<&'static str>>,
}

impl Default for RolePermissions {
    fn default() -> Self {
        Self::new()
    }
}

impl RolePermissions {
    #[must_use]
    pub fn new() -> Self {
        let mut permissions = HashMap::new();
        permissions.insert(
            Role::Admin,
            vec![
                "GetAllCustomers",
                "GetCustomer",
                "GetAccountsForCustomer",
                "NewAccount",
                "NewTransaction",
            ],
        );
        permissions.insert(
            Role::User,
            vec!["GetCustomer", "GetAccountsForCustomer", "NewTransaction"],
        );
        Self { permissions }
    }

    #[must_use]
    pub fn is_authorized_for(&self, role: Role, route: &str) -> bool {
        let Some(routes) = self.permissions.get(&role) else {
            error!(%role, "Role has no permission entries");
            return false;
        };
        if routes.contains(&route) {
            return true;
        }
        error!(%role, route, "Client does not have role privileges to access route");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_can_access_all_routes() {
        let permissions = RolePermissions::new();
        for route in [
            "GetAllCustomers",
            "GetCustomer",
            "GetAccountsForCustomer",
            "NewAccount",
            "NewTransaction",
        ] {
            assert!(permissions.is_authorized_for(Role::Admin, route));
        }
    }

    #[test]
    fn user_is_restricted_to_own_routes() {
        let permissions = RolePermissions::new();
        assert!(permissions.is_authorized_for(Role::User, "GetCustomer"));
        assert!(permissions.is_authorized_for(Role::User, "GetAccountsForCustomer"));
        assert!(permissions.is_authorized_for(Role::User, "NewTransaction"));
        assert!(!permissions.is_authorized_for(Role::User, "GetAllCustomers"));
        assert!(!permissions.is_authorized_for(Role::User, "NewAccount"));
    }

    #[test]
    fn unknown_route_is_unauthorized() {
        let permissions = RolePermissions::new();
        assert!(!permissions.is_authorized_for(Role::Admin, "DropTables"));
    }

    #[test]
    fn role_parses_and_displays() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::User.to_string(), "user");
    }
}

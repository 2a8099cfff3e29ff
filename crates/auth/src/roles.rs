use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier carried in tokens (`admin`, `clerk`, `viewer`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const CLERK: &'static str = "clerk";
    pub const VIEWER: &'static str = "viewer";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn admin() -> Self {
        Self::new(Self::ADMIN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        matches!(self.as_str(), Self::ADMIN | Self::CLERK | Self::VIEWER)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role → permission policy.
///
/// Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut perms = Vec::new();
    for role in roles {
        match role.as_str() {
            Role::ADMIN => perms.push(Permission::new("*")),
            Role::CLERK => {
                perms.push(Permission::new("*.read"));
                perms.push(Permission::new("operations.*"));
                perms.push(Permission::new("stocks.adjust"));
            }
            Role::VIEWER => perms.push(Permission::new("*.read")),
            _ => {}
        }
    }
    perms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clerk_can_run_movements_but_not_edit_catalog() {
        let perms = permissions_for_roles(&[Role::new("clerk")]);
        let can = |p: &'static str| perms.iter().any(|h| h.grants(&Permission::new(p)));

        assert!(can("operations.complete"));
        assert!(can("stocks.adjust"));
        assert!(can("products.read"));
        assert!(!can("products.create"));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        assert!(permissions_for_roles(&[Role::new("intern")]).is_empty());
    }
}

use thiserror::Error;

use crate::{permissions_for_roles, Permission, Role, UserId};

/// An authenticated user with the permissions their roles resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn from_roles(user_id: UserId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            user_id,
            roles,
            permissions,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Permissions a command needs; checked by the API before dispatch.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Pure policy check: does `principal` hold `required`?
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.permissions.iter().any(|held| held.grants(required)) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_is_read_only() {
        let viewer = Principal::from_roles(UserId::generate(), vec![Role::new("viewer")]);
        assert!(authorize(&viewer, &Permission::new("operations.read")).is_ok());
        assert_eq!(
            authorize(&viewer, &Permission::new("operations.complete")),
            Err(AuthzError::Forbidden("operations.complete".to_string()))
        );
    }

    #[test]
    fn admin_is_allowed_everything() {
        let admin = Principal::from_roles(UserId::generate(), vec![Role::admin()]);
        assert!(authorize(&admin, &Permission::new("packaging_types.delete")).is_ok());
    }
}

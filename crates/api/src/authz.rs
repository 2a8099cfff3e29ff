//! API-side authorization guard.
//!
//! Permissions are checked at the handler boundary (before any service call),
//! keeping domain aggregates and infra auth-agnostic.

use stockbook_auth::{authorize, AuthzError, CommandAuthorization, Permission};

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

/// A single permission an operation needs.
struct Requirement([Permission; 1]);

impl CommandAuthorization for Requirement {
    fn required_permissions(&self) -> &[Permission] {
        &self.0
    }
}

/// Check every permission `command` requires against the request principal.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = principal.principal();
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// Shorthand used by handlers: `require(&principal, "products.create")?`.
pub fn require(principal: &PrincipalContext, permission: &'static str) -> Result<(), ApiError> {
    authorize_command(principal, &Requirement([Permission::new(permission)])).map_err(ApiError::from)
}

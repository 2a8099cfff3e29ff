//! `stockbook-auth`: users, roles, permissions and bearer-token validation.
//!
//! Decoupled from HTTP: the API crate extracts the bearer token and asks a
//! [`JwtValidator`] for the claims, then checks permissions with [`authorize`].

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod roles;
pub mod user;

pub use authorize::{authorize, AuthzError, CommandAuthorization, Principal};
pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use roles::{permissions_for_roles, Role};
pub use user::{
    DeactivateUser, RegisterUser, User, UserCommand, UserDeactivated, UserEvent, UserId,
    UserRegistered,
};

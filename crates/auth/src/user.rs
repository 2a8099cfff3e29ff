//! Back-office user accounts (event-sourced).
//!
//! Users only carry identity and a role; tokens are minted elsewhere. Email
//! uniqueness needs a read model and is checked by the application service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{require_text, Aggregate, AggregateRoot, DomainError};
use stockbook_events::Event;

use crate::Role;

stockbook_core::typed_id!(
    /// Identifier of a back-office user.
    UserId
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    email: String,
    display_name: String,
    role: Role,
    active: bool,
    version: u64,
    created: bool,
}

impl User {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            email: String::new(),
            display_name: String::new(),
            role: Role::new(Role::VIEWER),
            active: false,
            version: 0,
            created: false,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUser {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateUser {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCommand {
    Register(RegisterUser),
    Deactivate(DeactivateUser),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeactivated {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    Registered(UserRegistered),
    Deactivated(UserDeactivated),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Registered(_) => "auth.user.registered",
            UserEvent::Deactivated(_) => "auth.user.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Registered(e) => e.occurred_at,
            UserEvent::Deactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Registered(e) => {
                self.id = e.user_id;
                self.email = e.email.clone();
                self.display_name = e.display_name.clone();
                self.role = e.role.clone();
                self.active = true;
                self.created = true;
            }
            UserEvent::Deactivated(_) => {
                self.active = false;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Register(cmd) => self.handle_register(cmd),
            UserCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl User {
    fn handle_register(&self, cmd: &RegisterUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        require_text("display_name", &cmd.display_name)?;

        let email = cmd.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(DomainError::field("email", "must be a valid email address"));
        }
        if !cmd.role.is_known() {
            return Err(DomainError::field("role", format!("unknown role '{}'", cmd.role)));
        }

        Ok(vec![UserEvent::Registered(UserRegistered {
            user_id: cmd.user_id,
            email,
            display_name: cmd.display_name.trim().to_string(),
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateUser) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.active {
            return Err(DomainError::conflict("user is already deactivated"));
        }
        Ok(vec![UserEvent::Deactivated(UserDeactivated {
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbook_events::execute;

    fn register(id: UserId, email: &str) -> UserCommand {
        UserCommand::Register(RegisterUser {
            user_id: id,
            email: email.to_string(),
            display_name: "Admin".to_string(),
            role: Role::admin(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn register_normalizes_email() {
        let id = UserId::generate();
        let mut user = User::empty(id);
        execute(&mut user, &register(id, "  Admin@Example.com ")).unwrap();

        assert_eq!(user.email(), "admin@example.com");
        assert!(user.is_active());
        assert_eq!(user.version(), 1);
    }

    #[test]
    fn register_rejects_bad_email() {
        let id = UserId::generate();
        let err = User::empty(id).handle(&register(id, "nope")).unwrap_err();
        assert_eq!(err, DomainError::field("email", "must be a valid email address"));
    }

    #[test]
    fn deactivate_twice_conflicts() {
        let id = UserId::generate();
        let mut user = User::empty(id);
        execute(&mut user, &register(id, "a@b.co")).unwrap();

        let deactivate = UserCommand::Deactivate(DeactivateUser {
            user_id: id,
            occurred_at: Utc::now(),
        });
        execute(&mut user, &deactivate).unwrap();
        assert!(matches!(user.handle(&deactivate), Err(DomainError::Conflict(_))));
    }
}

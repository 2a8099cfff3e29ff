//! Packaging types: the unit a product is stored and sold in (carton, bag, piece).
//!
//! The `code` doubles as the entry unit on movement lines, so it is kept in a
//! normalized lowercase form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{require_text, Aggregate, AggregateRoot, DomainError, DomainResult};
use stockbook_events::Event;

stockbook_core::typed_id!(PackagingTypeId);

const MAX_CODE_LEN: usize = 20;

/// Normalize and validate a packaging code (`"  Carton "` -> `"carton"`).
pub fn normalize_code(raw: &str) -> DomainResult<String> {
    let code = raw.trim().to_lowercase();
    if code.is_empty() {
        return Err(DomainError::field("code", "is required"));
    }
    if code.chars().count() > MAX_CODE_LEN {
        return Err(DomainError::field(
            "code",
            format!("must be at most {MAX_CODE_LEN} characters"),
        ));
    }
    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DomainError::field(
            "code",
            "may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(code)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagingType {
    id: PackagingTypeId,
    name: String,
    code: String,
    active: bool,
    version: u64,
    created: bool,
    deleted: bool,
}

impl PackagingType {
    pub fn empty(id: PackagingTypeId) -> Self {
        Self {
            id,
            name: String::new(),
            code: String::new(),
            active: false,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for PackagingType {
    type Id = PackagingTypeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePackagingType {
    pub packaging_type_id: PackagingTypeId,
    pub name: String,
    pub code: String,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePackagingType {
    pub packaging_type_id: PackagingTypeId,
    pub name: String,
    pub code: String,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePackagingType {
    pub packaging_type_id: PackagingTypeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackagingTypeCommand {
    Create(CreatePackagingType),
    Update(UpdatePackagingType),
    Delete(DeletePackagingType),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingTypeCreated {
    pub packaging_type_id: PackagingTypeId,
    pub name: String,
    pub code: String,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingTypeUpdated {
    pub packaging_type_id: PackagingTypeId,
    pub name: String,
    pub code: String,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingTypeDeleted {
    pub packaging_type_id: PackagingTypeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackagingTypeEvent {
    Created(PackagingTypeCreated),
    Updated(PackagingTypeUpdated),
    Deleted(PackagingTypeDeleted),
}

impl Event for PackagingTypeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PackagingTypeEvent::Created(_) => "catalog.packaging_type.created",
            PackagingTypeEvent::Updated(_) => "catalog.packaging_type.updated",
            PackagingTypeEvent::Deleted(_) => "catalog.packaging_type.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PackagingTypeEvent::Created(e) => e.occurred_at,
            PackagingTypeEvent::Updated(e) => e.occurred_at,
            PackagingTypeEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PackagingType {
    type Command = PackagingTypeCommand;
    type Event = PackagingTypeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PackagingTypeEvent::Created(e) => {
                self.id = e.packaging_type_id;
                self.name = e.name.clone();
                self.code = e.code.clone();
                self.active = e.active;
                self.created = true;
            }
            PackagingTypeEvent::Updated(e) => {
                self.name = e.name.clone();
                self.code = e.code.clone();
                self.active = e.active;
            }
            PackagingTypeEvent::Deleted(_) => {
                self.deleted = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PackagingTypeCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("packaging type already exists"));
                }
                require_text("name", &cmd.name)?;
                let code = normalize_code(&cmd.code)?;
                Ok(vec![PackagingTypeEvent::Created(PackagingTypeCreated {
                    packaging_type_id: cmd.packaging_type_id,
                    name: cmd.name.trim().to_string(),
                    code,
                    active: cmd.active,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PackagingTypeCommand::Update(cmd) => {
                self.ensure_live()?;
                require_text("name", &cmd.name)?;
                let code = normalize_code(&cmd.code)?;
                Ok(vec![PackagingTypeEvent::Updated(PackagingTypeUpdated {
                    packaging_type_id: self.id,
                    name: cmd.name.trim().to_string(),
                    code,
                    active: cmd.active,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PackagingTypeCommand::Delete(cmd) => {
                self.ensure_live()?;
                Ok(vec![PackagingTypeEvent::Deleted(PackagingTypeDeleted {
                    packaging_type_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl PackagingType {
    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{require_text, Aggregate, AggregateRoot, DomainError};
use stockbook_events::Event;

stockbook_core::typed_id!(WarehouseId);

/// Aggregate root: Warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warehouse {
    id: WarehouseId,
    name: String,
    code: String,
    address: Option<String>,
    active: bool,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Warehouse {
    pub fn empty(id: WarehouseId) -> Self {
        Self {
            id,
            name: String::new(),
            code: String::new(),
            address: None,
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

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWarehouse {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateWarehouse {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteWarehouse {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseCommand {
    Create(CreateWarehouse),
    Update(UpdateWarehouse),
    Delete(DeleteWarehouse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseCreated {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseUpdated {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseDeleted {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseEvent {
    Created(WarehouseCreated),
    Updated(WarehouseUpdated),
    Deleted(WarehouseDeleted),
}

impl Event for WarehouseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WarehouseEvent::Created(_) => "inventory.warehouse.created",
            WarehouseEvent::Updated(_) => "inventory.warehouse.updated",
            WarehouseEvent::Deleted(_) => "inventory.warehouse.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WarehouseEvent::Created(e) => e.occurred_at,
            WarehouseEvent::Updated(e) => e.occurred_at,
            WarehouseEvent::Deleted(e) => e.occurred_at,
        }
    }
}

fn clean_code(raw: &str) -> Result<String, DomainError> {
    require_text("code", raw)?;
    let code = raw.trim().to_uppercase();
    if code.chars().any(char::is_whitespace) {
        return Err(DomainError::field("code", "must not contain spaces"));
    }
    Ok(code)
}

fn clean_address(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Aggregate for Warehouse {
    type Command = WarehouseCommand;
    type Event = WarehouseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WarehouseEvent::Created(e) => {
                self.id = e.warehouse_id;
                self.name = e.name.clone();
                self.code = e.code.clone();
                self.address = e.address.clone();
                self.active = e.active;
                self.created = true;
            }
            WarehouseEvent::Updated(e) => {
                self.name = e.name.clone();
                self.code = e.code.clone();
                self.address = e.address.clone();
                self.active = e.active;
            }
            WarehouseEvent::Deleted(_) => {
                self.deleted = true;
                self.active = false;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WarehouseCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("warehouse already exists"));
                }
                require_text("name", &cmd.name)?;
                Ok(vec![WarehouseEvent::Created(WarehouseCreated {
                    warehouse_id: cmd.warehouse_id,
                    name: cmd.name.trim().to_string(),
                    code: clean_code(&cmd.code)?,
                    address: clean_address(&cmd.address),
                    active: cmd.active,
                    occurred_at: cmd.occurred_at,
                })])
            }
            WarehouseCommand::Update(cmd) => {
                self.ensure_live()?;
                require_text("name", &cmd.name)?;
                Ok(vec![WarehouseEvent::Updated(WarehouseUpdated {
                    warehouse_id: self.id,
                    name: cmd.name.trim().to_string(),
                    code: clean_code(&cmd.code)?,
                    address: clean_address(&cmd.address),
                    active: cmd.active,
                    occurred_at: cmd.occurred_at,
                })])
            }
            WarehouseCommand::Delete(cmd) => {
                self.ensure_live()?;
                Ok(vec![WarehouseEvent::Deleted(WarehouseDeleted {
                    warehouse_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Warehouse {
    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_uppercases_code() {
        let id = WarehouseId::generate();
        let events = Warehouse::empty(id)
            .handle(&WarehouseCommand::Create(CreateWarehouse {
                warehouse_id: id,
                name: "Main depot".to_string(),
                code: " wh-main ".to_string(),
                address: Some(String::new()),
                active: true,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        match &events[0] {
            WarehouseEvent::Created(e) => {
                assert_eq!(e.code, "WH-MAIN");
                assert_eq!(e.address, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn code_with_spaces_is_rejected() {
        let id = WarehouseId::generate();
        let err = Warehouse::empty(id)
            .handle(&WarehouseCommand::Create(CreateWarehouse {
                warehouse_id: id,
                name: "Annex".to_string(),
                code: "WH 2".to_string(),
                address: None,
                active: true,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::field("code", "must not contain spaces"));
    }

    #[test]
    fn missing_warehouse_cannot_be_deleted() {
        let id = WarehouseId::generate();
        let err = Warehouse::empty(id)
            .handle(&WarehouseCommand::Delete(DeleteWarehouse {
                warehouse_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}

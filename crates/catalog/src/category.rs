use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{require_text, Aggregate, AggregateRoot, DomainError};
use stockbook_events::Event;

stockbook_core::typed_id!(CategoryId);

/// Aggregate root: Category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    id: CategoryId,
    name: String,
    description: Option<String>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Category {
    pub fn empty(id: CategoryId) -> Self {
        Self {
            id,
            name: String::new(),
            description: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCategory {
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCategory {
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCategory {
    pub category_id: CategoryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryCommand {
    Create(CreateCategory),
    Update(UpdateCategory),
    Delete(DeleteCategory),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCreated {
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUpdated {
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDeleted {
    pub category_id: CategoryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryEvent {
    Created(CategoryCreated),
    Updated(CategoryUpdated),
    Deleted(CategoryDeleted),
}

impl Event for CategoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CategoryEvent::Created(_) => "catalog.category.created",
            CategoryEvent::Updated(_) => "catalog.category.updated",
            CategoryEvent::Deleted(_) => "catalog.category.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CategoryEvent::Created(e) => e.occurred_at,
            CategoryEvent::Updated(e) => e.occurred_at,
            CategoryEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Category {
    type Command = CategoryCommand;
    type Event = CategoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CategoryEvent::Created(e) => {
                self.id = e.category_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.created = true;
            }
            CategoryEvent::Updated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
            }
            CategoryEvent::Deleted(_) => {
                self.deleted = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CategoryCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("category already exists"));
                }
                require_text("name", &cmd.name)?;
                Ok(vec![CategoryEvent::Created(CategoryCreated {
                    category_id: cmd.category_id,
                    name: cmd.name.trim().to_string(),
                    description: clean_optional(&cmd.description),
                    occurred_at: cmd.occurred_at,
                })])
            }
            CategoryCommand::Update(cmd) => {
                self.ensure_live()?;
                require_text("name", &cmd.name)?;
                Ok(vec![CategoryEvent::Updated(CategoryUpdated {
                    category_id: self.id,
                    name: cmd.name.trim().to_string(),
                    description: clean_optional(&cmd.description),
                    occurred_at: cmd.occurred_at,
                })])
            }
            CategoryCommand::Delete(cmd) => {
                self.ensure_live()?;
                Ok(vec![CategoryEvent::Deleted(CategoryDeleted {
                    category_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Category {
    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        Ok(())
    }
}

/// Blank optional text collapses to `None`.
pub(crate) fn clean_optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

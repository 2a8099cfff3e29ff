//! Stock movements: incoming, outgoing and transfer documents.
//!
//! A movement is a draft until it is completed or cancelled; both are
//! terminal. Items live inside the aggregate and go away with it. The stock
//! effects of a completion are booked on the [`StockLedger`](crate::StockLedger)
//! by the application service, using [`StockMovement::posting_lines`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_auth::UserId;
use stockbook_catalog::ProductId;
use stockbook_core::{require_text, Aggregate, AggregateRoot, DomainError, DomainResult};
use stockbook_events::Event;
use stockbook_parties::PartyId;

use crate::{PostingLine, WarehouseId};

stockbook_core::typed_id!(
    /// Stock movement identifier.
    MovementId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
    Transfer,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Transfer => "transfer",
        }
    }

    /// Prefix used for generated references (`IN-20240101-0001`).
    pub fn reference_prefix(self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Transfer => "TRF",
        }
    }

    fn label(self) -> &'static str {
        match self {
            MovementType::In => "incoming",
            MovementType::Out => "outgoing",
            MovementType::Transfer => "transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementStatus {
    Draft,
    Completed,
    Cancelled,
}

impl MovementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementStatus::Draft => "draft",
            MovementStatus::Completed => "completed",
            MovementStatus::Cancelled => "cancelled",
        }
    }
}

/// A booked line of a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity_in_base_unit: u64,
    pub entered_quantity: Decimal,
    pub entered_unit: String,
    /// Minor currency units.
    pub unit_price: Option<u64>,
}

/// A line to add; the aggregate assigns its line number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub product_id: ProductId,
    pub quantity_in_base_unit: u64,
    pub entered_quantity: Decimal,
    pub entered_unit: String,
    pub unit_price: Option<u64>,
}

/// Aggregate root: StockMovement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    id: MovementId,
    reference: String,
    movement_type: MovementType,
    status: MovementStatus,
    from_warehouse: Option<WarehouseId>,
    to_warehouse: Option<WarehouseId>,
    supplier_id: Option<PartyId>,
    customer_id: Option<PartyId>,
    created_by: Option<UserId>,
    notes: Option<String>,
    moved_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    items: Vec<MovementItem>,
    next_line_no: u32,
    version: u64,
    created: bool,
    deleted: bool,
}

impl StockMovement {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: MovementId) -> Self {
        Self {
            id,
            reference: String::new(),
            movement_type: MovementType::In,
            status: MovementStatus::Draft,
            from_warehouse: None,
            to_warehouse: None,
            supplier_id: None,
            customer_id: None,
            created_by: None,
            notes: None,
            moved_at: None,
            completed_at: None,
            cancelled_at: None,
            items: Vec::new(),
            next_line_no: 1,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn movement_type(&self) -> MovementType {
        self.movement_type
    }

    pub fn status(&self) -> MovementStatus {
        self.status
    }

    pub fn from_warehouse(&self) -> Option<WarehouseId> {
        self.from_warehouse
    }

    pub fn to_warehouse(&self) -> Option<WarehouseId> {
        self.to_warehouse
    }

    pub fn items(&self) -> &[MovementItem] {
        &self.items
    }

    pub fn is_created(&self) -> bool {
        self.created && !self.deleted
    }

    /// Signed ledger deltas this movement books when completed.
    ///
    /// `in` adds to the destination, `out` takes from the source, `transfer`
    /// does both.
    pub fn posting_lines(&self) -> DomainResult<Vec<PostingLine>> {
        let mut lines = Vec::with_capacity(self.items.len() * 2);
        for item in &self.items {
            let qty = i64::try_from(item.quantity_in_base_unit)
                .map_err(|_| DomainError::invariant("quantity exceeds the stock range"))?;

            if matches!(self.movement_type, MovementType::Out | MovementType::Transfer) {
                let from = self
                    .from_warehouse
                    .ok_or_else(|| DomainError::invariant("movement has no source warehouse"))?;
                lines.push(PostingLine {
                    line_no: item.line_no,
                    product_id: item.product_id,
                    warehouse_id: from,
                    delta: -qty,
                });
            }
            if matches!(self.movement_type, MovementType::In | MovementType::Transfer) {
                let to = self
                    .to_warehouse
                    .ok_or_else(|| DomainError::invariant("movement has no destination warehouse"))?;
                lines.push(PostingLine {
                    line_no: item.line_no,
                    product_id: item.product_id,
                    warehouse_id: to,
                    delta: qty,
                });
            }
        }
        Ok(lines)
    }
}

impl AggregateRoot for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMovement {
    pub movement_id: MovementId,
    pub reference: String,
    pub movement_type: MovementType,
    pub from_warehouse: Option<WarehouseId>,
    pub to_warehouse: Option<WarehouseId>,
    pub supplier_id: Option<PartyId>,
    pub customer_id: Option<PartyId>,
    pub created_by: UserId,
    pub notes: Option<String>,
    /// Defaults to `occurred_at`.
    pub moved_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateMovement (draft header fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMovement {
    pub movement_id: MovementId,
    pub notes: Option<String>,
    /// `None` keeps the current movement date.
    pub moved_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItems {
    pub movement_id: MovementId,
    pub items: Vec<NewItem>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub movement_id: MovementId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteMovement {
    pub movement_id: MovementId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelMovement {
    pub movement_id: MovementId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMovement {
    pub movement_id: MovementId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementCommand {
    Create(CreateMovement),
    Update(UpdateMovement),
    AddItems(AddItems),
    RemoveItem(RemoveItem),
    Complete(CompleteMovement),
    Cancel(CancelMovement),
    Delete(DeleteMovement),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementCreated {
    pub movement_id: MovementId,
    pub reference: String,
    pub movement_type: MovementType,
    pub from_warehouse: Option<WarehouseId>,
    pub to_warehouse: Option<WarehouseId>,
    pub supplier_id: Option<PartyId>,
    pub customer_id: Option<PartyId>,
    pub created_by: UserId,
    pub notes: Option<String>,
    pub moved_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementUpdated {
    pub movement_id: MovementId,
    pub notes: Option<String>,
    pub moved_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsAdded {
    pub movement_id: MovementId,
    pub items: Vec<MovementItem>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub movement_id: MovementId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementCompleted {
    pub movement_id: MovementId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementCancelled {
    pub movement_id: MovementId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDeleted {
    pub movement_id: MovementId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementEvent {
    Created(MovementCreated),
    Updated(MovementUpdated),
    ItemsAdded(ItemsAdded),
    ItemRemoved(ItemRemoved),
    Completed(MovementCompleted),
    Cancelled(MovementCancelled),
    Deleted(MovementDeleted),
}

impl Event for MovementEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MovementEvent::Created(_) => "inventory.movement.created",
            MovementEvent::Updated(_) => "inventory.movement.updated",
            MovementEvent::ItemsAdded(_) => "inventory.movement.items_added",
            MovementEvent::ItemRemoved(_) => "inventory.movement.item_removed",
            MovementEvent::Completed(_) => "inventory.movement.completed",
            MovementEvent::Cancelled(_) => "inventory.movement.cancelled",
            MovementEvent::Deleted(_) => "inventory.movement.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MovementEvent::Created(e) => e.occurred_at,
            MovementEvent::Updated(e) => e.occurred_at,
            MovementEvent::ItemsAdded(e) => e.occurred_at,
            MovementEvent::ItemRemoved(e) => e.occurred_at,
            MovementEvent::Completed(e) => e.occurred_at,
            MovementEvent::Cancelled(e) => e.occurred_at,
            MovementEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockMovement {
    type Command = MovementCommand;
    type Event = MovementEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MovementEvent::Created(e) => {
                self.id = e.movement_id;
                self.reference = e.reference.clone();
                self.movement_type = e.movement_type;
                self.status = MovementStatus::Draft;
                self.from_warehouse = e.from_warehouse;
                self.to_warehouse = e.to_warehouse;
                self.supplier_id = e.supplier_id;
                self.customer_id = e.customer_id;
                self.created_by = Some(e.created_by);
                self.notes = e.notes.clone();
                self.moved_at = Some(e.moved_at);
                self.created = true;
            }
            MovementEvent::Updated(e) => {
                self.notes = e.notes.clone();
                self.moved_at = Some(e.moved_at);
            }
            MovementEvent::ItemsAdded(e) => {
                for item in &e.items {
                    self.next_line_no = self.next_line_no.max(item.line_no.saturating_add(1));
                    self.items.push(item.clone());
                }
            }
            MovementEvent::ItemRemoved(e) => {
                self.items.retain(|i| i.line_no != e.line_no);
            }
            MovementEvent::Completed(e) => {
                self.status = MovementStatus::Completed;
                self.completed_at = Some(e.occurred_at);
            }
            MovementEvent::Cancelled(e) => {
                self.status = MovementStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
            }
            MovementEvent::Deleted(_) => {
                self.deleted = true;
                self.items.clear();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MovementCommand::Create(cmd) => self.handle_create(cmd),
            MovementCommand::Update(cmd) => self.handle_update(cmd),
            MovementCommand::AddItems(cmd) => self.handle_add_items(cmd),
            MovementCommand::RemoveItem(cmd) => self.handle_remove_item(cmd),
            MovementCommand::Complete(cmd) => self.handle_complete(cmd),
            MovementCommand::Cancel(cmd) => self.handle_cancel(cmd),
            MovementCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

fn clean_notes(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Enforce which warehouses and parties a movement of `kind` carries.
fn check_routing(cmd: &CreateMovement) -> DomainResult<()> {
    let kind = cmd.movement_type;
    let required = |field: &str, present: bool| -> DomainResult<()> {
        if present {
            Ok(())
        } else {
            Err(DomainError::field(field, "is required"))
        }
    };
    let forbidden = |field: &str, present: bool| -> DomainResult<()> {
        if present {
            Err(DomainError::field(
                field,
                format!("must be empty for {} movements", kind.label()),
            ))
        } else {
            Ok(())
        }
    };

    match kind {
        MovementType::In => {
            required("to_warehouse_id", cmd.to_warehouse.is_some())?;
            required("supplier_id", cmd.supplier_id.is_some())?;
            forbidden("from_warehouse_id", cmd.from_warehouse.is_some())?;
            forbidden("customer_id", cmd.customer_id.is_some())?;
        }
        MovementType::Out => {
            required("from_warehouse_id", cmd.from_warehouse.is_some())?;
            required("customer_id", cmd.customer_id.is_some())?;
            forbidden("to_warehouse_id", cmd.to_warehouse.is_some())?;
            forbidden("supplier_id", cmd.supplier_id.is_some())?;
        }
        MovementType::Transfer => {
            required("from_warehouse_id", cmd.from_warehouse.is_some())?;
            required("to_warehouse_id", cmd.to_warehouse.is_some())?;
            forbidden("supplier_id", cmd.supplier_id.is_some())?;
            forbidden("customer_id", cmd.customer_id.is_some())?;
            if cmd.from_warehouse == cmd.to_warehouse {
                return Err(DomainError::field(
                    "to_warehouse_id",
                    "must differ from the source warehouse",
                ));
            }
        }
    }
    Ok(())
}

impl StockMovement {
    fn ensure_exists(&self, movement_id: MovementId) -> DomainResult<()> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        if self.id != movement_id {
            return Err(DomainError::invariant("movement_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self, action: &str) -> DomainResult<()> {
        if self.status != MovementStatus::Draft {
            return Err(DomainError::invariant(format!(
                "cannot {action} a {} movement",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateMovement) -> Result<Vec<MovementEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("movement already exists"));
        }
        require_text("reference", &cmd.reference)?;
        check_routing(cmd)?;

        Ok(vec![MovementEvent::Created(MovementCreated {
            movement_id: cmd.movement_id,
            reference: cmd.reference.trim().to_string(),
            movement_type: cmd.movement_type,
            from_warehouse: cmd.from_warehouse,
            to_warehouse: cmd.to_warehouse,
            supplier_id: cmd.supplier_id,
            customer_id: cmd.customer_id,
            created_by: cmd.created_by,
            notes: clean_notes(&cmd.notes),
            moved_at: cmd.moved_at.unwrap_or(cmd.occurred_at),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateMovement) -> Result<Vec<MovementEvent>, DomainError> {
        self.ensure_exists(cmd.movement_id)?;
        self.ensure_draft("edit")?;

        let moved_at = cmd
            .moved_at
            .or(self.moved_at)
            .unwrap_or(cmd.occurred_at);

        Ok(vec![MovementEvent::Updated(MovementUpdated {
            movement_id: cmd.movement_id,
            notes: clean_notes(&cmd.notes),
            moved_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_items(&self, cmd: &AddItems) -> Result<Vec<MovementEvent>, DomainError> {
        self.ensure_exists(cmd.movement_id)?;
        self.ensure_draft("add items to")?;

        if cmd.items.is_empty() {
            return Err(DomainError::field("items", "at least one item is required"));
        }

        let mut line_no = self.next_line_no;
        let mut items = Vec::with_capacity(cmd.items.len());
        for (idx, new) in cmd.items.iter().enumerate() {
            if new.quantity_in_base_unit == 0 {
                return Err(DomainError::field(
                    format!("items.{idx}.quantity"),
                    "must be greater than 0",
                ));
            }
            if new.entered_quantity <= Decimal::ZERO {
                return Err(DomainError::field(
                    format!("items.{idx}.quantity"),
                    "must be greater than 0",
                ));
            }
            if new.entered_unit.trim().is_empty() {
                return Err(DomainError::field(format!("items.{idx}.unit"), "is required"));
            }

            items.push(MovementItem {
                line_no,
                product_id: new.product_id,
                quantity_in_base_unit: new.quantity_in_base_unit,
                entered_quantity: new.entered_quantity.normalize(),
                entered_unit: new.entered_unit.trim().to_lowercase(),
                unit_price: new.unit_price,
            });
            line_no = line_no
                .checked_add(1)
                .ok_or_else(|| DomainError::invariant("too many lines on movement"))?;
        }

        Ok(vec![MovementEvent::ItemsAdded(ItemsAdded {
            movement_id: cmd.movement_id,
            items,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveItem) -> Result<Vec<MovementEvent>, DomainError> {
        self.ensure_exists(cmd.movement_id)?;
        self.ensure_draft("remove items from")?;

        if !self.items.iter().any(|i| i.line_no == cmd.line_no) {
            return Err(DomainError::not_found());
        }

        Ok(vec![MovementEvent::ItemRemoved(ItemRemoved {
            movement_id: cmd.movement_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteMovement) -> Result<Vec<MovementEvent>, DomainError> {
        self.ensure_exists(cmd.movement_id)?;
        self.ensure_draft("complete")?;

        if self.items.is_empty() {
            return Err(DomainError::invariant("cannot complete a movement without items"));
        }

        Ok(vec![MovementEvent::Completed(MovementCompleted {
            movement_id: cmd.movement_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelMovement) -> Result<Vec<MovementEvent>, DomainError> {
        self.ensure_exists(cmd.movement_id)?;
        self.ensure_draft("cancel")?;

        Ok(vec![MovementEvent::Cancelled(MovementCancelled {
            movement_id: cmd.movement_id,
            reason: clean_notes(&cmd.reason),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteMovement) -> Result<Vec<MovementEvent>, DomainError> {
        self.ensure_exists(cmd.movement_id)?;
        if self.status == MovementStatus::Completed {
            return Err(DomainError::invariant("cannot delete a completed movement"));
        }

        Ok(vec![MovementEvent::Deleted(MovementDeleted {
            movement_id: cmd.movement_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbook_events::execute;

    fn create_cmd(id: MovementId, kind: MovementType) -> CreateMovement {
        CreateMovement {
            movement_id: id,
            reference: "MV-0001".to_string(),
            movement_type: kind,
            from_warehouse: None,
            to_warehouse: None,
            supplier_id: None,
            customer_id: None,
            created_by: UserId::generate(),
            notes: None,
            moved_at: None,
            occurred_at: Utc::now(),
        }
    }

    fn incoming() -> (StockMovement, WarehouseId) {
        let id = MovementId::generate();
        let to = WarehouseId::generate();
        let mut cmd = create_cmd(id, MovementType::In);
        cmd.to_warehouse = Some(to);
        cmd.supplier_id = Some(PartyId::generate());

        let mut movement = StockMovement::empty(id);
        execute(&mut movement, &MovementCommand::Create(cmd)).unwrap();
        (movement, to)
    }

    fn new_item(product_id: ProductId, qty: u64) -> NewItem {
        NewItem {
            product_id,
            quantity_in_base_unit: qty,
            entered_quantity: Decimal::from(qty),
            entered_unit: "unit".to_string(),
            unit_price: Some(100),
        }
    }

    fn add(movement: &mut StockMovement, items: Vec<NewItem>) {
        let movement_id = *movement.id();
        execute(
            movement,
            &MovementCommand::AddItems(AddItems {
                movement_id,
                items,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }

    fn complete(movement: &mut StockMovement) -> Result<Vec<MovementEvent>, DomainError> {
        let movement_id = *movement.id();
        execute(
            movement,
            &MovementCommand::Complete(CompleteMovement {
                movement_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn transfer_requires_both_warehouses() {
        let id = MovementId::generate();
        let mut cmd = create_cmd(id, MovementType::Transfer);
        cmd.from_warehouse = Some(WarehouseId::generate());

        let err = StockMovement::empty(id)
            .handle(&MovementCommand::Create(cmd))
            .unwrap_err();
        assert_eq!(err, DomainError::field("to_warehouse_id", "is required"));
    }

    #[test]
    fn transfer_to_same_warehouse_is_rejected() {
        let id = MovementId::generate();
        let wh = WarehouseId::generate();
        let mut cmd = create_cmd(id, MovementType::Transfer);
        cmd.from_warehouse = Some(wh);
        cmd.to_warehouse = Some(wh);

        let err = StockMovement::empty(id)
            .handle(&MovementCommand::Create(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidField { ref field, .. } if field == "to_warehouse_id"));
    }

    #[test]
    fn incoming_rejects_a_customer() {
        let id = MovementId::generate();
        let mut cmd = create_cmd(id, MovementType::In);
        cmd.to_warehouse = Some(WarehouseId::generate());
        cmd.supplier_id = Some(PartyId::generate());
        cmd.customer_id = Some(PartyId::generate());

        let err = StockMovement::empty(id)
            .handle(&MovementCommand::Create(cmd))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::field("customer_id", "must be empty for incoming movements")
        );
    }

    #[test]
    fn outgoing_requires_a_customer() {
        let id = MovementId::generate();
        let mut cmd = create_cmd(id, MovementType::Out);
        cmd.from_warehouse = Some(WarehouseId::generate());

        let err = StockMovement::empty(id)
            .handle(&MovementCommand::Create(cmd))
            .unwrap_err();
        assert_eq!(err, DomainError::field("customer_id", "is required"));
    }

    #[test]
    fn moved_at_defaults_to_creation_time() {
        let (movement, _) = incoming();
        assert!(movement.moved_at.is_some());
        assert_eq!(movement.status(), MovementStatus::Draft);
    }

    #[test]
    fn line_numbers_are_sequential_and_not_reused() {
        let (mut movement, _) = incoming();
        let p = ProductId::generate();
        add(&mut movement, vec![new_item(p, 1), new_item(p, 2)]);

        let movement_id = *movement.id();
        execute(
            &mut movement,
            &MovementCommand::RemoveItem(RemoveItem {
                movement_id,
                line_no: 2,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        add(&mut movement, vec![new_item(p, 3)]);

        let lines: Vec<u32> = movement.items().iter().map(|i| i.line_no).collect();
        assert_eq!(lines, vec![1, 3]);
    }

    #[test]
    fn zero_quantity_item_is_rejected() {
        let (movement, _) = incoming();
        let err = movement
            .handle(&MovementCommand::AddItems(AddItems {
                movement_id: *movement.id(),
                items: vec![new_item(ProductId::generate(), 0)],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::field("items.0.quantity", "must be greater than 0"));
    }

    #[test]
    fn cannot_complete_without_items() {
        let (mut movement, _) = incoming();
        let err = complete(&mut movement).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn completed_is_terminal() {
        let (mut movement, _) = incoming();
        add(&mut movement, vec![new_item(ProductId::generate(), 5)]);
        complete(&mut movement).unwrap();
        assert_eq!(movement.status(), MovementStatus::Completed);

        assert!(matches!(complete(&mut movement), Err(DomainError::InvariantViolation(_))));

        let movement_id = *movement.id();
        let cancel = movement.handle(&MovementCommand::Cancel(CancelMovement {
            movement_id,
            reason: None,
            occurred_at: Utc::now(),
        }));
        assert!(matches!(cancel, Err(DomainError::InvariantViolation(_))));

        let delete = movement.handle(&MovementCommand::Delete(DeleteMovement {
            movement_id,
            occurred_at: Utc::now(),
        }));
        assert!(matches!(delete, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn cancelled_movement_can_be_deleted() {
        let (mut movement, _) = incoming();
        let movement_id = *movement.id();
        execute(
            &mut movement,
            &MovementCommand::Cancel(CancelMovement {
                movement_id,
                reason: Some("duplicate".to_string()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut movement,
            &MovementCommand::Delete(DeleteMovement {
                movement_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert!(!movement.is_created());
        assert!(movement.items().is_empty());
    }

    #[test]
    fn transfer_posts_both_sides() {
        let id = MovementId::generate();
        let (from, to) = (WarehouseId::generate(), WarehouseId::generate());
        let mut cmd = create_cmd(id, MovementType::Transfer);
        cmd.from_warehouse = Some(from);
        cmd.to_warehouse = Some(to);

        let mut movement = StockMovement::empty(id);
        execute(&mut movement, &MovementCommand::Create(cmd)).unwrap();
        let p = ProductId::generate();
        add(&mut movement, vec![new_item(p, 4)]);

        let lines = movement.posting_lines().unwrap();
        assert_eq!(
            lines,
            vec![
                PostingLine { line_no: 1, product_id: p, warehouse_id: from, delta: -4 },
                PostingLine { line_no: 1, product_id: p, warehouse_id: to, delta: 4 },
            ]
        );
    }

    #[test]
    fn incoming_posts_to_destination() {
        let (mut movement, to) = incoming();
        let p = ProductId::generate();
        add(&mut movement, vec![new_item(p, 2), new_item(p, 3)]);

        let total: i64 = movement
            .posting_lines()
            .unwrap()
            .iter()
            .filter(|l| l.warehouse_id == to)
            .map(|l| l.delta)
            .sum();
        assert_eq!(total, 5);
    }
}

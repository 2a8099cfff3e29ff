//! Stock ledger (event-sourced).
//!
//! One ledger aggregate holds every stock delta of the business, so all
//! postings serialize on a single stream and optimistic concurrency closes
//! the check-then-write race between concurrent completions.
//!
//! Invariants enforced here:
//! - no (product, warehouse) balance ever becomes negative;
//! - a posting is one event, all lines or nothing;
//! - a movement is posted at most once (until reversed).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockbook_catalog::ProductId;
use stockbook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult};
use stockbook_events::Event;

use crate::{MovementId, WarehouseId};

stockbook_core::typed_id!(
    /// Identifier of the stock ledger stream.
    StockLedgerId
);

stockbook_core::typed_id!(
    /// Identifier of one manual stock adjustment.
    AdjustmentId
);

impl StockLedgerId {
    /// The single ledger of the back office.
    pub fn main() -> Self {
        Self(AggregateId::from_uuid(Uuid::nil()))
    }
}

/// Balance key: (product, warehouse).
pub type StockKey = (ProductId, WarehouseId);

/// A signed delta requested by a movement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub delta: i64,
}

/// A booked delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub line_no: u32,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub delta: i64,
}

impl LedgerEntry {
    pub fn key(&self) -> StockKey {
        (self.product_id, self.warehouse_id)
    }
}

/// Aggregate root: StockLedger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLedger {
    id: StockLedgerId,
    balances: BTreeMap<StockKey, i64>,
    posted: BTreeMap<MovementId, Vec<LedgerEntry>>,
    adjustments: BTreeSet<AdjustmentId>,
    version: u64,
}

impl StockLedger {
    pub fn empty(id: StockLedgerId) -> Self {
        Self {
            id,
            balances: BTreeMap::new(),
            posted: BTreeMap::new(),
            adjustments: BTreeSet::new(),
            version: 0,
        }
    }

    /// Current level for (product, warehouse); zero when never touched.
    pub fn balance(&self, product_id: ProductId, warehouse_id: WarehouseId) -> i64 {
        self.balances
            .get(&(product_id, warehouse_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn balances(&self) -> &BTreeMap<StockKey, i64> {
        &self.balances
    }

    pub fn is_posted(&self, movement_id: MovementId) -> bool {
        self.posted.contains_key(&movement_id)
    }

    /// Check that applying `entries` keeps every touched balance non-negative.
    ///
    /// Deltas on the same key are summed first, so two lines of the same
    /// product are checked as one quantity.
    fn check_entries(&self, entries: &[LedgerEntry]) -> DomainResult<()> {
        let mut net: BTreeMap<StockKey, i64> = BTreeMap::new();
        for entry in entries {
            let slot = net.entry(entry.key()).or_insert(0);
            *slot = slot
                .checked_add(entry.delta)
                .ok_or_else(|| DomainError::invariant("stock quantity overflow"))?;
        }

        for ((product_id, warehouse_id), delta) in net {
            let current = self.balance(product_id, warehouse_id);
            let next = current
                .checked_add(delta)
                .ok_or_else(|| DomainError::invariant("stock quantity overflow"))?;
            if next < 0 {
                return Err(DomainError::invariant(format!(
                    "insufficient stock for product {product_id} in warehouse {warehouse_id}: \
                     available {current}, requested {}",
                    -delta
                )));
            }
        }
        Ok(())
    }

    fn apply_entries(&mut self, entries: &[LedgerEntry], sign: i64) {
        for entry in entries {
            let slot = self.balances.entry(entry.key()).or_insert(0);
            *slot = slot.saturating_add(entry.delta.saturating_mul(sign));
        }
    }
}

impl AggregateRoot for StockLedger {
    type Id = StockLedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PostMovement (book the stock effects of a completed movement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMovement {
    pub movement_id: MovementId,
    pub reference: String,
    pub lines: Vec<PostingLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReverseMovement (compensate a posting whose movement could not be completed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseMovement {
    pub movement_id: MovementId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetStockLevel (manual count for one product in one warehouse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStockLevel {
    pub adjustment_id: AdjustmentId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub counted: i64,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    PostMovement(PostMovement),
    ReverseMovement(ReverseMovement),
    SetStockLevel(SetStockLevel),
}

/// Event: StockPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPosted {
    pub movement_id: MovementId,
    pub reference: String,
    pub entries: Vec<LedgerEntry>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReversed. Entries carry the original deltas; the effect is their negation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReversed {
    pub movement_id: MovementId,
    pub entries: Vec<LedgerEntry>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub adjustment_id: AdjustmentId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub delta: i64,
    pub new_level: i64,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    StockPosted(StockPosted),
    StockReversed(StockReversed),
    StockAdjusted(StockAdjusted),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::StockPosted(_) => "inventory.ledger.stock_posted",
            LedgerEvent::StockReversed(_) => "inventory.ledger.stock_reversed",
            LedgerEvent::StockAdjusted(_) => "inventory.ledger.stock_adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::StockPosted(e) => e.occurred_at,
            LedgerEvent::StockReversed(e) => e.occurred_at,
            LedgerEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockLedger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::StockPosted(e) => {
                self.apply_entries(&e.entries, 1);
                self.posted.insert(e.movement_id, e.entries.clone());
            }
            LedgerEvent::StockReversed(e) => {
                self.apply_entries(&e.entries, -1);
                self.posted.remove(&e.movement_id);
            }
            LedgerEvent::StockAdjusted(e) => {
                let slot = self
                    .balances
                    .entry((e.product_id, e.warehouse_id))
                    .or_insert(0);
                *slot = e.new_level;
                self.adjustments.insert(e.adjustment_id);
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::PostMovement(cmd) => self.handle_post(cmd),
            LedgerCommand::ReverseMovement(cmd) => self.handle_reverse(cmd),
            LedgerCommand::SetStockLevel(cmd) => self.handle_set_level(cmd),
        }
    }
}

impl StockLedger {
    fn handle_post(&self, cmd: &PostMovement) -> Result<Vec<LedgerEvent>, DomainError> {
        if self.is_posted(cmd.movement_id) {
            return Err(DomainError::conflict(format!(
                "movement {} is already posted",
                cmd.movement_id
            )));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::invariant("a posting needs at least one line"));
        }
        if cmd.lines.iter().any(|l| l.delta == 0) {
            return Err(DomainError::invariant("posting lines must have a non-zero quantity"));
        }

        let entries: Vec<LedgerEntry> = cmd
            .lines
            .iter()
            .map(|l| LedgerEntry {
                line_no: l.line_no,
                product_id: l.product_id,
                warehouse_id: l.warehouse_id,
                delta: l.delta,
            })
            .collect();
        self.check_entries(&entries)?;

        Ok(vec![LedgerEvent::StockPosted(StockPosted {
            movement_id: cmd.movement_id,
            reference: cmd.reference.clone(),
            entries,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseMovement) -> Result<Vec<LedgerEvent>, DomainError> {
        let entries = self
            .posted
            .get(&cmd.movement_id)
            .ok_or_else(|| DomainError::conflict(format!("movement {} is not posted", cmd.movement_id)))?;

        let negated: Vec<LedgerEntry> = entries
            .iter()
            .map(|e| LedgerEntry { delta: -e.delta, ..*e })
            .collect();
        self.check_entries(&negated)?;

        Ok(vec![LedgerEvent::StockReversed(StockReversed {
            movement_id: cmd.movement_id,
            entries: entries.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_level(&self, cmd: &SetStockLevel) -> Result<Vec<LedgerEvent>, DomainError> {
        if self.adjustments.contains(&cmd.adjustment_id) {
            return Err(DomainError::conflict("adjustment already recorded"));
        }
        if cmd.counted < 0 {
            return Err(DomainError::field("quantity", "must be greater than or equal to 0"));
        }

        let current = self.balance(cmd.product_id, cmd.warehouse_id);
        let delta = cmd
            .counted
            .checked_sub(current)
            .ok_or_else(|| DomainError::invariant("stock quantity overflow"))?;
        if delta == 0 {
            return Ok(Vec::new());
        }

        Ok(vec![LedgerEvent::StockAdjusted(StockAdjusted {
            adjustment_id: cmd.adjustment_id,
            product_id: cmd.product_id,
            warehouse_id: cmd.warehouse_id,
            delta,
            new_level: cmd.counted,
            reason: cmd
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }
}

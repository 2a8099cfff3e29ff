//! Inventory domain module (event-sourced).
//!
//! Warehouses, stock movements and the stock ledger, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).
//!
//! Stock is never stored as a mutable quantity: the [`StockLedger`] keeps an
//! append-only list of signed deltas and the current level is their sum.

pub mod ledger;
pub mod movement;
pub mod units;
pub mod warehouse;

pub use ledger::{
    AdjustmentId, LedgerCommand, LedgerEntry, LedgerEvent, PostMovement, PostingLine,
    ReverseMovement, SetStockLevel, StockAdjusted, StockKey, StockLedger, StockLedgerId,
    StockPosted, StockReversed,
};
pub use movement::{
    AddItems, CancelMovement, CompleteMovement, CreateMovement, DeleteMovement, ItemRemoved,
    ItemsAdded, MovementCancelled, MovementCommand, MovementCompleted, MovementCreated,
    MovementDeleted, MovementEvent, MovementId, MovementItem, MovementStatus, MovementType,
    MovementUpdated, NewItem, RemoveItem, StockMovement, UpdateMovement,
};
pub use units::{to_base_quantity, UnitConversion, BASE_UNIT};
pub use warehouse::{
    CreateWarehouse, DeleteWarehouse, UpdateWarehouse, Warehouse, WarehouseCommand,
    WarehouseCreated, WarehouseDeleted, WarehouseEvent, WarehouseId, WarehouseUpdated,
};

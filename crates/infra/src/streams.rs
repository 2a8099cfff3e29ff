//! Aggregate type names used as stream labels in the event store.

pub const CATEGORY: &str = "catalog.category";
pub const PACKAGING_TYPE: &str = "catalog.packaging_type";
pub const PRODUCT: &str = "catalog.product";
pub const PARTY: &str = "parties.party";
pub const WAREHOUSE: &str = "inventory.warehouse";
pub const MOVEMENT: &str = "inventory.movement";
pub const STOCK_LEDGER: &str = "inventory.ledger";
pub const USER: &str = "auth.user";

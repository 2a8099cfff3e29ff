use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_catalog::{CategoryId, PackagingTypeId, ProductDetails, ProductId};
use stockbook_infra::projections::{
    CategoryReadModel, MovementReadModel, PackagingTypeReadModel, PartyReadModel, ProductReadModel,
    StockLevel, WarehouseReadModel,
};
use stockbook_inventory::{MovementStatus, MovementType, WarehouseId, BASE_UNIT};
use stockbook_parties::{ContactInfo, PartyId};

// -------------------------
// Request DTOs
// -------------------------

fn default_true() -> bool {
    true
}

fn default_unit() -> String {
    BASE_UNIT.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackagingTypeRequest {
    pub name: String,
    pub code: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRequest {
    pub reference: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub packaging_type_id: Option<PackagingTypeId>,
    #[serde(default)]
    pub purchase_price: u64,
    #[serde(default)]
    pub low_stock_threshold: Decimal,
    #[serde(default)]
    pub units_per_package: Option<Decimal>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl ProductRequest {
    pub fn details(&self) -> ProductDetails {
        ProductDetails {
            reference: self.reference.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            category_id: self.category_id,
            packaging_type_id: self.packaging_type_id,
            purchase_price: self.purchase_price,
            low_stock_threshold: self.low_stock_threshold,
            units_per_package: self.units_per_package,
            image_url: self.image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Customer or supplier form.
#[derive(Debug, Clone, Deserialize)]
pub struct PartyRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
}

impl PartyRequest {
    pub fn contact(&self) -> ContactInfo {
        ContactInfo {
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemRequest {
    pub product_id: ProductId,
    /// Quantity as typed, in `unit`.
    pub quantity: Decimal,
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Minor currency units; the invoice falls back to the purchase price.
    #[serde(default)]
    pub unit_price: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovementRequest {
    /// Ignored by the typed `/operation/incoming|outgoing|transfer` routes.
    #[serde(default, rename = "type")]
    pub movement_type: Option<MovementType>,
    /// Generated (`IN-20240101-0001`) when omitted.
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub from_warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub to_warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub supplier_id: Option<PartyId>,
    #[serde(default)]
    pub customer_id: Option<PartyId>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub moved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<ItemRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMovementRequest {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub moved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddItemsRequest {
    pub items: Vec<ItemRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetLevelRequest {
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

// -------------------------
// Query strings
// -------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementsQuery {
    #[serde(default, rename = "type")]
    pub movement_type: Option<MovementType>,
    #[serde(default)]
    pub status: Option<MovementStatus>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StocksQuery {
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub low: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// -------------------------
// Response views
// -------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: CategoryReadModel,
    pub products_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackagingTypeView {
    #[serde(flatten)]
    pub packaging_type: PackagingTypeReadModel,
    pub products_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: ProductReadModel,
    pub category_name: Option<String>,
    pub packaging_code: Option<String>,
    pub packaging_name: Option<String>,
    /// Stock across all warehouses, in base units.
    pub stock_total: i64,
    pub low_stock: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockLevelView {
    #[serde(flatten)]
    pub level: StockLevel,
    pub product_reference: String,
    pub product_name: String,
    pub warehouse_name: String,
    pub low_stock_threshold: Decimal,
    pub low: bool,
}

/// Product identity shown next to a movement line.
#[derive(Debug, Clone, Serialize)]
pub struct LineProduct {
    pub line_no: u32,
    pub reference: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementView {
    #[serde(flatten)]
    pub movement: MovementReadModel,
    pub from_warehouse_name: Option<String>,
    pub to_warehouse_name: Option<String>,
    pub party_name: Option<String>,
    pub line_products: Vec<LineProduct>,
    /// Σ quantity × unit price over priced lines (minor units).
    pub priced_total: u64,
}

/// Option lists for movement forms.
#[derive(Debug, Clone, Serialize)]
pub struct MovementFormProps {
    pub movement_type: MovementType,
    pub suggested_reference: String,
    pub warehouses: Vec<WarehouseReadModel>,
    pub parties: Vec<PartyReadModel>,
}

/// Is `quantity` at or below a positive `threshold`?
pub fn is_low(quantity: i64, threshold: Decimal) -> bool {
    threshold > Decimal::ZERO && Decimal::from(quantity) <= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_stock_needs_a_positive_threshold() {
        assert!(is_low(2, Decimal::new(25, 1)));
        assert!(is_low(0, Decimal::ONE));
        assert!(!is_low(3, Decimal::new(25, 1)));
        assert!(!is_low(0, Decimal::ZERO));
    }

    #[test]
    fn item_unit_defaults_to_base_unit_and_accepts_numeric_quantities() {
        let item: ItemRequest = serde_json::from_value(serde_json::json!({
            "product_id": ProductId::generate(),
            "quantity": 2.5,
        }))
        .unwrap();
        assert_eq!(item.unit, BASE_UNIT);
        assert_eq!(item.quantity, Decimal::new(25, 1));
    }
}

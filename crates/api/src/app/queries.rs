//! Read side: read models joined into the views handlers return.

use std::collections::HashMap;

use stockbook_catalog::ProductId;
use stockbook_infra::projections::{
    MovementFilter, MovementReadModel, PartyReadModel, ProductReadModel, StockLevel, WarehouseReadModel,
};
use stockbook_inventory::{MovementType, WarehouseId};
use stockbook_parties::PartyKind;

use crate::app::dto::{
    is_low, CategoryView, LineProduct, MovementFormProps, MovementView, PackagingTypeView, ProductView,
    StockLevelView, StocksQuery,
};
use crate::app::services::AppServices;

/// Default page of `/product-search`.
pub const SEARCH_LIMIT: usize = 20;

impl AppServices {
    pub fn category_views(&self) -> Vec<CategoryView> {
        let counts = self.projections.products.count_by_category();
        self.projections
            .categories
            .list()
            .into_iter()
            .map(|category| CategoryView {
                products_count: counts.get(&category.category_id).copied().unwrap_or(0),
                category,
            })
            .collect()
    }

    pub fn packaging_type_views(&self) -> Vec<PackagingTypeView> {
        let counts = self.projections.products.count_by_packaging_type();
        self.projections
            .packaging_types
            .list()
            .into_iter()
            .map(|packaging_type| PackagingTypeView {
                products_count: counts.get(&packaging_type.packaging_type_id).copied().unwrap_or(0),
                packaging_type,
            })
            .collect()
    }

    pub fn product_view(&self, product: ProductReadModel) -> ProductView {
        let category_name = product
            .category_id
            .and_then(|id| self.projections.categories.get(&id))
            .map(|c| c.name);
        let packaging = product
            .packaging_type_id
            .and_then(|id| self.projections.packaging_types.get(&id));
        let stock_total = self.projections.stock.total_for_product(product.product_id);

        ProductView {
            category_name,
            packaging_code: packaging.as_ref().map(|p| p.code.clone()),
            packaging_name: packaging.map(|p| p.name),
            stock_total,
            low_stock: is_low(stock_total, product.low_stock_threshold),
            product,
        }
    }

    pub fn product_views(&self) -> Vec<ProductView> {
        self.projections
            .products
            .list()
            .into_iter()
            .map(|p| self.product_view(p))
            .collect()
    }

    /// Active products matching `q`, with stock in `warehouse_id` when given.
    pub fn search_products(&self, q: &str, warehouse_id: Option<WarehouseId>, limit: usize) -> Vec<ProductView> {
        self.projections
            .products
            .search(q, limit)
            .into_iter()
            .map(|p| {
                let mut view = self.product_view(p);
                if let Some(warehouse_id) = warehouse_id {
                    view.stock_total = self.projections.stock.quantity(view.product.product_id, warehouse_id);
                    view.low_stock = is_low(view.stock_total, view.product.low_stock_threshold);
                }
                view
            })
            .collect()
    }

    pub fn stock_views(&self, query: &StocksQuery) -> Vec<StockLevelView> {
        let products: HashMap<ProductId, ProductReadModel> = self
            .projections
            .products
            .list()
            .into_iter()
            .map(|p| (p.product_id, p))
            .collect();
        let warehouses: HashMap<WarehouseId, WarehouseReadModel> = self
            .projections
            .warehouses
            .list()
            .into_iter()
            .map(|w| (w.warehouse_id, w))
            .collect();

        self.projections
            .stock
            .list()
            .into_iter()
            .filter(|l| query.warehouse_id.is_none_or(|w| w == l.warehouse_id))
            .filter(|l| query.product_id.is_none_or(|p| p == l.product_id))
            .map(|level| {
                let product = products.get(&level.product_id);
                let warehouse = warehouses.get(&level.warehouse_id);
                stock_view(level, product, warehouse)
            })
            .filter(|v| !query.low || v.low)
            .collect()
    }

    pub fn stock_view(&self, level: StockLevel) -> StockLevelView {
        let product = self.projections.products.get(&level.product_id);
        let warehouse = self.projections.warehouses.get(&level.warehouse_id);
        stock_view(level, product.as_ref(), warehouse.as_ref())
    }

    pub fn movement_view(&self, movement: MovementReadModel) -> MovementView {
        let warehouse_name = |id: Option<WarehouseId>| {
            id.and_then(|id| self.projections.warehouses.get(&id)).map(|w| w.name)
        };
        let line_products = movement
            .items
            .iter()
            .map(|item| {
                let product = self.projections.products.get(&item.product_id);
                LineProduct {
                    line_no: item.line_no,
                    reference: product.as_ref().map(|p| p.reference.clone()).unwrap_or_default(),
                    name: product.map(|p| p.name).unwrap_or_default(),
                }
            })
            .collect();

        MovementView {
            from_warehouse_name: warehouse_name(movement.from_warehouse_id),
            to_warehouse_name: warehouse_name(movement.to_warehouse_id),
            party_name: movement
                .party_id()
                .and_then(|id| self.projections.parties.get(&id))
                .map(|p| p.name),
            line_products,
            priced_total: movement.priced_total(),
            movement,
        }
    }

    pub fn movement_views(&self, filter: MovementFilter) -> Vec<MovementView> {
        self.projections
            .movements
            .list(filter)
            .into_iter()
            .map(|m| self.movement_view(m))
            .collect()
    }

    /// Options for a movement form of the given type.
    pub fn movement_form(&self, movement_type: MovementType) -> MovementFormProps {
        let parties: Vec<PartyReadModel> = match movement_type {
            MovementType::In => self.projections.parties.list(PartyKind::Supplier),
            MovementType::Out => self.projections.parties.list(PartyKind::Customer),
            MovementType::Transfer => Vec::new(),
        };
        MovementFormProps {
            movement_type,
            suggested_reference: self
                .projections
                .movements
                .next_reference(movement_type, chrono::Utc::now().date_naive())
                .unwrap_or_default(),
            warehouses: self
                .projections
                .warehouses
                .list()
                .into_iter()
                .filter(|w| w.active)
                .collect(),
            parties,
        }
    }
}

fn stock_view(
    level: StockLevel,
    product: Option<&ProductReadModel>,
    warehouse: Option<&WarehouseReadModel>,
) -> StockLevelView {
    let threshold = product.map(|p| p.low_stock_threshold).unwrap_or_default();
    StockLevelView {
        product_reference: product.map(|p| p.reference.clone()).unwrap_or_default(),
        product_name: product.map(|p| p.name.clone()).unwrap_or_default(),
        warehouse_name: warehouse.map(|w| w.name.clone()).unwrap_or_default(),
        low_stock_threshold: threshold,
        low: is_low(level.quantity, threshold),
        level,
    }
}

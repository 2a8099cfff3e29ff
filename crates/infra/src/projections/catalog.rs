//! Catalog read models: categories, packaging types and products.
//!
//! `products_count` on categories and packaging types is derived from the
//! product read model at query time, so it can never drift from it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockbook_catalog::{
    CategoryEvent, CategoryId, PackagingTypeEvent, PackagingTypeId, ProductEvent, ProductId,
};
use stockbook_events::EventEnvelope;

use crate::projections::cursor_store::{decode, ensure_stream, ProjectionError, StreamCursors};
use crate::projections::Projection;
use crate::read_model::{InMemoryReadStore, ReadStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReadModel {
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackagingTypeReadModel {
    pub packaging_type_id: PackagingTypeId,
    pub name: String,
    pub code: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub reference: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub packaging_type_id: Option<PackagingTypeId>,
    pub purchase_price: u64,
    pub low_stock_threshold: Decimal,
    pub units_per_package: Option<Decimal>,
    pub image_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Categories
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CategoriesProjection<S = InMemoryReadStore<CategoryId, CategoryReadModel>> {
    store: S,
    cursors: StreamCursors,
}

impl<S> CategoriesProjection<S>
where
    S: ReadStore<CategoryId, CategoryReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new("catalog.categories"),
        }
    }

    pub fn get(&self, id: &CategoryId) -> Option<CategoryReadModel> {
        self.store.get(id)
    }

    /// All categories, by name.
    pub fn list(&self) -> Vec<CategoryReadModel> {
        let mut all = self.store.list();
        all.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        all
    }

    /// Case-insensitive name lookup.
    pub fn find_by_name(&self, name: &str) -> Option<CategoryReadModel> {
        let wanted = name.trim().to_lowercase();
        self.store.list().into_iter().find(|c| c.name.to_lowercase() == wanted)
    }
}

impl<S> Projection for CategoriesProjection<S>
where
    S: ReadStore<CategoryId, CategoryReadModel>,
{
    fn name(&self) -> &'static str {
        self.cursors.projection_name()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::CATEGORY || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        match decode::<CategoryEvent>(envelope)? {
            CategoryEvent::Created(e) => {
                ensure_stream(envelope, e.category_id.aggregate_id())?;
                self.store.upsert(
                    e.category_id,
                    CategoryReadModel {
                        category_id: e.category_id,
                        name: e.name,
                        description: e.description,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            CategoryEvent::Updated(e) => {
                ensure_stream(envelope, e.category_id.aggregate_id())?;
                if let Some(mut rm) = self.store.get(&e.category_id) {
                    rm.name = e.name;
                    rm.description = e.description;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.category_id, rm);
                }
            }
            CategoryEvent::Deleted(e) => {
                ensure_stream(envelope, e.category_id.aggregate_id())?;
                self.store.remove(&e.category_id);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn clear(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Packaging types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PackagingTypesProjection<S = InMemoryReadStore<PackagingTypeId, PackagingTypeReadModel>> {
    store: S,
    cursors: StreamCursors,
}

impl<S> PackagingTypesProjection<S>
where
    S: ReadStore<PackagingTypeId, PackagingTypeReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new("catalog.packaging_types"),
        }
    }

    pub fn get(&self, id: &PackagingTypeId) -> Option<PackagingTypeReadModel> {
        self.store.get(id)
    }

    pub fn list(&self) -> Vec<PackagingTypeReadModel> {
        let mut all = self.store.list();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }

    /// Lookup by normalized code.
    pub fn find_by_code(&self, code: &str) -> Option<PackagingTypeReadModel> {
        self.store.list().into_iter().find(|p| p.code == code)
    }
}

impl<S> Projection for PackagingTypesProjection<S>
where
    S: ReadStore<PackagingTypeId, PackagingTypeReadModel>,
{
    fn name(&self) -> &'static str {
        self.cursors.projection_name()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::PACKAGING_TYPE || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        match decode::<PackagingTypeEvent>(envelope)? {
            PackagingTypeEvent::Created(e) => {
                ensure_stream(envelope, e.packaging_type_id.aggregate_id())?;
                self.store.upsert(
                    e.packaging_type_id,
                    PackagingTypeReadModel {
                        packaging_type_id: e.packaging_type_id,
                        name: e.name,
                        code: e.code,
                        active: e.active,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            PackagingTypeEvent::Updated(e) => {
                ensure_stream(envelope, e.packaging_type_id.aggregate_id())?;
                if let Some(mut rm) = self.store.get(&e.packaging_type_id) {
                    rm.name = e.name;
                    rm.code = e.code;
                    rm.active = e.active;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.packaging_type_id, rm);
                }
            }
            PackagingTypeEvent::Deleted(e) => {
                ensure_stream(envelope, e.packaging_type_id.aggregate_id())?;
                self.store.remove(&e.packaging_type_id);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn clear(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Products
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ProductsProjection<S = InMemoryReadStore<ProductId, ProductReadModel>> {
    store: S,
    cursors: StreamCursors,
}

impl<S> ProductsProjection<S>
where
    S: ReadStore<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new("catalog.products"),
        }
    }

    pub fn get(&self, id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(id)
    }

    /// All products, by reference.
    pub fn list(&self) -> Vec<ProductReadModel> {
        let mut all = self.store.list();
        all.sort_by(|a, b| a.reference.cmp(&b.reference));
        all
    }

    /// Case-insensitive reference lookup.
    pub fn find_by_reference(&self, reference: &str) -> Option<ProductReadModel> {
        let wanted = reference.trim().to_lowercase();
        self.store
            .list()
            .into_iter()
            .find(|p| p.reference.to_lowercase() == wanted)
    }

    /// Active products whose reference or name contains `query`.
    pub fn search(&self, query: &str, limit: usize) -> Vec<ProductReadModel> {
        let needle = query.trim().to_lowercase();
        self.list()
            .into_iter()
            .filter(|p| p.active)
            .filter(|p| {
                needle.is_empty()
                    || p.reference.to_lowercase().contains(&needle)
                    || p.name.to_lowercase().contains(&needle)
            })
            .take(limit)
            .collect()
    }

    pub fn count_by_category(&self) -> HashMap<CategoryId, u64> {
        let mut counts = HashMap::new();
        for p in self.store.list() {
            if let Some(id) = p.category_id {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn count_by_packaging_type(&self) -> HashMap<PackagingTypeId, u64> {
        let mut counts = HashMap::new();
        for p in self.store.list() {
            if let Some(id) = p.packaging_type_id {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        counts
    }
}

impl<S> Projection for ProductsProjection<S>
where
    S: ReadStore<ProductId, ProductReadModel>,
{
    fn name(&self) -> &'static str {
        self.cursors.projection_name()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::PRODUCT || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        match decode::<ProductEvent>(envelope)? {
            ProductEvent::ProductCreated(e) => {
                ensure_stream(envelope, e.product_id.aggregate_id())?;
                let d = e.details;
                self.store.upsert(
                    e.product_id,
                    ProductReadModel {
                        product_id: e.product_id,
                        reference: d.reference,
                        name: d.name,
                        description: d.description,
                        category_id: d.category_id,
                        packaging_type_id: d.packaging_type_id,
                        purchase_price: d.purchase_price,
                        low_stock_threshold: d.low_stock_threshold,
                        units_per_package: d.units_per_package,
                        image_url: d.image_url,
                        active: e.active,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            ProductEvent::ProductUpdated(e) => {
                ensure_stream(envelope, e.product_id.aggregate_id())?;
                if let Some(mut rm) = self.store.get(&e.product_id) {
                    let d = e.details;
                    rm.reference = d.reference;
                    rm.name = d.name;
                    rm.description = d.description;
                    rm.category_id = d.category_id;
                    rm.packaging_type_id = d.packaging_type_id;
                    rm.purchase_price = d.purchase_price;
                    rm.low_stock_threshold = d.low_stock_threshold;
                    rm.units_per_package = d.units_per_package;
                    rm.image_url = d.image_url;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.product_id, rm);
                }
            }
            ProductEvent::ProductActivated(e) => {
                ensure_stream(envelope, e.product_id.aggregate_id())?;
                self.set_active(e.product_id, true, e.occurred_at);
            }
            ProductEvent::ProductDeactivated(e) => {
                ensure_stream(envelope, e.product_id.aggregate_id())?;
                self.set_active(e.product_id, false, e.occurred_at);
            }
            ProductEvent::ProductDeleted(e) => {
                ensure_stream(envelope, e.product_id.aggregate_id())?;
                self.store.remove(&e.product_id);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn clear(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}

impl<S> ProductsProjection<S>
where
    S: ReadStore<ProductId, ProductReadModel>,
{
    fn set_active(&self, id: ProductId, active: bool, at: DateTime<Utc>) {
        if let Some(mut rm) = self.store.get(&id) {
            rm.active = active;
            rm.updated_at = at;
            self.store.upsert(id, rm);
        }
    }
}

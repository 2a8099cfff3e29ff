//! Reference and demo data for an empty store.
//!
//! Everything goes through [`AppServices`], so seeded data obeys the same
//! uniqueness and reference rules as API input.

use rust_decimal::Decimal;
use tracing::info;

use stockbook_auth::{Role, UserId};
use stockbook_parties::PartyKind;

use crate::app::dto::{CategoryRequest, PackagingTypeRequest, PartyRequest, ProductRequest, WarehouseRequest};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// What [`run`] created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub admin: Option<UserId>,
    pub products: usize,
}

/// Seed when nothing has been recorded yet; a non-empty store is left alone.
pub fn run(services: &AppServices) -> Result<SeedReport, ApiError> {
    if !services.is_empty()? {
        info!("store already holds data; skipping seed");
        return Ok(SeedReport { admin: None, products: 0 });
    }

    let admin = services.register_user("admin@stockbook.local", "Administrator", Role::admin())?;
    services.register_user("clerk@stockbook.local", "Stock clerk", Role::new(Role::CLERK))?;

    let mut categories = Vec::new();
    for (name, description) in [
        ("Beverages", "Water, juices and soft drinks"),
        ("Groceries", "Dry goods"),
        ("Cleaning", "Household cleaning products"),
    ] {
        categories.push(services.create_category(&CategoryRequest {
            name: name.to_string(),
            description: Some(description.to_string()),
        })?);
    }

    for (name, code, address) in [
        ("Main depot", "MAIN", "Zone industrielle, lot 12"),
        ("City shop", "SHOP", "Avenue Hassan II, 40"),
    ] {
        services.create_warehouse(&WarehouseRequest {
            name: name.to_string(),
            code: code.to_string(),
            address: Some(address.to_string()),
            active: true,
        })?;
    }

    let mut packaging = Vec::new();
    for (name, code) in [("Carton", "CTN"), ("Pack", "PCK"), ("Pallet", "PAL")] {
        packaging.push(services.create_packaging_type(&PackagingTypeRequest {
            name: name.to_string(),
            code: code.to_string(),
            active: true,
        })?);
    }

    let products = [
        ("BEV-001", "Mineral water 1.5L", 0, 0, 350, 6, 24),
        ("BEV-002", "Orange juice 1L", 0, 0, 1200, 12, 10),
        ("GRO-001", "Couscous 1kg", 1, 1, 1500, 10, 5),
        ("CLN-001", "Floor cleaner 2L", 2, 0, 2800, 4, 3),
    ];
    for (reference, name, category, pack, price, per_package, threshold) in products {
        services.create_product(&ProductRequest {
            reference: reference.to_string(),
            name: name.to_string(),
            description: None,
            category_id: categories.get(category).copied(),
            packaging_type_id: packaging.get(pack).copied(),
            purchase_price: price,
            low_stock_threshold: Decimal::from(threshold),
            units_per_package: Some(Decimal::from(per_package)),
            image_url: None,
            active: true,
        })?;
    }

    let parties = [
        (PartyKind::Customer, "Café Atlas", "contact@cafe-atlas.ma"),
        (PartyKind::Customer, "Hotel Riad Nour", "achats@riadnour.ma"),
        (PartyKind::Supplier, "Sidi Ali Distribution", "ventes@sidiali-distribution.ma"),
        (PartyKind::Supplier, "Dari Foods", "orders@dari-foods.ma"),
    ];
    for (kind, name, email) in parties {
        services.create_party(
            kind,
            &PartyRequest {
                name: name.to_string(),
                email: Some(email.to_string()),
                phone: None,
                address: None,
                tax_id: None,
            },
        )?;
    }

    info!(admin_id = %admin, products = products.len(), "seed data created");
    Ok(SeedReport {
        admin: Some(admin),
        products: products.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stockbook_infra::event_store::InMemoryEventStore;
    use stockbook_invoicing::Company;

    use super::*;

    fn services() -> AppServices {
        let company = Company {
            name: "Test".to_string(),
            address: None,
            currency: "MAD".to_string(),
        };
        AppServices::with_store(Arc::new(InMemoryEventStore::new()), company).unwrap()
    }

    #[test]
    fn seeds_an_empty_store_once() {
        let services = services();
        let report = run(&services).unwrap();
        assert!(report.admin.is_some());
        assert_eq!(report.products, 4);

        let projections = services.projections();
        assert_eq!(projections.products.list().len(), 4);
        assert_eq!(projections.warehouses.list().len(), 2);
        assert_eq!(projections.parties.list(PartyKind::Supplier).len(), 2);
        assert!(projections.users.find_by_email("admin@stockbook.local").is_some());

        let again = run(&services).unwrap();
        assert_eq!(again, SeedReport { admin: None, products: 0 });
        assert_eq!(projections.products.list().len(), 4);
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{require_text, Aggregate, AggregateRoot, DomainError, DomainResult};
use stockbook_events::Event;

use crate::category::clean_optional;
use crate::{CategoryId, PackagingTypeId};

stockbook_core::typed_id!(
    /// Product identifier.
    ProductId
);

/// Editable product attributes, shared by create/update commands and events.
///
/// `packaging_type_id` is optional here only so a missing value can be
/// reported as a field error; events always carry one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub reference: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub packaging_type_id: Option<PackagingTypeId>,
    /// Minor currency units.
    pub purchase_price: u64,
    pub low_stock_threshold: Decimal,
    /// Base units contained in one package, when the product is counted by package.
    pub units_per_package: Option<Decimal>,
    pub image_url: Option<String>,
}

impl ProductDetails {
    fn validated(&self) -> DomainResult<ProductDetails> {
        require_text("reference", &self.reference)?;
        require_text("name", &self.name)?;

        if self.packaging_type_id.is_none() {
            return Err(DomainError::field("packaging_type_id", "is required"));
        }
        if self.low_stock_threshold < Decimal::ZERO {
            return Err(DomainError::field(
                "low_stock_threshold",
                "must be greater than or equal to 0",
            ));
        }
        if let Some(upp) = self.units_per_package {
            if upp <= Decimal::ZERO {
                return Err(DomainError::field(
                    "units_per_package",
                    "must be greater than 0",
                ));
            }
        }

        let image_url = clean_optional(&self.image_url);
        if let Some(url) = &image_url {
            if !(url.starts_with("http://") || url.starts_with("https://") || url.starts_with('/')) {
                return Err(DomainError::field("image_url", "must be an absolute URL or path"));
            }
        }

        Ok(ProductDetails {
            reference: self.reference.trim().to_string(),
            name: self.name.trim().to_string(),
            description: clean_optional(&self.description),
            category_id: self.category_id,
            packaging_type_id: self.packaging_type_id,
            purchase_price: self.purchase_price,
            low_stock_threshold: self.low_stock_threshold.normalize(),
            units_per_package: self.units_per_package.map(|d| d.normalize()),
            image_url,
        })
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    details: Option<ProductDetails>,
    active: bool,
    version: u64,
    deleted: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            details: None,
            active: false,
            version: 0,
            deleted: false,
        }
    }

    pub fn details(&self) -> Option<&ProductDetails> {
        self.details.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    ActivateProduct(ActivateProduct),
    DeactivateProduct(DeactivateProduct),
    DeleteProduct(DeleteProduct),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductActivated {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeactivated {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    ProductActivated(ProductActivated),
    ProductDeactivated(ProductDeactivated),
    ProductDeleted(ProductDeleted),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "catalog.product.created",
            ProductEvent::ProductUpdated(_) => "catalog.product.updated",
            ProductEvent::ProductActivated(_) => "catalog.product.activated",
            ProductEvent::ProductDeactivated(_) => "catalog.product.deactivated",
            ProductEvent::ProductDeleted(_) => "catalog.product.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::ProductActivated(e) => e.occurred_at,
            ProductEvent::ProductDeactivated(e) => e.occurred_at,
            ProductEvent::ProductDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.details = Some(e.details.clone());
                self.active = e.active;
            }
            ProductEvent::ProductUpdated(e) => {
                self.details = Some(e.details.clone());
            }
            ProductEvent::ProductActivated(_) => {
                self.active = true;
            }
            ProductEvent::ProductDeactivated(_) => {
                self.active = false;
            }
            ProductEvent::ProductDeleted(_) => {
                self.deleted = true;
                self.active = false;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::ActivateProduct(cmd) => self.handle_activate(cmd),
            ProductCommand::DeactivateProduct(cmd) => self.handle_deactivate(cmd),
            ProductCommand::DeleteProduct(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Product {
    fn ensure_live(&self) -> Result<(), DomainError> {
        if self.details.is_none() || self.deleted {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.details.is_some() {
            return Err(DomainError::conflict("product already exists"));
        }

        // Reference uniqueness is checked against the catalog read model before dispatch.
        let details = cmd.details.validated()?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            details,
            active: cmd.active,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live()?;
        let details = cmd.details.validated()?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: self.id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live()?;
        if self.active {
            return Err(DomainError::conflict("product is already active"));
        }
        Ok(vec![ProductEvent::ProductActivated(ProductActivated {
            product_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live()?;
        if !self.active {
            return Err(DomainError::conflict("product is already inactive"));
        }
        Ok(vec![ProductEvent::ProductDeactivated(ProductDeactivated {
            product_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live()?;
        Ok(vec![ProductEvent::ProductDeleted(ProductDeleted {
            product_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn test_details() -> ProductDetails {
        ProductDetails {
            reference: "REF-001".to_string(),
            name: "Mineral water 1.5L".to_string(),
            description: None,
            category_id: Some(CategoryId::generate()),
            packaging_type_id: Some(PackagingTypeId::generate()),
            purchase_price: 450,
            low_stock_threshold: Decimal::new(25, 1),
            units_per_package: Some(Decimal::from(6)),
            image_url: None,
        }
    }

    fn created_product() -> Product {
        let id = ProductId::generate();
        let mut product = Product::empty(id);
        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id: id,
                details: test_details(),
                active: true,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        events.iter().for_each(|e| product.apply(e));
        product
    }

    #[test]
    fn create_product_emits_product_created_event() {
        let product = created_product();
        assert!(product.is_active());
        assert_eq!(product.version(), 1);
        assert_eq!(product.details().unwrap().reference, "REF-001");
    }

    #[test]
    fn create_product_requires_packaging_type() {
        let id = ProductId::generate();
        let mut details = test_details();
        details.packaging_type_id = None;

        let err = Product::empty(id)
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id: id,
                details,
                active: true,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::field("packaging_type_id", "is required"));
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let mut details = test_details();
        details.low_stock_threshold = Decimal::new(-1, 0);
        let err = details.validated().unwrap_err();
        assert!(matches!(err, DomainError::InvalidField { ref field, .. } if field == "low_stock_threshold"));
    }

    #[test]
    fn fractional_threshold_is_accepted() {
        let mut details = test_details();
        details.low_stock_threshold = Decimal::new(75, 2);
        assert_eq!(details.validated().unwrap().low_stock_threshold, Decimal::new(75, 2));
    }

    #[test]
    fn zero_units_per_package_is_rejected() {
        let mut details = test_details();
        details.units_per_package = Some(Decimal::ZERO);
        assert!(details.validated().is_err());
    }

    #[test]
    fn deactivate_then_activate() {
        let mut product = created_product();
        let id = *product.id();

        let events = product
            .handle(&ProductCommand::DeactivateProduct(DeactivateProduct {
                product_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        events.iter().for_each(|e| product.apply(e));
        assert!(!product.is_active());

        let again = product.handle(&ProductCommand::DeactivateProduct(DeactivateProduct {
            product_id: id,
            occurred_at: Utc::now(),
        }));
        assert!(matches!(again, Err(DomainError::Conflict(_))));

        let events = product
            .handle(&ProductCommand::ActivateProduct(ActivateProduct {
                product_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        events.iter().for_each(|e| product.apply(e));
        assert!(product.is_active());
        assert_eq!(product.version(), 3);
    }

    #[test]
    fn update_on_missing_product_is_not_found() {
        let id = ProductId::generate();
        let err = Product::empty(id)
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                product_id: id,
                details: test_details(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: Handle is deterministic and never mutates state.
            #[test]
            fn handle_is_deterministic(
                reference in "[A-Z0-9-]{1,20}",
                name in "[A-Za-z][A-Za-z0-9 ]{0,60}",
                price in 0u64..10_000_000u64,
            ) {
                let product = created_product();
                let before = product.clone();

                let mut details = test_details();
                details.reference = reference;
                details.name = name;
                details.purchase_price = price;
                let cmd = ProductCommand::UpdateProduct(UpdateProduct {
                    product_id: *product.id(),
                    details,
                    occurred_at: Utc::now(),
                });

                let first = product.handle(&cmd);
                let second = product.handle(&cmd);

                prop_assert_eq!(&before, &product);
                prop_assert_eq!(first, second);
            }
        }
    }
}

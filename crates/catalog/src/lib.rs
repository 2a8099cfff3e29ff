//! Catalog domain module (event-sourced).
//!
//! Categories, packaging types and products. Pure decision logic: uniqueness
//! of names/codes/references and "still referenced" checks need read models
//! and live in the application services.

pub mod category;
pub mod packaging;
pub mod product;

pub use category::{
    Category, CategoryCommand, CategoryCreated, CategoryDeleted, CategoryEvent, CategoryId,
    CategoryUpdated, CreateCategory, DeleteCategory, UpdateCategory,
};
pub use packaging::{
    CreatePackagingType, DeletePackagingType, PackagingType, PackagingTypeCommand,
    PackagingTypeCreated, PackagingTypeDeleted, PackagingTypeEvent, PackagingTypeId,
    PackagingTypeUpdated, UpdatePackagingType, normalize_code,
};
pub use product::{
    ActivateProduct, CreateProduct, DeactivateProduct, DeleteProduct, Product, ProductActivated,
    ProductCommand, ProductCreated, ProductDeactivated, ProductDeleted, ProductDetails,
    ProductEvent, ProductId, ProductUpdated, UpdateProduct,
};

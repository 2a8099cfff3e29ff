use axum::{routing::get, Router};

use stockbook_parties::PartyKind;

pub mod categories;
pub mod common;
pub mod invoices;
pub mod operations;
pub mod packaging_types;
pub mod parties;
pub mod products;
pub mod stocks;
pub mod system;
pub mod users;
pub mod warehouses;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/users", get(users::index))
        .route("/product-search", get(products::search))
        .nest("/categories", categories::router())
        .nest("/packaging-types", packaging_types::router())
        .nest("/products", products::router())
        .nest("/warehouses", warehouses::router())
        .nest("/customers", parties::router(PartyKind::Customer))
        .nest("/suppliers", parties::router(PartyKind::Supplier))
        .nest("/operations", operations::resource_router())
        .nest("/operation", operations::workflow_router())
        .nest("/stocks", stocks::router())
        .nest("/pdf/operation", invoices::router())
}

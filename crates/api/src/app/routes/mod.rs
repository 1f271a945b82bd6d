use axum::{Router, routing::get};

pub mod common;
pub mod experiments;
pub mod inventory;
pub mod jobs;
pub mod products;
pub mod recommendations;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/alerts", get(system::alerts))
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
        .nest("/recommendations", recommendations::router())
        .nest("/experiments", experiments::router())
        .nest("/jobs", jobs::router())
}

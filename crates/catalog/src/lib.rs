//! Catalog records the pricing core reads: products, daily sales and stock snapshots.
//!
//! These are owned by the marketplace sync collaborator. The core never creates
//! them; it only reads them (and updates `Product::price` after an approved change).

pub mod product;
pub mod range;
pub mod sales;
pub mod stock;

pub use product::{DEFAULT_MIN_MARGIN, Product};
pub use range::DateRange;
pub use sales::{SalesAggregate, SalesTotals};
pub use stock::{InventorySnapshot, current_stock};

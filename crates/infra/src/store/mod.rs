//! Storage ports and their in-memory implementations.
//!
//! The engine only depends on the traits. Each store keeps its consistency
//! guarantees (unique change ids, one open experiment per slot, optimistic
//! versions) inside a single lock acquisition.

use thiserror::Error;

use pricepilot_core::ExperimentId;
use pricepilot_experiments::SlotKey;

pub mod catalog;
pub mod experiments;
pub mod recommendations;

pub use catalog::{CatalogStore, InMemoryCatalogStore};
pub use experiments::{ExperimentStore, InMemoryExperimentStore};
pub use recommendations::{InMemoryRecommendationStore, RecommendationStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("slot {slot} is held by open experiment {holder}")]
    SlotOccupied { slot: SlotKey, holder: ExperimentId },

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        Self::Unavailable("lock poisoned".to_string())
    }
}

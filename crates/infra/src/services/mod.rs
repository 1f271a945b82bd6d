//! Application services: the operations the API and the scheduler call.
//!
//! [`Engine`] owns the ports (stores, marketplace, journal, alerts, clock) and
//! runs the pure analytics and aggregates against them. Operations are split
//! by concern:
//! - [`forecaster`]: stock runway, reorder planning, sales anomalies;
//! - [`pricing`]: analysis, recommendation generation and decisions;
//! - [`experiments`]: start, review, complete, roll back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use pricepilot_analytics::{ForecastPolicy, ScoringPolicy, VerdictPolicy};
use pricepilot_core::DomainError;
use pricepilot_events::Projection;

use crate::alerts::{Alert, AlertSink};
use crate::clock::Clock;
use crate::config::{AppConfig, ExperimentsConfig};
use crate::journal::{Journal, JournalEvent, PriceHistory};
use crate::marketplace::{Marketplace, MarketplaceError};
use crate::store::{CatalogStore, ExperimentStore, RecommendationStore, StoreError};

pub mod experiments;
pub mod forecaster;
pub mod pricing;

pub use experiments::{ActiveExperiment, ExperimentReview, StartRequest};
pub use forecaster::ProductAnomaly;
pub use pricing::{Decision, DecisionOutcome, GenerationReport};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("external apply failed during {operation}: {cause}")]
    ExternalApplyFailure {
        operation: &'static str,
        cause: MarketplaceError,
    },

    #[error("invalid transition for {entity}: cannot {requested} while {current}")]
    InvalidTransition {
        entity: &'static str,
        current: String,
        requested: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("experiment {0} has no baseline")]
    MissingBaseline(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub(crate) fn external(operation: &'static str, cause: MarketplaceError) -> Self {
        Self::ExternalApplyFailure { operation, cause }
    }
}

impl From<DomainError> for EngineError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(m) | DomainError::InvalidId(m) | DomainError::InvariantViolation(m) => {
                Self::Validation(m)
            }
            DomainError::NotFound => Self::NotFound("aggregate".to_string()),
            DomainError::Conflict(m) => Self::Conflict(m),
            DomainError::InvalidTransition {
                entity,
                current,
                requested,
            } => Self::InvalidTransition {
                entity,
                current,
                requested,
            },
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => Self::NotFound(m),
            e @ (StoreError::Duplicate(_) | StoreError::SlotOccupied { .. } | StoreError::Concurrency(_)) => {
                Self::Conflict(e.to_string())
            }
            StoreError::Unavailable(m) => Self::Storage(m),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Tunables the engine reads on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub forecast: ForecastPolicy,
    pub scoring: ScoringPolicy,
    pub verdict: VerdictPolicy,
    pub experiments: ExperimentsConfig,
    pub marketplace_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl EngineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            forecast: cfg.forecast.clone(),
            scoring: cfg.scoring.clone(),
            verdict: cfg.verdict.clone(),
            experiments: cfg.experiments.clone(),
            marketplace_timeout: cfg.marketplace.timeout(),
        }
    }
}

/// The ports an engine runs against.
#[derive(Clone)]
pub struct EngineDeps {
    pub catalog: Arc<dyn CatalogStore>,
    pub recommendations: Arc<dyn RecommendationStore>,
    pub experiments: Arc<dyn ExperimentStore>,
    pub marketplace: Arc<dyn Marketplace>,
    pub journal: Arc<dyn Journal>,
    pub alerts: Arc<dyn AlertSink>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct Engine {
    deps: EngineDeps,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(deps: EngineDeps, settings: EngineSettings) -> Self {
        Self { deps, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.deps.catalog
    }

    pub fn recommendations(&self) -> &Arc<dyn RecommendationStore> {
        &self.deps.recommendations
    }

    pub fn experiments(&self) -> &Arc<dyn ExperimentStore> {
        &self.deps.experiments
    }

    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.deps.journal
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.deps.clock
    }

    pub fn alert(&self, alert: Alert) {
        self.deps.alerts.emit(alert);
    }

    /// Price changes of one product, oldest first, rebuilt from the journal.
    pub fn price_history(
        &self,
        product_id: pricepilot_core::ProductId,
    ) -> EngineResult<Vec<crate::journal::PriceHistoryEntry>> {
        let log = self.deps.journal.all()?;
        let mut history = PriceHistory::new();
        history.replay(&log);
        Ok(history.for_product(product_id).to_vec())
    }

    /// Journal failures are logged, never surfaced: the state change already happened.
    pub(crate) fn record(&self, aggregate_id: Uuid, aggregate_type: &str, events: Vec<JournalEvent>, at: DateTime<Utc>) {
        if events.is_empty() {
            return;
        }
        if let Err(e) = self.deps.journal.append(aggregate_id, aggregate_type, events, at) {
            tracing::error!(%aggregate_id, aggregate_type, error = %e, "failed to journal events");
        }
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    //! Shared in-memory wiring for service tests.

    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone, Utc};

    use pricepilot_catalog::{InventorySnapshot, Product, SalesAggregate};
    use pricepilot_core::{Money, ProductId};

    use super::*;
    use crate::alerts::InMemoryAlertSink;
    use crate::clock::FixedClock;
    use crate::journal::InMemoryJournal;
    use crate::marketplace::InMemoryMarketplace;
    use crate::store::{InMemoryCatalogStore, InMemoryExperimentStore, InMemoryRecommendationStore};

    pub struct Kit {
        pub engine: Engine,
        pub marketplace: Arc<InMemoryMarketplace>,
        pub alerts: Arc<InMemoryAlertSink>,
        pub clock: Arc<FixedClock>,
    }

    /// Engine at 2024-06-15 12:00 UTC (today = 2024-06-15, yesterday = 2024-06-14).
    pub fn kit() -> Kit {
        let marketplace = Arc::new(InMemoryMarketplace::new());
        let alerts = Arc::new(InMemoryAlertSink::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(),
            chrono_tz::UTC,
        ));
        let deps = EngineDeps {
            catalog: Arc::new(InMemoryCatalogStore::new()),
            recommendations: Arc::new(InMemoryRecommendationStore::new()),
            experiments: Arc::new(InMemoryExperimentStore::new()),
            marketplace: marketplace.clone(),
            journal: Arc::new(InMemoryJournal::new()),
            alerts: alerts.clone(),
            clock: clock.clone(),
        };
        Kit {
            engine: Engine::new(deps, EngineSettings::default()),
            marketplace,
            alerts,
            clock,
        }
    }

    pub fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    pub fn product(id: i64, price: i64, cost: i64) -> Product {
        Product::new(ProductId::new(id), format!("SKU-{id}"), format!("Product {id}"), Money::from_major(price), Money::from_major(cost))
            .unwrap()
    }

    impl Kit {
        pub fn add_product(&self, p: Product) {
            self.engine.catalog().upsert_product(p).unwrap();
        }

        pub fn set_stock(&self, id: i64, qty: i64) {
            self.engine
                .catalog()
                .record_stock(InventorySnapshot {
                    product_id: ProductId::new(id),
                    warehouse: "main".to_string(),
                    quantity: qty,
                    reserved: 0,
                    snapshot_date: day(14),
                })
                .unwrap();
        }

        /// Daily sales rows for `days` consecutive days ending on `last`.
        pub fn sell(&self, id: i64, last: NaiveDate, days: u32, per_day: i64) {
            for offset in 0..days {
                let date = last - chrono::Days::new(u64::from(offset));
                let price = self
                    .engine
                    .catalog()
                    .get_product(ProductId::new(id))
                    .unwrap()
                    .map(|p| p.price)
                    .unwrap_or(Money::ZERO);
                self.engine
                    .catalog()
                    .upsert_sales(SalesAggregate {
                        product_id: ProductId::new(id),
                        date,
                        quantity: per_day,
                        revenue: price.saturating_mul(per_day),
                        returns_qty: 0,
                        returns_amount: Money::ZERO,
                    })
                    .unwrap();
            }
        }
    }
}

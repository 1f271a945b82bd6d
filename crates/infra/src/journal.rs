//! Append-only audit journal of every domain event, plus the price history read model.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pricepilot_core::{Money, ProductId};
use pricepilot_events::{Event, EventEnvelope, Projection};
use pricepilot_experiments::ExperimentEvent;
use pricepilot_pricing::RecommendationEvent;

use crate::store::StoreError;

pub const RECOMMENDATION_STREAM: &str = "pricing.recommendation";
pub const EXPERIMENT_STREAM: &str = "experiments.experiment";
pub const PRODUCT_STREAM: &str = "catalog.product";

/// Stream id of a product's price changes.
pub fn product_stream_id(id: ProductId) -> Uuid {
    Uuid::from_u64_pair(0, id.get() as u64)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceChangeSource {
    /// An approved recommendation was applied.
    Recommendation,
    /// A manually started price experiment.
    Experiment,
    /// A failed experiment was reverted.
    Rollback,
}

/// A live price moved on the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChanged {
    pub product_id: ProductId,
    pub old_price: Money,
    pub new_price: Money,
    pub source: PriceChangeSource,
    /// Change id or experiment id that caused it.
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stream", content = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    Recommendation(RecommendationEvent),
    Experiment(ExperimentEvent),
    PriceChanged(PriceChanged),
}

impl Event for JournalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEvent::Recommendation(e) => e.event_type(),
            JournalEvent::Experiment(e) => e.event_type(),
            JournalEvent::PriceChanged(_) => "catalog.price.changed",
        }
    }

    fn version(&self) -> u32 {
        match self {
            JournalEvent::Recommendation(e) => e.version(),
            JournalEvent::Experiment(e) => e.version(),
            JournalEvent::PriceChanged(_) => 1,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEvent::Recommendation(e) => e.occurred_at(),
            JournalEvent::Experiment(e) => e.occurred_at(),
            JournalEvent::PriceChanged(e) => e.occurred_at,
        }
    }
}

pub trait Journal: Send + Sync {
    /// Append events to one stream; sequence numbers continue from the stream's last one.
    fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        events: Vec<JournalEvent>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<EventEnvelope<JournalEvent>>, StoreError>;

    fn load_stream(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<JournalEvent>>, StoreError>;

    /// Every envelope in append order.
    fn all(&self) -> Result<Vec<EventEnvelope<JournalEvent>>, StoreError>;
}

impl<J> Journal for Arc<J>
where
    J: Journal + ?Sized,
{
    fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        events: Vec<JournalEvent>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<EventEnvelope<JournalEvent>>, StoreError> {
        (**self).append(aggregate_id, aggregate_type, events, recorded_at)
    }

    fn load_stream(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<JournalEvent>>, StoreError> {
        (**self).load_stream(aggregate_id)
    }

    fn all(&self) -> Result<Vec<EventEnvelope<JournalEvent>>, StoreError> {
        (**self).all()
    }
}

#[derive(Debug, Default)]
struct JournalState {
    log: Vec<EventEnvelope<JournalEvent>>,
    heads: HashMap<Uuid, u64>,
}

/// In-memory journal for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    inner: RwLock<JournalState>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Journal for InMemoryJournal {
    fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        events: Vec<JournalEvent>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<EventEnvelope<JournalEvent>>, StoreError> {
        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let mut next = state.heads.get(&aggregate_id).copied().unwrap_or(0) + 1;

        let mut committed = Vec::with_capacity(events.len());
        for payload in events {
            let env = EventEnvelope::new(aggregate_id, aggregate_type, next, recorded_at, payload);
            next += 1;
            state.log.push(env.clone());
            committed.push(env);
        }
        state.heads.insert(aggregate_id, next - 1);
        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<JournalEvent>>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state
            .log
            .iter()
            .filter(|e| e.aggregate_id() == aggregate_id)
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<EventEnvelope<JournalEvent>>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state.log.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub old_price: Money,
    pub new_price: Money,
    pub source: PriceChangeSource,
    pub reference: String,
    pub changed_at: DateTime<Utc>,
}

/// Per-product price changes, oldest first. Built by replaying the journal.
#[derive(Debug, Default)]
pub struct PriceHistory {
    entries: BTreeMap<ProductId, Vec<PriceHistoryEntry>>,
    seen: HashMap<Uuid, u64>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_product(&self, id: ProductId) -> &[PriceHistoryEntry] {
        self.entries.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Projection for PriceHistory {
    type Ev = JournalEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        let last = self.seen.get(&envelope.aggregate_id()).copied().unwrap_or(0);
        if envelope.sequence_number() <= last {
            return;
        }
        self.seen.insert(envelope.aggregate_id(), envelope.sequence_number());

        if let JournalEvent::PriceChanged(e) = envelope.payload() {
            self.entries.entry(e.product_id).or_default().push(PriceHistoryEntry {
                old_price: e.old_price,
                new_price: e.new_price,
                source: e.source,
                reference: e.reference.clone(),
                changed_at: e.occurred_at,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(product: i64, old: i64, new: i64, source: PriceChangeSource) -> JournalEvent {
        JournalEvent::PriceChanged(PriceChanged {
            product_id: ProductId::new(product),
            old_price: Money::from_major(old),
            new_price: Money::from_major(new),
            source,
            reference: "PR-1".to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn sequence_numbers_continue_per_stream() {
        let journal = InMemoryJournal::new();
        let a = product_stream_id(ProductId::new(1));
        let b = product_stream_id(ProductId::new(2));
        journal
            .append(a, PRODUCT_STREAM, vec![change(1, 100, 110, PriceChangeSource::Recommendation)], Utc::now())
            .unwrap();
        journal
            .append(b, PRODUCT_STREAM, vec![change(2, 50, 45, PriceChangeSource::Experiment)], Utc::now())
            .unwrap();
        let second = journal
            .append(a, PRODUCT_STREAM, vec![change(1, 110, 100, PriceChangeSource::Rollback)], Utc::now())
            .unwrap();
        assert_eq!(second[0].sequence_number(), 2);
        assert_eq!(journal.load_stream(b).unwrap().len(), 1);
        assert_eq!(journal.all().unwrap().len(), 3);
    }

    #[test]
    fn price_history_replay_is_idempotent() {
        let journal = InMemoryJournal::new();
        let a = product_stream_id(ProductId::new(1));
        journal
            .append(
                a,
                PRODUCT_STREAM,
                vec![
                    change(1, 100, 110, PriceChangeSource::Recommendation),
                    change(1, 110, 100, PriceChangeSource::Rollback),
                ],
                Utc::now(),
            )
            .unwrap();

        let log = journal.all().unwrap();
        let mut history = PriceHistory::new();
        history.replay(&log);
        history.replay(&log);

        let entries = history.for_product(ProductId::new(1));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].source, PriceChangeSource::Rollback);
        assert!(history.for_product(ProductId::new(2)).is_empty());
    }

    #[test]
    fn journal_event_is_tagged_by_stream() {
        let json = serde_json::to_value(change(7, 100, 90, PriceChangeSource::Rollback)).unwrap();
        assert_eq!(json["stream"], "price_changed");
        assert_eq!(json["event"]["source"], "rollback");
        assert_eq!(json["event"]["product_id"], 7);
    }

    #[test]
    fn journal_event_type_delegates() {
        assert_eq!(
            change(1, 1, 2, PriceChangeSource::Experiment).event_type(),
            "catalog.price.changed"
        );
    }
}

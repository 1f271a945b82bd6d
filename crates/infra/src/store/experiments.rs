use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use pricepilot_analytics::ExperimentKind;
use pricepilot_core::{AggregateRoot, ExpectedVersion, ExperimentId, ProductId, RecommendationId};
use pricepilot_experiments::{Experiment, SlotKey};

use super::StoreError;

pub trait ExperimentStore: Send + Sync {
    /// Persist a started experiment if its slot is free or reserved for it (compare-and-create).
    fn insert(&self, exp: Experiment) -> Result<(), StoreError>;

    /// Hold `slot` for the experiment that will be inserted as `holder`.
    /// Fails with `SlotOccupied` when an open experiment or another reservation has it.
    fn reserve(&self, slot: &SlotKey, holder: ExperimentId) -> Result<(), StoreError>;

    /// Drop a reservation that never became an experiment. No-op for anything else.
    fn release(&self, slot: &SlotKey, holder: ExperimentId) -> Result<(), StoreError>;

    /// Replace a stored experiment if its stored version still matches `expected`.
    /// A closed experiment releases its slot.
    fn save(&self, exp: Experiment, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn get(&self, id: ExperimentId) -> Result<Option<Experiment>, StoreError>;

    fn find_by_recommendation(&self, id: RecommendationId) -> Result<Option<Experiment>, StoreError>;

    fn open_in_slot(&self, slot: &SlotKey) -> Result<Option<Experiment>, StoreError>;

    /// Ordered by review date, then start time.
    fn list(&self, kind: Option<ExperimentKind>, open_only: bool) -> Result<Vec<Experiment>, StoreError>;

    /// Any open experiment of any kind touching the product.
    fn has_open_for_product(&self, product_id: ProductId) -> Result<bool, StoreError>;
}

impl<S> ExperimentStore for Arc<S>
where
    S: ExperimentStore + ?Sized,
{
    fn insert(&self, exp: Experiment) -> Result<(), StoreError> {
        (**self).insert(exp)
    }

    fn reserve(&self, slot: &SlotKey, holder: ExperimentId) -> Result<(), StoreError> {
        (**self).reserve(slot, holder)
    }

    fn release(&self, slot: &SlotKey, holder: ExperimentId) -> Result<(), StoreError> {
        (**self).release(slot, holder)
    }

    fn save(&self, exp: Experiment, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).save(exp, expected)
    }

    fn get(&self, id: ExperimentId) -> Result<Option<Experiment>, StoreError> {
        (**self).get(id)
    }

    fn find_by_recommendation(&self, id: RecommendationId) -> Result<Option<Experiment>, StoreError> {
        (**self).find_by_recommendation(id)
    }

    fn open_in_slot(&self, slot: &SlotKey) -> Result<Option<Experiment>, StoreError> {
        (**self).open_in_slot(slot)
    }

    fn list(&self, kind: Option<ExperimentKind>, open_only: bool) -> Result<Vec<Experiment>, StoreError> {
        (**self).list(kind, open_only)
    }

    fn has_open_for_product(&self, product_id: ProductId) -> Result<bool, StoreError> {
        (**self).has_open_for_product(product_id)
    }
}

#[derive(Debug, Default)]
struct State {
    by_id: HashMap<ExperimentId, Experiment>,
    open_slots: HashMap<SlotKey, ExperimentId>,
}

/// In-memory experiment store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryExperimentStore {
    inner: RwLock<State>,
}

impl InMemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExperimentStore for InMemoryExperimentStore {
    fn insert(&self, exp: Experiment) -> Result<(), StoreError> {
        let slot = exp
            .slot()
            .ok_or_else(|| StoreError::NotFound("experiment was never started".to_string()))?;

        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        if let Some(holder) = state.open_slots.get(&slot).copied() {
            if holder != exp.id_typed() {
                return Err(StoreError::SlotOccupied { slot, holder });
            }
        }
        if state.by_id.contains_key(&exp.id_typed()) {
            return Err(StoreError::Duplicate(format!("experiment {}", exp.id_typed())));
        }
        if exp.status().is_open() {
            state.open_slots.insert(slot, exp.id_typed());
        } else {
            state.open_slots.remove(&slot);
        }
        state.by_id.insert(exp.id_typed(), exp);
        Ok(())
    }

    fn reserve(&self, slot: &SlotKey, holder: ExperimentId) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        if let Some(current) = state.open_slots.get(slot) {
            return Err(StoreError::SlotOccupied {
                slot: slot.clone(),
                holder: *current,
            });
        }
        state.open_slots.insert(slot.clone(), holder);
        Ok(())
    }

    fn release(&self, slot: &SlotKey, holder: ExperimentId) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        if state.open_slots.get(slot) == Some(&holder) && !state.by_id.contains_key(&holder) {
            state.open_slots.remove(slot);
        }
        Ok(())
    }

    fn save(&self, exp: Experiment, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let current = state
            .by_id
            .get(&exp.id_typed())
            .ok_or_else(|| StoreError::NotFound(format!("experiment {}", exp.id_typed())))?;
        if !expected.matches(current.version()) {
            return Err(StoreError::Concurrency(format!(
                "experiment {}: expected {expected:?}, found {}",
                exp.id_typed(),
                current.version()
            )));
        }

        if !exp.status().is_open() {
            if let Some(slot) = exp.slot() {
                if state.open_slots.get(&slot) == Some(&exp.id_typed()) {
                    state.open_slots.remove(&slot);
                }
            }
        }
        state.by_id.insert(exp.id_typed(), exp);
        Ok(())
    }

    fn get(&self, id: ExperimentId) -> Result<Option<Experiment>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn find_by_recommendation(&self, id: RecommendationId) -> Result<Option<Experiment>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state
            .by_id
            .values()
            .find(|e| e.subject().and_then(|s| s.recommendation_id()) == Some(id))
            .cloned())
    }

    fn open_in_slot(&self, slot: &SlotKey) -> Result<Option<Experiment>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state
            .open_slots
            .get(slot)
            .and_then(|id| state.by_id.get(id))
            .cloned())
    }

    fn list(&self, kind: Option<ExperimentKind>, open_only: bool) -> Result<Vec<Experiment>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        let mut out: Vec<Experiment> = state
            .by_id
            .values()
            .filter(|e| kind.is_none_or(|k| e.kind() == Some(k)))
            .filter(|e| !open_only || e.status().is_open())
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.review_date()
                .cmp(&b.review_date())
                .then_with(|| a.started_at().cmp(&b.started_at()))
        });
        Ok(out)
    }

    fn has_open_for_product(&self, product_id: ProductId) -> Result<bool, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state
            .open_slots
            .values()
            .filter_map(|id| state.by_id.get(id))
            .any(|e| e.subject().and_then(|s| s.product_id()) == Some(product_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use pricepilot_analytics::{MetricSet, Verdict};
    use pricepilot_core::{Aggregate, Money};
    use pricepilot_experiments::{CompleteExperiment, ExperimentCommand, ExperimentSubject, StartExperiment};

    fn started(product: i64, new_price: i64) -> Experiment {
        let id = ExperimentId::new();
        let mut exp = Experiment::empty(id);
        exp.execute(&ExperimentCommand::Start(StartExperiment {
            experiment_id: id,
            subject: ExperimentSubject::Price {
                product_id: ProductId::new(product),
                old_price: Money::from_major(100),
                new_price: Money::from_major(new_price),
                recommendation_id: None,
            },
            start_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            duration_days: 7,
            baseline: MetricSet::default(),
            occurred_at: Utc::now(),
        }))
        .unwrap();
        exp
    }

    #[test]
    fn second_open_experiment_on_same_slot_is_rejected() {
        let store = InMemoryExperimentStore::new();
        let first = started(1, 110);
        store.insert(first.clone()).unwrap();
        match store.insert(started(1, 120)).unwrap_err() {
            StoreError::SlotOccupied { holder, .. } => assert_eq!(holder, first.id_typed()),
            other => panic!("expected SlotOccupied, got {other:?}"),
        }
        store.insert(started(2, 120)).unwrap();
        assert!(store.has_open_for_product(ProductId::new(1)).unwrap());
    }

    #[test]
    fn completing_releases_the_slot() {
        let store = InMemoryExperimentStore::new();
        let mut exp = started(1, 110);
        store.insert(exp.clone()).unwrap();

        let before = exp.version();
        exp.execute(&ExperimentCommand::Complete(CompleteExperiment {
            experiment_id: exp.id_typed(),
            verdict: Verdict::Neutral,
            note: None,
            occurred_at: Utc::now(),
        }))
        .unwrap();
        store.save(exp, ExpectedVersion::Exact(before)).unwrap();

        assert!(!store.has_open_for_product(ProductId::new(1)).unwrap());
        store.insert(started(1, 120)).unwrap();
        assert_eq!(store.list(None, true).unwrap().len(), 1);
        assert_eq!(store.list(Some(ExperimentKind::Price), false).unwrap().len(), 2);
    }

    #[test]
    fn reservation_admits_only_its_holder() {
        let store = InMemoryExperimentStore::new();
        let exp = started(1, 110);
        let slot = exp.slot().unwrap();

        store.reserve(&slot, exp.id_typed()).unwrap();
        match store.insert(started(1, 120)).unwrap_err() {
            StoreError::SlotOccupied { holder, .. } => assert_eq!(holder, exp.id_typed()),
            other => panic!("expected SlotOccupied, got {other:?}"),
        }
        assert!(matches!(
            store.reserve(&slot, ExperimentId::new()),
            Err(StoreError::SlotOccupied { .. })
        ));

        store.insert(exp.clone()).unwrap();
        // Releasing after the insert leaves the open experiment holding the slot.
        store.release(&slot, exp.id_typed()).unwrap();
        assert_eq!(store.open_in_slot(&slot).unwrap().map(|e| e.id_typed()), Some(exp.id_typed()));
    }

    #[test]
    fn released_reservation_frees_the_slot() {
        let store = InMemoryExperimentStore::new();
        let slot = started(1, 110).slot().unwrap();
        let holder = ExperimentId::new();

        store.reserve(&slot, holder).unwrap();
        store.release(&slot, ExperimentId::new()).unwrap();
        assert!(store.insert(started(1, 120)).is_err());

        store.release(&slot, holder).unwrap();
        store.insert(started(1, 120)).unwrap();
    }
}

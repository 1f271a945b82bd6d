use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use pricepilot_core::{AggregateRoot, ChangeId, ExpectedVersion, RecommendationId};
use pricepilot_pricing::{PriceRecommendation, RecommendationStatus};

use super::StoreError;

pub trait RecommendationStore: Send + Sync {
    /// Persist a newly proposed recommendation. A taken change id is a
    /// `Duplicate`, never an overwrite.
    fn insert(&self, rec: PriceRecommendation) -> Result<(), StoreError>;

    /// Replace a stored recommendation if its stored version still matches `expected`.
    fn save(&self, rec: PriceRecommendation, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn get(&self, id: RecommendationId) -> Result<Option<PriceRecommendation>, StoreError>;

    fn find_by_change_id(&self, change_id: &ChangeId) -> Result<Option<PriceRecommendation>, StoreError>;

    /// Newest first, optionally filtered by status.
    fn list(&self, status: Option<RecommendationStatus>) -> Result<Vec<PriceRecommendation>, StoreError>;
}

impl<S> RecommendationStore for Arc<S>
where
    S: RecommendationStore + ?Sized,
{
    fn insert(&self, rec: PriceRecommendation) -> Result<(), StoreError> {
        (**self).insert(rec)
    }

    fn save(&self, rec: PriceRecommendation, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).save(rec, expected)
    }

    fn get(&self, id: RecommendationId) -> Result<Option<PriceRecommendation>, StoreError> {
        (**self).get(id)
    }

    fn find_by_change_id(&self, change_id: &ChangeId) -> Result<Option<PriceRecommendation>, StoreError> {
        (**self).find_by_change_id(change_id)
    }

    fn list(&self, status: Option<RecommendationStatus>) -> Result<Vec<PriceRecommendation>, StoreError> {
        (**self).list(status)
    }
}

#[derive(Debug, Default)]
struct State {
    by_id: HashMap<RecommendationId, PriceRecommendation>,
    by_change_id: HashMap<ChangeId, RecommendationId>,
}

/// In-memory recommendation store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRecommendationStore {
    inner: RwLock<State>,
}

impl InMemoryRecommendationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecommendationStore for InMemoryRecommendationStore {
    fn insert(&self, rec: PriceRecommendation) -> Result<(), StoreError> {
        let change_id = rec
            .change_id()
            .cloned()
            .ok_or_else(|| StoreError::NotFound("recommendation was never proposed".to_string()))?;

        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        if state.by_change_id.contains_key(&change_id) {
            return Err(StoreError::Duplicate(format!("change id {change_id}")));
        }
        if state.by_id.contains_key(&rec.id_typed()) {
            return Err(StoreError::Duplicate(format!("recommendation {}", rec.id_typed())));
        }
        state.by_change_id.insert(change_id, rec.id_typed());
        state.by_id.insert(rec.id_typed(), rec);
        Ok(())
    }

    fn save(&self, rec: PriceRecommendation, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let current = state
            .by_id
            .get_mut(&rec.id_typed())
            .ok_or_else(|| StoreError::NotFound(format!("recommendation {}", rec.id_typed())))?;
        if !expected.matches(current.version()) {
            return Err(StoreError::Concurrency(format!(
                "recommendation {}: expected {expected:?}, found {}",
                rec.id_typed(),
                current.version()
            )));
        }
        *current = rec;
        Ok(())
    }

    fn get(&self, id: RecommendationId) -> Result<Option<PriceRecommendation>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn find_by_change_id(&self, change_id: &ChangeId) -> Result<Option<PriceRecommendation>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state
            .by_change_id
            .get(change_id)
            .and_then(|id| state.by_id.get(id))
            .cloned())
    }

    fn list(&self, status: Option<RecommendationStatus>) -> Result<Vec<PriceRecommendation>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        let mut out: Vec<PriceRecommendation> = state
            .by_id
            .values()
            .filter(|r| status.is_none_or(|s| r.status() == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.change_id().cmp(&b.change_id()))
        });
        Ok(out)
    }
}

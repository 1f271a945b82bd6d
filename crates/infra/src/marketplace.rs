//! Marketplace port: the mutations the engine performs and the metrics it reads back.
//!
//! Adapters own their client state (tokens, rate limits) and normalize every
//! metric response into a [`MetricSet`], leaving fields the source cannot
//! provide as `None`.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pricepilot_analytics::MetricSet;
use pricepilot_catalog::DateRange;
use pricepilot_core::{CampaignId, Money, ProductId};
use pricepilot_experiments::ContentField;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarketplaceError {
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    #[error("marketplace rejected the request: {0}")]
    Rejected(String),

    #[error("marketplace unavailable: {0}")]
    Unavailable(String),

    #[error("unknown marketplace object: {0}")]
    NotFound(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignAction {
    Activate,
    Deactivate,
}

#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Set the live price. Setting the same price twice is harmless.
    async fn apply_price(&self, product_id: ProductId, offer_id: &str, new_price: Money) -> Result<(), MarketplaceError>;

    async fn apply_content(&self, product_id: ProductId, field: ContentField, value: &str) -> Result<(), MarketplaceError>;

    async fn apply_campaign_action(&self, campaign_id: &CampaignId, action: CampaignAction) -> Result<(), MarketplaceError>;

    async fn set_bid(&self, campaign_id: &CampaignId, product_id: Option<ProductId>, bid: Money) -> Result<(), MarketplaceError>;

    async fn fetch_campaign_metrics(&self, campaign_id: &CampaignId, range: DateRange) -> Result<MetricSet, MarketplaceError>;

    async fn fetch_content_metrics(&self, product_id: ProductId, range: DateRange) -> Result<MetricSet, MarketplaceError>;
}

/// Run a marketplace call with an upper bound on its duration.
pub async fn with_timeout<T, F>(operation: &'static str, limit: Duration, call: F) -> Result<T, MarketplaceError>
where
    F: Future<Output = Result<T, MarketplaceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(MarketplaceError::Timeout {
            operation,
            after_ms: limit.as_millis() as u64,
        }),
    }
}

/// A mutation the in-memory marketplace accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketplaceCall {
    Price { product_id: ProductId, price: Money },
    Content { product_id: ProductId, field: ContentField, value: String },
    Campaign { campaign_id: CampaignId, action: CampaignAction },
    Bid { campaign_id: CampaignId, product_id: Option<ProductId>, bid: Money },
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<MarketplaceCall>,
    failures: VecDeque<MarketplaceError>,
    fetch_failures: VecDeque<MarketplaceError>,
    delay: Option<Duration>,
    campaign_metrics: HashMap<CampaignId, VecDeque<MetricSet>>,
    content_metrics: HashMap<ProductId, VecDeque<MetricSet>>,
}

/// In-memory marketplace for tests/dev.
///
/// Queued failures are consumed one per mutation, queued fetch failures one per
/// metrics fetch. Queued metric sets are
/// returned in order; the last one keeps being returned.
#[derive(Debug, Default)]
pub struct InMemoryMarketplace {
    inner: Mutex<FakeState>,
}

impl InMemoryMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: MarketplaceError) {
        if let Ok(mut s) = self.inner.lock() {
            s.failures.push_back(error);
        }
    }

    pub fn fail_next_fetch(&self, error: MarketplaceError) {
        if let Ok(mut s) = self.inner.lock() {
            s.fetch_failures.push_back(error);
        }
    }

    /// Delay every mutation, e.g. to exercise timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut s) = self.inner.lock() {
            s.delay = delay;
        }
    }

    pub fn push_campaign_metrics(&self, campaign_id: CampaignId, metrics: MetricSet) {
        if let Ok(mut s) = self.inner.lock() {
            s.campaign_metrics.entry(campaign_id).or_default().push_back(metrics);
        }
    }

    pub fn push_content_metrics(&self, product_id: ProductId, metrics: MetricSet) {
        if let Ok(mut s) = self.inner.lock() {
            s.content_metrics.entry(product_id).or_default().push_back(metrics);
        }
    }

    pub fn calls(&self) -> Vec<MarketplaceCall> {
        self.inner.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    async fn mutate(&self, call: MarketplaceCall) -> Result<(), MarketplaceError> {
        let delay = self
            .inner
            .lock()
            .map_err(|_| MarketplaceError::Unavailable("fake state poisoned".to_string()))?
            .delay;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let mut s = self
            .inner
            .lock()
            .map_err(|_| MarketplaceError::Unavailable("fake state poisoned".to_string()))?;
        if let Some(err) = s.failures.pop_front() {
            return Err(err);
        }
        s.calls.push(call);
        Ok(())
    }

    fn next_metrics<K: Eq + core::hash::Hash>(queue: &mut HashMap<K, VecDeque<MetricSet>>, key: &K) -> MetricSet {
        match queue.get_mut(key) {
            Some(q) if q.len() > 1 => q.pop_front().unwrap_or_default(),
            Some(q) => q.front().copied().unwrap_or_default(),
            None => MetricSet::default(),
        }
    }
}

#[async_trait]
impl Marketplace for InMemoryMarketplace {
    async fn apply_price(&self, product_id: ProductId, _offer_id: &str, new_price: Money) -> Result<(), MarketplaceError> {
        if !new_price.is_positive() {
            return Err(MarketplaceError::Rejected(format!("price {new_price} must be positive")));
        }
        self.mutate(MarketplaceCall::Price {
            product_id,
            price: new_price,
        })
        .await
    }

    async fn apply_content(&self, product_id: ProductId, field: ContentField, value: &str) -> Result<(), MarketplaceError> {
        self.mutate(MarketplaceCall::Content {
            product_id,
            field,
            value: value.to_string(),
        })
        .await
    }

    async fn apply_campaign_action(&self, campaign_id: &CampaignId, action: CampaignAction) -> Result<(), MarketplaceError> {
        self.mutate(MarketplaceCall::Campaign {
            campaign_id: campaign_id.clone(),
            action,
        })
        .await
    }

    async fn set_bid(&self, campaign_id: &CampaignId, product_id: Option<ProductId>, bid: Money) -> Result<(), MarketplaceError> {
        self.mutate(MarketplaceCall::Bid {
            campaign_id: campaign_id.clone(),
            product_id,
            bid,
        })
        .await
    }

    async fn fetch_campaign_metrics(&self, campaign_id: &CampaignId, _range: DateRange) -> Result<MetricSet, MarketplaceError> {
        let mut s = self
            .inner
            .lock()
            .map_err(|_| MarketplaceError::Unavailable("fake state poisoned".to_string()))?;
        if let Some(err) = s.fetch_failures.pop_front() {
            return Err(err);
        }
        Ok(Self::next_metrics(&mut s.campaign_metrics, campaign_id))
    }

    async fn fetch_content_metrics(&self, product_id: ProductId, _range: DateRange) -> Result<MetricSet, MarketplaceError> {
        let mut s = self
            .inner
            .lock()
            .map_err(|_| MarketplaceError::Unavailable("fake state poisoned".to_string()))?;
        if let Some(err) = s.fetch_failures.pop_front() {
            return Err(err);
        }
        Ok(Self::next_metrics(&mut s.content_metrics, &product_id))
    }
}

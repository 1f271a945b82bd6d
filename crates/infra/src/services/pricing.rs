//! Price analysis, recommendation generation and the approve-and-apply path.
//!
//! Approval claims the recommendation first (`pending → approved`, saved with an
//! exact expected version), so two concurrent approvals cannot both reach the
//! marketplace. A retry after a successful apply returns the experiment that
//! apply created.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pricepilot_analytics::{self as analytics, MetricSet, PriceAnalysis, PriceProposal, SalesTrend};
use pricepilot_catalog::{DateRange, Product};
use pricepilot_core::{Aggregate, AggregateRoot, ChangeId, ExpectedVersion, ExperimentId, ProductId, RecommendationId};
use pricepilot_experiments::{Experiment, ExperimentSubject};
use pricepilot_pricing::{
    ApproveRecommendation, MarkApplied, MarkFailed, PriceRecommendation, ProposeRecommendation,
    RecommendationCommand, RecommendationEvent, RecommendationStatus, RejectRecommendation,
};

use super::{Engine, EngineError, EngineResult};
use crate::alerts::{Alert, AlertKind, Severity};
use crate::journal::{
    JournalEvent, PRODUCT_STREAM, PriceChangeSource, PriceChanged, RECOMMENDATION_STREAM, product_stream_id,
};
use crate::marketplace::with_timeout;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl core::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(Decision::Approve),
            "reject" | "rejected" => Ok(Decision::Reject),
            other => Err(format!("unknown decision '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub recommendation: PriceRecommendation,
    /// The experiment spawned by the apply; `None` after a rejection.
    pub experiment: Option<Experiment>,
}

/// What one batch run produced.
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub created: Vec<PriceRecommendation>,
    /// Products that already had a recommendation under today's change id.
    pub duplicates: usize,
    pub failed: usize,
}

impl Engine {
    fn analyze_product(&self, product: &Product) -> EngineResult<PriceAnalysis> {
        let yesterday = self.clock().yesterday();
        let scoring = &self.settings().scoring;

        let forecast = self.forecast(product.id)?;
        let sales = self
            .catalog()
            .sales_totals(product.id, DateRange::trailing(yesterday, scoring.sales_window_days))?;

        let window = scoring.trend_window_days;
        let rows = self
            .catalog()
            .sales_rows(product.id, DateRange::trailing(yesterday, window.saturating_mul(2)))?;
        let trend = SalesTrend::compute(product.id, &rows, yesterday, window);

        Ok(PriceAnalysis::new(product, &forecast, sales, trend.quantity_change_pct))
    }

    pub fn analyze(&self, id: ProductId) -> EngineResult<PriceAnalysis> {
        let product = self
            .catalog()
            .get_product(id)?
            .ok_or_else(|| EngineError::NotFound(format!("product {id}")))?;
        self.analyze_product(&product)
    }

    /// Preview the recommendation for one product without persisting it.
    pub fn recommend(&self, id: ProductId) -> EngineResult<Option<PriceProposal>> {
        let analysis = self.analyze(id)?;
        Ok(analytics::propose(&analysis, &self.settings().scoring))
    }

    /// Active products with no open experiment of any kind.
    pub fn eligible_products(&self) -> EngineResult<Vec<Product>> {
        let mut out = Vec::new();
        for product in self.catalog().list_products(true)? {
            if !self.experiments().has_open_for_product(product.id)? {
                out.push(product);
            }
        }
        Ok(out)
    }

    /// Proposals for every eligible product. Per-product failures are logged and skipped.
    pub fn recommend_all(&self) -> EngineResult<Vec<(PriceAnalysis, PriceProposal)>> {
        let mut out = Vec::new();
        for product in self.eligible_products()? {
            let analysis = match self.analyze_product(&product) {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(product_id = %product.id, error = %e, "price analysis failed");
                    continue;
                }
            };
            if let Some(proposal) = analytics::propose(&analysis, &self.settings().scoring) {
                out.push((analysis, proposal));
            }
        }
        Ok(out)
    }

    /// Score every eligible product and persist a pending recommendation for each proposal.
    pub fn generate_recommendations(&self) -> EngineResult<GenerationReport> {
        let today = self.clock().today();
        let now = self.clock().now();
        let baseline_window = Experiment::baseline_window(today, self.settings().experiments.default_duration_days);

        let mut report = GenerationReport::default();
        for (analysis, proposal) in self.recommend_all()? {
            let change_id = ChangeId::for_recommendation(today, &analysis.offer_id);
            let result = self
                .catalog()
                .sales_totals(analysis.product_id, baseline_window)
                .map_err(EngineError::from)
                .and_then(|baseline| {
                    let id = RecommendationId::new();
                    let mut rec = PriceRecommendation::empty(id);
                    let events = rec.execute(&RecommendationCommand::Propose(ProposeRecommendation::from_proposal(
                        id,
                        change_id.clone(),
                        &analysis,
                        &proposal,
                        baseline,
                        now,
                    )))?;
                    self.recommendations().insert(rec.clone())?;
                    self.record_recommendation(&rec, events);
                    Ok(rec)
                });

            match result {
                Ok(rec) => {
                    tracing::info!(
                        product_id = %analysis.product_id,
                        change_id = %change_id,
                        direction = ?proposal.direction,
                        from = %proposal.current_price,
                        to = %proposal.recommended_price,
                        "recommendation proposed"
                    );
                    report.created.push(rec);
                }
                Err(EngineError::Conflict(_)) => {
                    tracing::debug!(change_id = %change_id, "recommendation already exists");
                    report.duplicates += 1;
                }
                Err(e) => {
                    tracing::error!(product_id = %analysis.product_id, change_id = %change_id, error = %e, "failed to persist recommendation");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    pub fn get_recommendation(&self, change_id: &ChangeId) -> EngineResult<PriceRecommendation> {
        self.recommendations()
            .find_by_change_id(change_id)?
            .ok_or_else(|| EngineError::NotFound(format!("recommendation {change_id}")))
    }

    pub fn list_recommendations(&self, status: Option<RecommendationStatus>) -> EngineResult<Vec<PriceRecommendation>> {
        Ok(self.recommendations().list(status)?)
    }

    /// Approve (apply the price, start the experiment) or reject a pending recommendation.
    pub async fn decide_recommendation(&self, change_id: &ChangeId, decision: Decision) -> EngineResult<DecisionOutcome> {
        let rec = self.get_recommendation(change_id)?;
        match decision {
            Decision::Reject => self.reject(rec),
            Decision::Approve => self.approve_and_apply(rec).await,
        }
    }

    fn reject(&self, mut rec: PriceRecommendation) -> EngineResult<DecisionOutcome> {
        let now = self.clock().now();
        let id = rec.id_typed();
        self.transition(
            &mut rec,
            RecommendationCommand::Reject(RejectRecommendation {
                recommendation_id: id,
                occurred_at: now,
            }),
        )?;
        tracing::info!(change_id = ?rec.change_id().map(ChangeId::as_str), "recommendation rejected");
        Ok(DecisionOutcome {
            recommendation: rec,
            experiment: None,
        })
    }

    async fn approve_and_apply(&self, mut rec: PriceRecommendation) -> EngineResult<DecisionOutcome> {
        let id = rec.id_typed();
        if rec.status() == RecommendationStatus::Applied {
            let experiment = self.experiments().find_by_recommendation(id)?;
            return Ok(DecisionOutcome {
                recommendation: rec,
                experiment,
            });
        }

        let subject = ExperimentSubject::Price {
            product_id: rec.product_id(),
            old_price: rec.current_price(),
            new_price: rec.recommended_price(),
            recommendation_id: Some(id),
        };
        let slot = subject.slot();
        let experiment_id = ExperimentId::new();
        // Hold the slot before the price goes live; released again if nothing is applied.
        self.experiments().reserve(&slot, experiment_id)?;

        // Claim: a concurrent approval fails its version check here.
        if let Err(e) = self.transition(
            &mut rec,
            RecommendationCommand::Approve(ApproveRecommendation {
                recommendation_id: id,
                occurred_at: self.clock().now(),
            }),
        ) {
            self.experiments().release(&slot, experiment_id)?;
            return Err(e);
        }

        let change_id = rec.change_id().map(|c| c.to_string()).unwrap_or_default();
        let applied = with_timeout(
            "apply_price",
            self.settings().marketplace_timeout,
            self.deps
                .marketplace
                .apply_price(rec.product_id(), rec.offer_id(), rec.recommended_price()),
        )
        .await;

        if let Err(cause) = applied {
            self.experiments().release(&slot, experiment_id)?;
            tracing::error!(product_id = %rec.product_id(), change_id = %change_id, error = %cause, "price apply failed");
            self.transition(
                &mut rec,
                RecommendationCommand::MarkFailed(MarkFailed {
                    recommendation_id: id,
                    reason: cause.to_string(),
                    occurred_at: self.clock().now(),
                }),
            )?;
            self.alert(
                Alert::new(
                    AlertKind::ApplyFailed,
                    Severity::Critical,
                    format!("{change_id}: price change for {} failed: {cause}", rec.product_name()),
                    self.clock().now(),
                )
                .for_product(rec.product_id()),
            );
            return Err(EngineError::external("apply_price", cause));
        }

        let now = self.clock().now();
        let previous = self.catalog().set_price(rec.product_id(), rec.recommended_price())?;
        self.transition(
            &mut rec,
            RecommendationCommand::MarkApplied(MarkApplied {
                recommendation_id: id,
                occurred_at: now,
            }),
        )?;
        self.record_price_change(PriceChanged {
            product_id: rec.product_id(),
            old_price: previous.price,
            new_price: rec.recommended_price(),
            source: PriceChangeSource::Recommendation,
            reference: change_id.clone(),
            occurred_at: now,
        });

        let experiment = self.open_experiment(
            experiment_id,
            subject,
            self.settings().experiments.default_duration_days,
            MetricSet::from_sales(rec.baseline()),
        )?;
        tracing::info!(
            product_id = %rec.product_id(),
            change_id = %change_id,
            experiment_id = %experiment.id_typed(),
            "recommendation applied"
        );

        Ok(DecisionOutcome {
            recommendation: rec,
            experiment: Some(experiment),
        })
    }

    /// Execute a command and save it against the version it was loaded at.
    fn transition(&self, rec: &mut PriceRecommendation, cmd: RecommendationCommand) -> EngineResult<()> {
        let expected = ExpectedVersion::Exact(rec.version());
        let events = rec.execute(&cmd)?;
        self.recommendations().save(rec.clone(), expected)?;
        self.record_recommendation(rec, events);
        Ok(())
    }

    fn record_recommendation(&self, rec: &PriceRecommendation, events: Vec<RecommendationEvent>) {
        let at = self.clock().now();
        self.record(
            Uuid::from(rec.id_typed()),
            RECOMMENDATION_STREAM,
            events.into_iter().map(JournalEvent::Recommendation).collect(),
            at,
        );
    }

    pub(crate) fn record_price_change(&self, change: PriceChanged) {
        let stream = product_stream_id(change.product_id);
        let at = change.occurred_at;
        self.record(stream, PRODUCT_STREAM, vec![JournalEvent::PriceChanged(change)], at);
    }
}

//! Experiment lifecycle over the stores and the marketplace.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pricepilot_analytics::{ExperimentKind, MetricDeltas, MetricSet, Verdict, VerdictProposal, verdict};
use pricepilot_catalog::DateRange;
use pricepilot_core::{Aggregate, AggregateRoot, ExpectedVersion, ExperimentId};
use pricepilot_experiments::{
    AdAction, CompleteExperiment, Experiment, ExperimentCommand, ExperimentEvent, ExperimentSubject, RecordReview,
    RollBackExperiment, StartExperiment,
};

use super::{Engine, EngineError, EngineResult};
use crate::journal::{EXPERIMENT_STREAM, JournalEvent, PriceChangeSource, PriceChanged};
use crate::marketplace::{CampaignAction, with_timeout};

/// A manually started experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub subject: ExperimentSubject,
    #[serde(default)]
    pub duration_days: Option<u32>,
    /// Push the change to the marketplace before instrumenting it. When false the
    /// caller has already applied it.
    #[serde(default)]
    pub apply_change: bool,
}

#[derive(Debug, Clone)]
pub struct ExperimentReview {
    pub experiment: Experiment,
    pub result: MetricSet,
    pub deltas: MetricDeltas,
    pub suggestion: VerdictProposal,
}

#[derive(Debug, Clone)]
pub struct ActiveExperiment {
    pub experiment: Experiment,
    pub days_left: i64,
    pub overdue: bool,
}

impl Engine {
    pub fn get_experiment(&self, id: ExperimentId) -> EngineResult<Experiment> {
        self.experiments()
            .get(id)?
            .ok_or_else(|| EngineError::NotFound(format!("experiment {id}")))
    }

    /// Instrument a change: capture the baseline and open the experiment.
    pub async fn start_experiment(&self, req: StartRequest) -> EngineResult<Experiment> {
        req.subject.validate()?;
        if let Some(product_id) = req.subject.product_id() {
            if self.catalog().get_product(product_id)?.is_none() {
                return Err(EngineError::NotFound(format!("product {product_id}")));
            }
        }
        let duration = req
            .duration_days
            .unwrap_or(self.settings().experiments.default_duration_days);
        if duration == 0 {
            return Err(EngineError::Validation("duration_days must be at least 1".to_string()));
        }

        let id = ExperimentId::new();
        let slot = req.subject.slot();
        if req.apply_change {
            // The slot is held before the change goes live so no other start can take it.
            self.experiments().reserve(&slot, id)?;
            if let Err(e) = self.push_change(&req.subject).await {
                self.experiments().release(&slot, id)?;
                return Err(e);
            }
            if let ExperimentSubject::Price {
                product_id,
                old_price,
                new_price,
                ..
            } = &req.subject
            {
                let now = self.clock().now();
                self.catalog().set_price(*product_id, *new_price)?;
                self.record_price_change(PriceChanged {
                    product_id: *product_id,
                    old_price: *old_price,
                    new_price: *new_price,
                    source: PriceChangeSource::Experiment,
                    reference: slot.to_string(),
                    occurred_at: now,
                });
            }
        }

        let window = Experiment::baseline_window(self.clock().today(), duration);
        let opened = match self.baseline_metrics(&req.subject, window).await {
            Ok(baseline) => self.open_experiment(id, req.subject, duration, baseline),
            Err(e) => Err(e),
        };
        let exp = match opened {
            Ok(exp) => exp,
            Err(e) => {
                self.experiments().release(&slot, id)?;
                return Err(e);
            }
        };
        tracing::info!(
            experiment_id = %exp.id_typed(),
            kind = ?exp.kind(),
            slot = %slot,
            review_date = %exp.review_date(),
            "experiment started"
        );
        Ok(exp)
    }

    /// Persist a started experiment under `id`; fails with `Conflict` when its slot
    /// is taken by anything other than a reservation for `id`.
    pub(crate) fn open_experiment(
        &self,
        id: ExperimentId,
        subject: ExperimentSubject,
        duration_days: u32,
        baseline: MetricSet,
    ) -> EngineResult<Experiment> {
        let now = self.clock().now();
        let mut exp = Experiment::empty(id);
        let events = exp.execute(&ExperimentCommand::Start(StartExperiment {
            experiment_id: id,
            subject,
            start_date: self.clock().today(),
            duration_days,
            baseline,
            occurred_at: now,
        }))?;
        self.experiments().insert(exp.clone())?;
        self.record_experiment(&exp, events);
        Ok(exp)
    }

    /// Measure results since the start and propose a verdict. Never decides.
    pub async fn review_experiment(&self, id: ExperimentId) -> EngineResult<ExperimentReview> {
        let mut exp = self.get_experiment(id)?;
        let subject = exp
            .subject()
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("experiment {id}")))?;
        if !exp.status().is_open() {
            return Err(EngineError::InvalidTransition {
                entity: "experiment",
                current: exp.status().to_string(),
                requested: "review".to_string(),
            });
        }
        if *exp.baseline() == MetricSet::default() {
            return Err(EngineError::MissingBaseline(id.to_string()));
        }
        let window = exp
            .review_window(self.clock().today())
            .ok_or_else(|| EngineError::Validation(format!("experiment {id} has no full day of results yet")))?;

        // A failed fetch leaves the experiment as it was.
        let result = self.collect_metrics(&subject, window).await?;
        let suggestion = verdict(exp.baseline(), &result, subject.kind(), &self.settings().verdict);

        self.transition_experiment(
            &mut exp,
            ExperimentCommand::RecordReview(RecordReview {
                experiment_id: id,
                result,
                suggestion: suggestion.clone(),
                occurred_at: self.clock().now(),
            }),
        )?;
        tracing::info!(experiment_id = %id, verdict = %suggestion.verdict, "experiment reviewed");

        Ok(ExperimentReview {
            deltas: suggestion.deltas.clone(),
            experiment: exp,
            result,
            suggestion,
        })
    }

    /// Close an experiment with a human verdict, reverting the change when `rollback` is set.
    pub async fn complete_experiment(
        &self,
        id: ExperimentId,
        verdict: Verdict,
        note: Option<String>,
        rollback: bool,
    ) -> EngineResult<Experiment> {
        if rollback {
            return self.rollback_experiment(id, verdict, note).await;
        }
        let mut exp = self.get_experiment(id)?;
        self.transition_experiment(
            &mut exp,
            ExperimentCommand::Complete(CompleteExperiment {
                experiment_id: id,
                verdict,
                note,
                occurred_at: self.clock().now(),
            }),
        )?;
        tracing::info!(experiment_id = %id, %verdict, "experiment completed");
        Ok(exp)
    }

    /// Revert a failed experiment's change on the marketplace, then close it.
    ///
    /// If the revert fails the experiment is left as it was.
    pub async fn rollback_experiment(&self, id: ExperimentId, verdict: Verdict, note: Option<String>) -> EngineResult<Experiment> {
        let mut exp = self.get_experiment(id)?;
        let cmd = ExperimentCommand::RollBack(RollBackExperiment {
            experiment_id: id,
            verdict,
            note,
            occurred_at: self.clock().now(),
        });
        // Validate before touching the marketplace.
        let planned = exp.handle(&cmd)?;
        let reverted = planned
            .iter()
            .find_map(|e| match e {
                ExperimentEvent::RolledBack(r) => Some(r.reverted.clone()),
                _ => None,
            })
            .ok_or_else(|| EngineError::Validation("rollback produced no revert".to_string()))?;

        if let Err(e) = self.push_change(&reverted).await {
            tracing::error!(experiment_id = %id, error = %e, "rollback failed; experiment left unchanged");
            return Err(e);
        }
        if let ExperimentSubject::Price {
            product_id, new_price, ..
        } = &reverted
        {
            let previous = self.catalog().set_price(*product_id, *new_price)?;
            self.record_price_change(PriceChanged {
                product_id: *product_id,
                old_price: previous.price,
                new_price: *new_price,
                source: PriceChangeSource::Rollback,
                reference: id.to_string(),
                occurred_at: self.clock().now(),
            });
        }

        self.transition_experiment(&mut exp, cmd)?;
        tracing::info!(experiment_id = %id, change = %reverted.describe(), "experiment rolled back");
        Ok(exp)
    }

    /// Open experiments with their countdown, soonest review first.
    pub fn list_active_experiments(&self, kind: Option<ExperimentKind>) -> EngineResult<Vec<ActiveExperiment>> {
        let today = self.clock().today();
        Ok(self
            .experiments()
            .list(kind, true)?
            .into_iter()
            .map(|experiment| ActiveExperiment {
                days_left: experiment.days_left(today),
                overdue: experiment.is_overdue(today),
                experiment,
            })
            .collect())
    }

    /// Active experiments whose review date has arrived.
    pub fn due_for_review(&self) -> EngineResult<Vec<Experiment>> {
        let today = self.clock().today();
        Ok(self
            .experiments()
            .list(None, true)?
            .into_iter()
            .filter(|e| e.status() == pricepilot_experiments::ExperimentStatus::Active && e.is_due(today))
            .collect())
    }

    /// Open experiments overdue by more than the configured grace period.
    pub fn stuck_experiments(&self) -> EngineResult<Vec<Experiment>> {
        let today = self.clock().today();
        let grace = self.settings().experiments.stuck_after_days;
        Ok(self
            .experiments()
            .list(None, true)?
            .into_iter()
            .filter(|e| e.is_stuck(today, grace))
            .collect())
    }

    /// Baseline for a new experiment. A failed metrics fetch leaves the remote fields
    /// unavailable instead of blocking the start.
    async fn baseline_metrics(&self, subject: &ExperimentSubject, window: DateRange) -> EngineResult<MetricSet> {
        match self.collect_metrics(subject, window).await {
            Err(EngineError::ExternalApplyFailure { operation, cause }) => {
                tracing::warn!(slot = %subject.slot(), operation, error = %cause, "marketplace metrics unavailable");
                self.local_metrics(subject, window)
            }
            other => other,
        }
    }

    /// Orders and revenue from local sales, overlaid with what the marketplace reports.
    async fn collect_metrics(&self, subject: &ExperimentSubject, window: DateRange) -> EngineResult<MetricSet> {
        let local = self.local_metrics(subject, window)?;
        let limit = self.settings().marketplace_timeout;
        let (operation, remote) = match subject {
            ExperimentSubject::Price { .. } => return Ok(local),
            ExperimentSubject::Content { product_id, .. } => (
                "fetch_content_metrics",
                with_timeout(
                    "fetch_content_metrics",
                    limit,
                    self.deps.marketplace.fetch_content_metrics(*product_id, window),
                )
                .await,
            ),
            ExperimentSubject::Ad { campaign_id, .. } => (
                "fetch_campaign_metrics",
                with_timeout(
                    "fetch_campaign_metrics",
                    limit,
                    self.deps.marketplace.fetch_campaign_metrics(campaign_id, window),
                )
                .await,
            ),
        };
        remote
            .map(|remote| local.merged_with(remote))
            .map_err(|cause| EngineError::external(operation, cause))
    }

    fn local_metrics(&self, subject: &ExperimentSubject, window: DateRange) -> EngineResult<MetricSet> {
        Ok(match subject.product_id() {
            Some(product_id) => MetricSet::from_sales(self.catalog().sales_totals(product_id, window)?),
            None => MetricSet::default(),
        })
    }

    /// Apply a change on the marketplace within the configured timeout.
    async fn push_change(&self, subject: &ExperimentSubject) -> EngineResult<()> {
        let limit = self.settings().marketplace_timeout;
        let market = &self.deps.marketplace;
        let (operation, result) = match subject {
            ExperimentSubject::Price {
                product_id, new_price, ..
            } => {
                let product = self
                    .catalog()
                    .get_product(*product_id)?
                    .ok_or_else(|| EngineError::NotFound(format!("product {product_id}")))?;
                (
                    "apply_price",
                    with_timeout(
                        "apply_price",
                        limit,
                        market.apply_price(*product_id, &product.offer_id, *new_price),
                    )
                    .await,
                )
            }
            ExperimentSubject::Content {
                product_id,
                field,
                new_value,
                ..
            } => (
                "apply_content",
                with_timeout("apply_content", limit, market.apply_content(*product_id, *field, new_value)).await,
            ),
            ExperimentSubject::Ad {
                campaign_id,
                product_id,
                action,
            } => match action {
                AdAction::Activate | AdAction::Deactivate => {
                    let action = if matches!(action, AdAction::Activate) {
                        CampaignAction::Activate
                    } else {
                        CampaignAction::Deactivate
                    };
                    (
                        "apply_campaign_action",
                        with_timeout(
                            "apply_campaign_action",
                            limit,
                            market.apply_campaign_action(campaign_id, action),
                        )
                        .await,
                    )
                }
                AdAction::ChangeBid { new_bid, .. } => (
                    "set_bid",
                    with_timeout("set_bid", limit, market.set_bid(campaign_id, *product_id, *new_bid)).await,
                ),
            },
        };
        result.map_err(|cause| EngineError::external(operation, cause))
    }

    fn transition_experiment(&self, exp: &mut Experiment, cmd: ExperimentCommand) -> EngineResult<()> {
        let expected = ExpectedVersion::Exact(exp.version());
        let events = exp.execute(&cmd)?;
        self.experiments().save(exp.clone(), expected)?;
        self.record_experiment(exp, events);
        Ok(())
    }

    fn record_experiment(&self, exp: &Experiment, events: Vec<ExperimentEvent>) {
        let at = self.clock().now();
        self.record(
            Uuid::from(exp.id_typed()),
            EXPERIMENT_STREAM,
            events.into_iter().map(JournalEvent::Experiment).collect(),
            at,
        );
    }
}

//! Request bodies, query strings and JSON views of the aggregates.
//!
//! Money crosses the boundary as integer minor units; percentages as decimals.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use pricepilot_analytics::Verdict;
use pricepilot_catalog::{InventorySnapshot, SalesAggregate};
use pricepilot_core::{AggregateRoot, Money, ProductId};
use pricepilot_experiments::Experiment;
use pricepilot_infra::services::{ActiveExperiment, Decision, DecisionOutcome, ExperimentReview, GenerationReport};
use pricepilot_pricing::PriceRecommendation;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RecordSalesRequest {
    pub date: NaiveDate,
    pub quantity: i64,
    pub revenue: Money,
    #[serde(default)]
    pub returns_qty: i64,
    #[serde(default)]
    pub returns_amount: Money,
}

impl RecordSalesRequest {
    pub fn into_row(self, product_id: ProductId) -> SalesAggregate {
        SalesAggregate {
            product_id,
            date: self.date,
            quantity: self.quantity,
            revenue: self.revenue,
            returns_qty: self.returns_qty,
            returns_amount: self.returns_amount,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordStockRequest {
    pub warehouse: String,
    pub quantity: i64,
    #[serde(default)]
    pub reserved: i64,
    pub snapshot_date: NaiveDate,
}

impl RecordStockRequest {
    pub fn into_snapshot(self, product_id: ProductId) -> InventorySnapshot {
        InventorySnapshot {
            product_id,
            warehouse: self.warehouse,
            quantity: self.quantity,
            reserved: self.reserved,
            snapshot_date: self.snapshot_date,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub decision: Decision,
}

#[derive(Debug, Deserialize)]
pub struct CompleteExperimentRequest {
    pub verdict: Verdict,
    pub note: Option<String>,
    /// Revert the change on the marketplace before closing.
    #[serde(default)]
    pub rollback: bool,
}

// -------------------------
// Query strings
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct LowStockQuery {
    pub urgency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OverstockQuery {
    pub threshold_days: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReorderQuery {
    /// Budget in minor units.
    pub max_total_cost: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendQuery {
    pub window_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KindQuery {
    pub kind: Option<String>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn recommendation_to_json(rec: &PriceRecommendation) -> Value {
    json!({
        "id": rec.id_typed().to_string(),
        "change_id": rec.change_id().map(|c| c.as_str().to_string()),
        "product_id": rec.product_id(),
        "offer_id": rec.offer_id(),
        "product_name": rec.product_name(),
        "direction": rec.direction(),
        "current_price": rec.current_price(),
        "recommended_price": rec.recommended_price(),
        "change_pct": rec.change_pct(),
        "score_up": rec.score_up(),
        "score_down": rec.score_down(),
        "factors": rec.factors(),
        "baseline": rec.baseline(),
        "status": rec.status(),
        "failure_reason": rec.failure_reason(),
        "created_at": rec.created_at(),
        "reviewed_at": rec.reviewed_at(),
        "applied_at": rec.applied_at(),
        "version": rec.version(),
    })
}

pub fn experiment_to_json(exp: &Experiment) -> Value {
    json!({
        "id": exp.id_typed().to_string(),
        "kind": exp.kind(),
        "subject": exp.subject(),
        "description": exp.subject().map(|s| s.describe()),
        "status": exp.status(),
        "start_date": exp.start_date(),
        "duration_days": exp.duration_days(),
        "review_date": exp.review_date(),
        "baseline": exp.baseline(),
        "result": exp.result(),
        "suggestion": exp.suggestion(),
        "verdict": exp.verdict(),
        "note": exp.note(),
        "started_at": exp.started_at(),
        "reviewed_at": exp.reviewed_at(),
        "completed_at": exp.completed_at(),
        "version": exp.version(),
    })
}

pub fn active_experiment_to_json(active: &ActiveExperiment) -> Value {
    let mut v = experiment_to_json(&active.experiment);
    v["days_left"] = json!(active.days_left);
    v["overdue"] = json!(active.overdue);
    v
}

pub fn review_to_json(review: &ExperimentReview) -> Value {
    json!({
        "experiment": experiment_to_json(&review.experiment),
        "result": review.result,
        "deltas": review.deltas,
        "suggested_verdict": review.suggestion.verdict,
        "rollback_recommended": review.suggestion.rollback_recommended,
        "summary": review.suggestion.summary,
    })
}

pub fn decision_to_json(outcome: &DecisionOutcome) -> Value {
    json!({
        "recommendation": recommendation_to_json(&outcome.recommendation),
        "experiment": outcome.experiment.as_ref().map(experiment_to_json),
    })
}

pub fn generation_to_json(report: &GenerationReport) -> Value {
    json!({
        "created": report.created.iter().map(recommendation_to_json).collect::<Vec<_>>(),
        "duplicates": report.duplicates,
        "failed": report.failed,
    })
}

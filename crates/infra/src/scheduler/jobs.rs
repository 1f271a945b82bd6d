//! The daily batch jobs.
//!
//! Each job walks its items one at a time; an item that fails is logged and
//! counted, and the job moves on. A job only fails as a whole when it cannot
//! list its items.

use serde::{Deserialize, Serialize};

use pricepilot_analytics::{AnomalyKind, Urgency, Verdict};

use crate::alerts::{Alert, AlertKind, Severity};
use crate::services::{Engine, EngineResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
    PriceAnalysis,
    ExperimentReview,
    StockAlerts,
    StuckExperiments,
}

impl JobName {
    pub const ALL: [JobName; 4] = [
        JobName::PriceAnalysis,
        JobName::ExperimentReview,
        JobName::StockAlerts,
        JobName::StuckExperiments,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobName::PriceAnalysis => "price_analysis",
            JobName::ExperimentReview => "experiment_review",
            JobName::StockAlerts => "stock_alerts",
            JobName::StuckExperiments => "stuck_experiments",
        }
    }
}

impl core::fmt::Display for JobName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobName::ALL
            .into_iter()
            .find(|j| j.as_str() == s)
            .ok_or_else(|| format!("unknown job '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: JobName,
    /// Items the job acted on (recommendations created, experiments reviewed, alerts raised).
    pub processed: usize,
    pub failed: usize,
}

pub async fn run(job: JobName, engine: &Engine) -> EngineResult<JobReport> {
    match job {
        JobName::PriceAnalysis => price_analysis(engine),
        JobName::ExperimentReview => experiment_review(engine).await,
        JobName::StockAlerts => stock_alerts(engine),
        JobName::StuckExperiments => stuck_experiments(engine),
    }
}

fn price_analysis(engine: &Engine) -> EngineResult<JobReport> {
    let report = engine.generate_recommendations()?;
    if !report.created.is_empty() {
        let lines: Vec<String> = report
            .created
            .iter()
            .map(|r| {
                format!(
                    "{} {} → {} ({})",
                    r.product_name(),
                    r.current_price(),
                    r.recommended_price(),
                    r.change_pct()
                )
            })
            .collect();
        engine.alert(Alert::new(
            AlertKind::RecommendationsReady,
            Severity::Info,
            format!("{} price recommendations awaiting review: {}", lines.len(), lines.join("; ")),
            engine.clock().now(),
        ));
    }
    Ok(JobReport {
        job: JobName::PriceAnalysis,
        processed: report.created.len(),
        failed: report.failed,
    })
}

async fn experiment_review(engine: &Engine) -> EngineResult<JobReport> {
    let mut report = JobReport {
        job: JobName::ExperimentReview,
        processed: 0,
        failed: 0,
    };
    for exp in engine.due_for_review()? {
        let id = exp.id_typed();
        match engine.review_experiment(id).await {
            Ok(review) => {
                let severity = match review.suggestion.verdict {
                    Verdict::Failed => Severity::Warning,
                    _ => Severity::Info,
                };
                let what = exp.subject().map(|s| s.describe()).unwrap_or_default();
                let mut alert = Alert::new(
                    AlertKind::ExperimentDue,
                    severity,
                    format!("{what}: {} ({})", review.suggestion.verdict, review.suggestion.summary),
                    engine.clock().now(),
                )
                .for_experiment(id);
                if let Some(product_id) = exp.subject().and_then(|s| s.product_id()) {
                    alert = alert.for_product(product_id);
                }
                engine.alert(alert);
                report.processed += 1;
            }
            Err(e) => {
                tracing::error!(job = "experiment_review", experiment_id = %id, error = %e, "review failed");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

fn stock_alerts(engine: &Engine) -> EngineResult<JobReport> {
    let now = engine.clock().now();
    let mut processed = 0;

    for f in engine.low_stock(None)? {
        let severity = match f.urgency {
            Urgency::Critical => Severity::Critical,
            _ => Severity::Warning,
        };
        engine.alert(
            Alert::new(
                AlertKind::LowStock,
                severity,
                format!(
                    "{} ({}): {} left, {:.1} days of stock, reorder {}",
                    f.name, f.offer_id, f.current_stock, f.days_remaining, f.reorder_qty
                ),
                now,
            )
            .for_product(f.product_id),
        );
        processed += 1;
    }

    for f in engine.overstock(None)? {
        let runway = if f.days_remaining.is_finite() {
            format!("{:.0} days of stock", f.days_remaining)
        } else {
            "no sales".to_string()
        };
        engine.alert(
            Alert::new(
                AlertKind::Overstock,
                Severity::Info,
                format!("{} ({}): {} on hand, {runway}", f.name, f.offer_id, f.current_stock),
                now,
            )
            .for_product(f.product_id),
        );
        processed += 1;
    }

    for a in engine.sales_anomalies()? {
        let label = match a.anomaly.kind {
            Some(AnomalyKind::Spike) => "spike",
            Some(AnomalyKind::Drop) => "drop",
            None => continue,
        };
        engine.alert(
            Alert::new(
                AlertKind::SalesAnomaly,
                Severity::Warning,
                format!("{} ({}): sales {label}, {}", a.name, a.offer_id, a.anomaly.explanation),
                now,
            )
            .for_product(a.anomaly.product_id),
        );
        processed += 1;
    }

    Ok(JobReport {
        job: JobName::StockAlerts,
        processed,
        failed: 0,
    })
}

fn stuck_experiments(engine: &Engine) -> EngineResult<JobReport> {
    let today = engine.clock().today();
    let stuck = engine.stuck_experiments()?;
    for exp in &stuck {
        let what = exp.subject().map(|s| s.describe()).unwrap_or_default();
        engine.alert(
            Alert::new(
                AlertKind::ExperimentStuck,
                Severity::Warning,
                format!(
                    "{what}: {} days past review date {}, still {}",
                    -exp.days_left(today),
                    exp.review_date(),
                    exp.status()
                ),
                engine.clock().now(),
            )
            .for_experiment(exp.id_typed()),
        );
    }
    Ok(JobReport {
        job: JobName::StuckExperiments,
        processed: stuck.len(),
        failed: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::StartRequest;
    use crate::services::testkit::{day, kit, product};
    use pricepilot_core::{Money, ProductId};
    use pricepilot_experiments::{ContentField, ExperimentSubject};

    #[test]
    fn job_names_round_trip() {
        for job in JobName::ALL {
            assert_eq!(job.as_str().parse::<JobName>().unwrap(), job);
        }
        assert!("nightly".parse::<JobName>().is_err());
    }

    #[tokio::test]
    async fn price_analysis_alerts_once_per_batch() {
        let k = kit();
        k.add_product(product(1, 1350, 500));
        k.set_stock(1, 4);
        k.sell(1, day(14), 30, 2);

        let report = run(JobName::PriceAnalysis, &k.engine).await.unwrap();
        assert_eq!(report.processed, 1);
        let alerts = k.alerts.of_kind(AlertKind::RecommendationsReady);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("1490"));

        let again = run(JobName::PriceAnalysis, &k.engine).await.unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(k.alerts.of_kind(AlertKind::RecommendationsReady).len(), 1);
    }

    #[tokio::test]
    async fn stock_alerts_cover_low_and_over() {
        let k = kit();
        k.add_product(product(1, 100, 50));
        k.add_product(product(2, 100, 50));
        k.set_stock(1, 3);
        k.sell(1, day(14), 30, 1);
        k.set_stock(2, 1000);
        k.sell(2, day(14), 30, 1);

        run(JobName::StockAlerts, &k.engine).await.unwrap();
        let low = k.alerts.of_kind(AlertKind::LowStock);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].severity, Severity::Critical);
        assert_eq!(low[0].product_id, Some(ProductId::new(1)));
        assert_eq!(k.alerts.of_kind(AlertKind::Overstock).len(), 1);
    }

    #[tokio::test]
    async fn review_and_stuck_jobs_follow_the_calendar() {
        let k = kit();
        k.add_product(product(1, 1000, 400));
        k.sell(1, day(14), 14, 10);
        k.engine
            .start_experiment(StartRequest {
                subject: ExperimentSubject::Price {
                    product_id: ProductId::new(1),
                    old_price: Money::from_major(1000),
                    new_price: Money::from_major(950),
                    recommendation_id: None,
                },
                duration_days: Some(3),
                apply_change: false,
            })
            .await
            .unwrap();
        k.engine
            .start_experiment(StartRequest {
                subject: ExperimentSubject::Content {
                    product_id: ProductId::new(1),
                    field: ContentField::Description,
                    old_value: "old".to_string(),
                    new_value: "new".to_string(),
                },
                duration_days: Some(3),
                apply_change: false,
            })
            .await
            .unwrap();

        assert_eq!(run(JobName::ExperimentReview, &k.engine).await.unwrap().processed, 0);

        k.clock.advance_days(3);
        let reviewed = run(JobName::ExperimentReview, &k.engine).await.unwrap();
        assert_eq!(reviewed.processed, 2);
        assert_eq!(k.alerts.of_kind(AlertKind::ExperimentDue).len(), 2);
        // Already reviewing: not picked up again.
        assert_eq!(run(JobName::ExperimentReview, &k.engine).await.unwrap().processed, 0);

        k.clock.advance_days(4);
        let stuck = run(JobName::StuckExperiments, &k.engine).await.unwrap();
        assert_eq!(stuck.processed, 2);
        assert_eq!(k.alerts.of_kind(AlertKind::ExperimentStuck).len(), 2);
    }
}

//! `pricepilot-analytics`
//!
//! **Responsibility:** the deterministic math behind pricing decisions.
//!
//! Everything here is pure: no IO, no clocks, no stores. Callers fetch the
//! inputs (catalog rows, sales totals, metric snapshots) and hand them in.
//! - [`forecast`]: stock runway, urgency and reorder quantities.
//! - [`scoring`]: the up/down pressure score and the recommended price.
//! - [`rounding`]: psychological price endings.
//! - [`verdict`]: experiment outcome classification.
//! - [`anomaly`]: daily sales spike/drop detection.

pub mod anomaly;
pub mod error;
pub mod forecast;
pub mod metrics;
pub mod rounding;
pub mod scoring;
pub mod trend;
pub mod verdict;

pub use anomaly::{AnomalyKind, SalesAnomaly, SalesAnomalyDetector, SalesAnomalyOutcome, detect_sales_anomaly};
pub use error::AnalyticsError;
pub use forecast::{
    ForecastPolicy, InventorySummary, ReorderLine, ReorderPlan, StockForecast, Urgency, forecast,
    low_stock, overstock, reorder_plan, summarize,
};
pub use metrics::{MetricDeltas, MetricSet};
pub use rounding::{psychological_ceil, psychological_round};
pub use scoring::{
    Direction, Factor, PriceAnalysis, PriceProposal, ScoreCard, ScoringPolicy, Signal, propose, score,
};
pub use trend::{SalesTrend, trend_pct};
pub use verdict::{ExperimentKind, Verdict, VerdictPolicy, VerdictProposal, verdict};

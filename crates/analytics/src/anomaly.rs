use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pricepilot_catalog::{DateRange, SalesAggregate};
use pricepilot_core::ProductId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    Spike,
    Drop,
}

/// Evaluation of the last full day against the trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesAnomaly {
    pub product_id: ProductId,
    pub day: NaiveDate,
    pub quantity: i64,
    pub mean: f64,
    pub std_dev: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// `None` when the day is within bounds.
    pub kind: Option<AnomalyKind>,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SalesAnomalyOutcome {
    /// Too few days with sales rows to build a baseline. Expected for new products.
    InsufficientData { days_with_data: usize, required: usize },
    Evaluated(SalesAnomaly),
}

impl SalesAnomalyOutcome {
    pub fn anomaly(&self) -> Option<&SalesAnomaly> {
        match self {
            SalesAnomalyOutcome::Evaluated(a) if a.kind.is_some() => Some(a),
            _ => None,
        }
    }
}

/// Flags the last full day when it falls outside `mean ± sigma·stddev`.
///
/// Model:
/// - Take the sales rows inside the trailing window ending on `last_full_day`.
/// - Mean and sample standard deviation over the rows that exist (days with
///   no row are not zero-filled).
/// - Compare the last day's quantity against the bounds.
#[derive(Debug, Clone)]
pub struct SalesAnomalyDetector<'a> {
    product_id: ProductId,
    rows: &'a [SalesAggregate],
    last_full_day: NaiveDate,
    window_days: u32,
    min_days: usize,
    sigma: f64,
}

impl<'a> SalesAnomalyDetector<'a> {
    pub fn new(product_id: ProductId, rows: &'a [SalesAggregate], last_full_day: NaiveDate) -> Self {
        Self {
            product_id,
            rows,
            last_full_day,
            window_days: 30,
            min_days: 7,
            sigma: 2.0,
        }
    }

    pub fn with_window(mut self, window_days: u32) -> Self {
        self.window_days = window_days;
        self
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn run(&self) -> SalesAnomalyOutcome {
        let range = DateRange::trailing(self.last_full_day, self.window_days);
        let in_window: Vec<&SalesAggregate> = self
            .rows
            .iter()
            .filter(|r| r.product_id == self.product_id && range.contains(r.date))
            .collect();

        if in_window.len() < self.min_days {
            return SalesAnomalyOutcome::InsufficientData {
                days_with_data: in_window.len(),
                required: self.min_days,
            };
        }

        let quantities: Vec<f64> = in_window.iter().map(|r| r.quantity as f64).collect();
        let mean = mean(&quantities);
        let std_dev = stddev_sample(&quantities, mean);
        let lower_bound = mean - self.sigma * std_dev;
        let upper_bound = mean + self.sigma * std_dev;

        let day = self.last_full_day;
        let Some(last) = in_window.iter().find(|r| r.date == day) else {
            return SalesAnomalyOutcome::Evaluated(SalesAnomaly {
                product_id: self.product_id,
                day,
                quantity: 0,
                mean,
                std_dev,
                lower_bound,
                upper_bound,
                kind: None,
                explanation: format!("no sales row for {day}"),
            });
        };

        let qty = last.quantity as f64;
        let kind = if qty < lower_bound {
            Some(AnomalyKind::Drop)
        } else if qty > upper_bound {
            Some(AnomalyKind::Spike)
        } else {
            None
        };
        let explanation = format!(
            "product {} sold {} on {day}; mean={mean:.2}, std={std_dev:.2}, bounds=[{lower_bound:.2}, {upper_bound:.2}]",
            self.product_id, last.quantity
        );

        SalesAnomalyOutcome::Evaluated(SalesAnomaly {
            product_id: self.product_id,
            day,
            quantity: last.quantity,
            mean,
            std_dev,
            lower_bound,
            upper_bound,
            kind,
            explanation,
        })
    }
}

/// Detect with the default 30-day window and 2σ bounds.
pub fn detect_sales_anomaly(product_id: ProductId, rows: &[SalesAggregate], last_full_day: NaiveDate) -> SalesAnomalyOutcome {
    SalesAnomalyDetector::new(product_id, rows, last_full_day).run()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

/// Sample standard deviation (n-1).
fn stddev_sample(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let var = xs
        .iter()
        .map(|x| {
            let d = x - mean;
            d * d
        })
        .sum::<f64>()
        / ((xs.len() - 1) as f64);
    var.sqrt()
}

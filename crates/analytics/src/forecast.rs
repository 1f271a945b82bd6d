//! Stock runway forecasting.
//!
//! Model:
//! - velocity = units sold over the trailing window / window length;
//! - days remaining = stock / velocity, or +∞ when nothing sold;
//! - reorder covers `target_days + lead_time_days` of velocity, minus stock on hand.

use serde::{Deserialize, Serialize};

use pricepilot_catalog::Product;
use pricepilot_core::{Money, ProductId};

use crate::error::AnalyticsError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastPolicy {
    /// Trailing sales window used for velocity, in days.
    pub window_days: u32,
    /// Inventory horizon a reorder should cover.
    pub target_days: u32,
    /// Supplier lead time; its sales are held as safety stock.
    pub lead_time_days: u32,
    pub critical_days: f64,
    pub warning_days: f64,
    pub overstock_days: f64,
}

impl Default for ForecastPolicy {
    fn default() -> Self {
        Self {
            window_days: 30,
            target_days: 30,
            lead_time_days: 14,
            critical_days: 7.0,
            warning_days: 14.0,
            overstock_days: 90.0,
        }
    }
}

impl ForecastPolicy {
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.window_days == 0 {
            return Err(AnalyticsError::invalid_policy("forecast window_days must be >= 1"));
        }
        if !(self.critical_days > 0.0 && self.critical_days < self.warning_days) {
            return Err(AnalyticsError::invalid_policy(
                "forecast thresholds must satisfy 0 < critical_days < warning_days",
            ));
        }
        if !(self.overstock_days.is_finite() && self.overstock_days > self.warning_days) {
            return Err(AnalyticsError::invalid_policy(
                "overstock_days must be finite and above warning_days",
            ));
        }
        Ok(())
    }

    pub fn urgency(&self, days_remaining: f64) -> Urgency {
        if days_remaining < self.critical_days {
            Urgency::Critical
        } else if days_remaining < self.warning_days {
            Urgency::Warning
        } else {
            Urgency::Normal
        }
    }
}

/// Stock runway tier. Ordered from most to least urgent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Critical,
    Warning,
    Normal,
}

impl core::fmt::Display for Urgency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Urgency::Critical => "critical",
            Urgency::Warning => "warning",
            Urgency::Normal => "normal",
        })
    }
}

impl core::str::FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Urgency::Critical),
            "warning" => Ok(Urgency::Warning),
            "normal" => Ok(Urgency::Normal),
            other => Err(format!("unknown urgency '{other}'")),
        }
    }
}

/// Derived stock view for one product. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockForecast {
    pub product_id: ProductId,
    pub offer_id: String,
    pub name: String,
    pub current_stock: i64,
    pub avg_daily_sales: f64,
    /// `f64::INFINITY` when velocity is zero; `null` on the wire.
    #[serde(with = "days_serde")]
    pub days_remaining: f64,
    pub urgency: Urgency,
    pub reorder_qty: i64,
    pub target_days: u32,
    pub lead_time_days: u32,
}

impl StockForecast {
    /// Units needed to cover the target horizon plus lead-time safety stock.
    pub fn target_stock(&self) -> f64 {
        target_stock(self.avg_daily_sales, self.target_days, self.lead_time_days)
    }

    pub fn is_unbounded(&self) -> bool {
        self.days_remaining.is_infinite()
    }
}

fn target_stock(avg: f64, target_days: u32, lead_time_days: u32) -> f64 {
    avg * f64::from(target_days) + avg * f64::from(lead_time_days)
}

/// Forecast one product from its current stock and units sold over `policy.window_days`.
pub fn forecast(product: &Product, current_stock: i64, sold_in_window: i64, policy: &ForecastPolicy) -> StockForecast {
    let window = f64::from(policy.window_days.max(1));
    let avg_daily_sales = (sold_in_window.max(0) as f64) / window;

    let days_remaining = if avg_daily_sales > 0.0 {
        (current_stock.max(0) as f64) / avg_daily_sales
    } else {
        f64::INFINITY
    };

    let shortfall = target_stock(avg_daily_sales, policy.target_days, policy.lead_time_days) - current_stock as f64;
    let reorder_qty = if shortfall > 0.0 { shortfall.ceil() as i64 } else { 0 };

    StockForecast {
        product_id: product.id,
        offer_id: product.offer_id.clone(),
        name: product.name.clone(),
        current_stock,
        avg_daily_sales,
        days_remaining,
        urgency: policy.urgency(days_remaining),
        reorder_qty,
        target_days: policy.target_days,
        lead_time_days: policy.lead_time_days,
    }
}

/// Critical and warning forecasts (optionally a single tier), most urgent first.
pub fn low_stock(forecasts: impl IntoIterator<Item = StockForecast>, filter: Option<Urgency>) -> Vec<StockForecast> {
    let mut out: Vec<StockForecast> = forecasts
        .into_iter()
        .filter(|f| matches!(f.urgency, Urgency::Critical | Urgency::Warning))
        .filter(|f| filter.is_none_or(|u| f.urgency == u))
        .collect();
    out.sort_by(|a, b| a.days_remaining.total_cmp(&b.days_remaining));
    out
}

/// Forecasts with more than `threshold_days` of runway, largest first.
///
/// Products with nothing on hand are never overstocked, whatever their velocity.
pub fn overstock(forecasts: impl IntoIterator<Item = StockForecast>, threshold_days: f64) -> Vec<StockForecast> {
    let mut out: Vec<StockForecast> = forecasts
        .into_iter()
        .filter(|f| f.current_stock > 0 && f.days_remaining > threshold_days)
        .collect();
    out.sort_by(|a, b| b.days_remaining.total_cmp(&a.days_remaining));
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_products: usize,
    pub critical_count: usize,
    pub warning_count: usize,
    pub normal_count: usize,
    pub overstock_count: usize,
    /// Σ cost_price × current_stock.
    pub inventory_value: Money,
    /// Velocity-weighted mean of days remaining; `None` when nothing is selling.
    pub avg_days_of_inventory: Option<f64>,
}

/// Aggregate `(forecast, unit cost)` pairs into a health summary.
pub fn summarize<'a>(
    items: impl IntoIterator<Item = (&'a StockForecast, Money)>,
    policy: &ForecastPolicy,
) -> InventorySummary {
    let mut summary = InventorySummary {
        total_products: 0,
        critical_count: 0,
        warning_count: 0,
        normal_count: 0,
        overstock_count: 0,
        inventory_value: Money::ZERO,
        avg_days_of_inventory: None,
    };
    let mut weighted_days = 0.0;
    let mut total_velocity = 0.0;

    for (f, unit_cost) in items {
        summary.total_products += 1;
        match f.urgency {
            Urgency::Critical => summary.critical_count += 1,
            Urgency::Warning => summary.warning_count += 1,
            Urgency::Normal => summary.normal_count += 1,
        }
        if f.current_stock > 0 && f.days_remaining > policy.overstock_days {
            summary.overstock_count += 1;
        }
        summary.inventory_value = summary
            .inventory_value
            .saturating_add(unit_cost.saturating_mul(f.current_stock.max(0)));

        if f.days_remaining.is_finite() {
            weighted_days += f.days_remaining * f.avg_daily_sales;
            total_velocity += f.avg_daily_sales;
        }
    }

    if total_velocity > 0.0 {
        summary.avg_days_of_inventory = Some(weighted_days / total_velocity);
    }
    summary
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderLine {
    pub forecast: StockForecast,
    pub order_qty: i64,
    pub estimated_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderPlan {
    pub lines: Vec<ReorderLine>,
    pub total_cost: Money,
    /// Lines left out because they did not fit the budget.
    pub skipped_over_budget: usize,
}

/// Build purchase lines for low-stock products, most urgent first.
///
/// With a budget, a line that would exceed it is skipped and the scan continues,
/// so cheaper lines further down may still fit.
pub fn reorder_plan<'a>(
    low_stock: impl IntoIterator<Item = (&'a StockForecast, Money)>,
    max_total_cost: Option<Money>,
) -> ReorderPlan {
    let mut plan = ReorderPlan {
        lines: Vec::new(),
        total_cost: Money::ZERO,
        skipped_over_budget: 0,
    };
    for (f, unit_cost) in low_stock {
        if f.reorder_qty <= 0 {
            continue;
        }
        let estimated_cost = unit_cost.saturating_mul(f.reorder_qty);
        if let Some(budget) = max_total_cost {
            if plan.total_cost.saturating_add(estimated_cost) > budget {
                plan.skipped_over_budget += 1;
                continue;
            }
        }
        plan.total_cost = plan.total_cost.saturating_add(estimated_cost);
        plan.lines.push(ReorderLine {
            forecast: f.clone(),
            order_qty: f.reorder_qty,
            estimated_cost,
        });
    }
    plan
}

pub(crate) mod days_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(days: &f64, s: S) -> Result<S::Ok, S::Error> {
        if days.is_finite() {
            s.serialize_some(days)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}

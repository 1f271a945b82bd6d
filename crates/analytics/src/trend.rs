use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pricepilot_catalog::{DateRange, SalesAggregate, SalesTotals};
use pricepilot_core::{Percent, ProductId};

/// Percent change of `recent` over `previous`; 0 when `previous` is 0.
pub fn trend_pct(recent: i64, previous: i64) -> f64 {
    if previous <= 0 {
        return 0.0;
    }
    (recent - previous) as f64 / previous as f64 * 100.0
}

/// Recent window vs the window of equal length right before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesTrend {
    pub product_id: ProductId,
    pub recent: DateRange,
    pub recent_totals: SalesTotals,
    pub previous_totals: SalesTotals,
    pub quantity_change_pct: f64,
    pub revenue_change: Percent,
    pub avg_daily_quantity: f64,
}

impl SalesTrend {
    /// Compare the `window_days` ending on `last_full_day` against the window before it.
    pub fn compute(product_id: ProductId, rows: &[SalesAggregate], last_full_day: NaiveDate, window_days: u32) -> Self {
        let recent = DateRange::trailing(last_full_day, window_days);
        let recent_totals = SalesTotals::over(rows, recent);
        let previous_totals = SalesTotals::over(rows, recent.preceding());
        Self {
            product_id,
            recent,
            recent_totals,
            previous_totals,
            quantity_change_pct: trend_pct(recent_totals.quantity, previous_totals.quantity),
            revenue_change: Percent::change(previous_totals.revenue, recent_totals.revenue),
            avg_daily_quantity: recent_totals.daily_average(recent.days()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricepilot_core::Money;

    fn row(day: u32, qty: i64) -> SalesAggregate {
        SalesAggregate {
            product_id: ProductId::new(1),
            date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            quantity: qty,
            revenue: Money::from_major(10 * qty),
            returns_qty: 0,
            returns_amount: Money::ZERO,
        }
    }

    #[test]
    fn zero_previous_period_is_flat() {
        assert_eq!(trend_pct(10, 0), 0.0);
        assert_eq!(trend_pct(5, 10), -50.0);
    }

    #[test]
    fn compares_last_window_with_the_one_before() {
        // previous window 1..=7, recent 8..=14
        let rows = vec![row(2, 10), row(5, 10), row(9, 5), row(14, 5), row(15, 100)];
        let t = SalesTrend::compute(ProductId::new(1), &rows, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap(), 7);
        assert_eq!(t.recent_totals.quantity, 10);
        assert_eq!(t.previous_totals.quantity, 20);
        assert_eq!(t.quantity_change_pct, -50.0);
        assert_eq!(t.revenue_change, Percent::from_whole(-50));
    }
}

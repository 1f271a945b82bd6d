use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pricepilot_core::{Money, ProductId};

use crate::range::DateRange;

/// Daily sales row for one product. At most one exists per (product, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesAggregate {
    pub product_id: ProductId,
    pub date: NaiveDate,
    pub quantity: i64,
    pub revenue: Money,
    #[serde(default)]
    pub returns_qty: i64,
    #[serde(default)]
    pub returns_amount: Money,
}

/// Quantity and revenue summed over a window.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesTotals {
    pub quantity: i64,
    pub revenue: Money,
}

impl SalesTotals {
    /// Sum the rows that fall inside `range`.
    pub fn over<'a>(rows: impl IntoIterator<Item = &'a SalesAggregate>, range: DateRange) -> Self {
        rows.into_iter()
            .filter(|r| range.contains(r.date))
            .fold(Self::default(), |acc, r| Self {
                quantity: acc.quantity + r.quantity,
                revenue: acc.revenue.saturating_add(r.revenue),
            })
    }

    /// Average units per day over `days`; zero for an empty window.
    pub fn daily_average(&self, days: u32) -> f64 {
        if days == 0 {
            return 0.0;
        }
        self.quantity as f64 / f64::from(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: u32, qty: i64) -> SalesAggregate {
        SalesAggregate {
            product_id: ProductId::new(1),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            quantity: qty,
            revenue: Money::from_major(100 * qty),
            returns_qty: 0,
            returns_amount: Money::ZERO,
        }
    }

    #[test]
    fn totals_only_count_rows_in_range() {
        let rows = vec![row(1, 5), row(2, 3), row(10, 7)];
        let range = DateRange::trailing(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(), 7);
        let t = SalesTotals::over(&rows, range);
        assert_eq!(t.quantity, 8);
        assert_eq!(t.revenue, Money::from_major(800));
        assert!((t.daily_average(range.days()) - 8.0 / 7.0).abs() < 1e-9);
    }
}

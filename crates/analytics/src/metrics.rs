//! The one metric record every experiment kind is measured with.
//!
//! Adapters map their source fields onto this shape. A field that the source
//! could not provide stays `None` ("unavailable"), never zero.

use serde::{Deserialize, Serialize};

use pricepilot_catalog::SalesTotals;
use pricepilot_core::{Money, Percent};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSet {
    pub orders: Option<i64>,
    pub revenue: Option<Money>,
    pub views: Option<i64>,
    pub clicks: Option<i64>,
    pub add_to_cart: Option<i64>,
    pub spend: Option<Money>,
}

impl MetricSet {
    /// Orders and revenue from the local sales rows.
    pub fn from_sales(totals: SalesTotals) -> Self {
        Self {
            orders: Some(totals.quantity),
            revenue: Some(totals.revenue),
            ..Self::default()
        }
    }

    /// Overlay the fields `other` has onto `self`.
    pub fn merged_with(self, other: MetricSet) -> Self {
        Self {
            orders: other.orders.or(self.orders),
            revenue: other.revenue.or(self.revenue),
            views: other.views.or(self.views),
            clicks: other.clicks.or(self.clicks),
            add_to_cart: other.add_to_cart.or(self.add_to_cart),
            spend: other.spend.or(self.spend),
        }
    }

    /// Spend per click in minor units.
    pub fn cost_per_click(&self) -> Option<f64> {
        match (self.spend, self.clicks) {
            (Some(spend), Some(clicks)) if clicks > 0 => Some(spend.minor() as f64 / clicks as f64),
            _ => None,
        }
    }

    /// Views needed per add-to-cart (inverse conversion, lower is better).
    pub fn views_per_cart(&self) -> Option<f64> {
        match (self.views, self.add_to_cart) {
            (Some(views), Some(carts)) if carts > 0 => Some(views as f64 / carts as f64),
            _ => None,
        }
    }

    pub fn conversion_pct(&self) -> Option<f64> {
        match (self.views, self.add_to_cart) {
            (Some(views), Some(carts)) if views > 0 => Some(carts as f64 / views as f64 * 100.0),
            _ => None,
        }
    }
}

/// Percent change per tracked metric; `None` where either side is unavailable
/// or the baseline is zero.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDeltas {
    pub orders: Option<Percent>,
    pub revenue: Option<Percent>,
    pub views: Option<Percent>,
    pub clicks: Option<Percent>,
    pub add_to_cart: Option<Percent>,
    pub spend: Option<Percent>,
}

impl MetricDeltas {
    pub fn between(baseline: &MetricSet, result: &MetricSet) -> Self {
        fn count(b: Option<i64>, r: Option<i64>) -> Option<Percent> {
            Percent::between(b?, r?)
        }
        fn money(b: Option<Money>, r: Option<Money>) -> Option<Percent> {
            Percent::between(b?.minor(), r?.minor())
        }
        Self {
            orders: count(baseline.orders, result.orders),
            revenue: money(baseline.revenue, result.revenue),
            views: count(baseline.views, result.views),
            clicks: count(baseline.clicks, result.clicks),
            add_to_cart: count(baseline.add_to_cart, result.add_to_cart),
            spend: money(baseline.spend, result.spend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_skip_unavailable_and_zero_baselines() {
        let baseline = MetricSet {
            orders: Some(10),
            revenue: Some(Money::from_major(1000)),
            views: None,
            clicks: Some(0),
            ..MetricSet::default()
        };
        let result = MetricSet {
            orders: Some(12),
            revenue: Some(Money::from_major(900)),
            views: Some(500),
            clicks: Some(40),
            ..MetricSet::default()
        };
        let d = MetricDeltas::between(&baseline, &result);
        assert_eq!(d.orders, Some(Percent::from_whole(20)));
        assert_eq!(d.revenue, Some(Percent::from_whole(-10)));
        assert_eq!(d.views, None);
        assert_eq!(d.clicks, None);
    }

    #[test]
    fn ratios_need_a_positive_denominator() {
        let m = MetricSet {
            clicks: Some(0),
            spend: Some(Money::from_major(10)),
            views: Some(100),
            add_to_cart: Some(4),
            ..MetricSet::default()
        };
        assert_eq!(m.cost_per_click(), None);
        assert_eq!(m.views_per_cart(), Some(25.0));
        assert_eq!(m.conversion_pct(), Some(4.0));
    }

    #[test]
    fn merge_prefers_fields_present_in_overlay() {
        let sales = MetricSet::from_sales(SalesTotals { quantity: 5, revenue: Money::from_major(50) });
        let ads = MetricSet { clicks: Some(9), orders: Some(3), ..MetricSet::default() };
        let m = sales.merged_with(ads);
        assert_eq!(m.orders, Some(3));
        assert_eq!(m.revenue, Some(Money::from_major(50)));
        assert_eq!(m.clicks, Some(9));
    }
}

//! Inventory forecasting over the catalog store.

use serde::{Deserialize, Serialize};

use pricepilot_analytics::{
    self as analytics, InventorySummary, ReorderPlan, SalesAnomaly, SalesAnomalyOutcome, SalesTrend, StockForecast,
    Urgency,
};
use pricepilot_catalog::{DateRange, Product};
use pricepilot_core::{Money, ProductId};

use super::{Engine, EngineError, EngineResult};

/// A product whose last full day of sales fell outside its usual band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAnomaly {
    pub offer_id: String,
    pub name: String,
    #[serde(flatten)]
    pub anomaly: SalesAnomaly,
}

impl Engine {
    fn require_product(&self, id: ProductId) -> EngineResult<Product> {
        self.catalog()
            .get_product(id)?
            .ok_or_else(|| EngineError::NotFound(format!("product {id}")))
    }

    fn forecast_product(&self, product: &Product) -> EngineResult<StockForecast> {
        let window = DateRange::trailing(self.clock().yesterday(), self.settings().forecast.window_days);
        let sold = self.catalog().sales_totals(product.id, window)?.quantity;
        let stock = self.catalog().current_stock(product.id)?;
        Ok(analytics::forecast(product, stock, sold, &self.settings().forecast))
    }

    /// Stock runway of one product.
    pub fn forecast(&self, id: ProductId) -> EngineResult<StockForecast> {
        let product = self.require_product(id)?;
        self.forecast_product(&product)
    }

    /// Forecasts of every active product with its unit cost, skipping products that fail to load.
    fn forecast_all(&self) -> EngineResult<Vec<(StockForecast, Money)>> {
        let products = self.catalog().list_products(true)?;
        let mut out = Vec::with_capacity(products.len());
        for product in &products {
            match self.forecast_product(product) {
                Ok(f) => out.push((f, product.cost_price)),
                Err(e) => tracing::warn!(product_id = %product.id, error = %e, "forecast skipped"),
            }
        }
        Ok(out)
    }

    /// Critical and warning products, shortest runway first.
    pub fn low_stock(&self, filter: Option<Urgency>) -> EngineResult<Vec<StockForecast>> {
        let all = self.forecast_all()?;
        Ok(analytics::low_stock(all.into_iter().map(|(f, _)| f), filter))
    }

    /// Products whose runway exceeds `threshold_days` (configured overstock horizon by default).
    pub fn overstock(&self, threshold_days: Option<f64>) -> EngineResult<Vec<StockForecast>> {
        let threshold = threshold_days.unwrap_or(self.settings().forecast.overstock_days);
        let all = self.forecast_all()?;
        Ok(analytics::overstock(all.into_iter().map(|(f, _)| f), threshold))
    }

    pub fn inventory_summary(&self) -> EngineResult<InventorySummary> {
        let all = self.forecast_all()?;
        Ok(analytics::summarize(
            all.iter().map(|(f, cost)| (f, *cost)),
            &self.settings().forecast,
        ))
    }

    /// Purchase lines for low-stock products, most urgent first, within an optional budget.
    pub fn reorder_plan(&self, max_total_cost: Option<Money>) -> EngineResult<ReorderPlan> {
        let all = self.forecast_all()?;
        let costs: std::collections::HashMap<ProductId, Money> =
            all.iter().map(|(f, cost)| (f.product_id, *cost)).collect();
        let low = analytics::low_stock(all.into_iter().map(|(f, _)| f), None);
        Ok(analytics::reorder_plan(
            low.iter()
                .map(|f| (f, costs.get(&f.product_id).copied().unwrap_or(Money::ZERO))),
            max_total_cost,
        ))
    }

    /// Recent window against the one before it, both ending on the last full day.
    pub fn sales_trend(&self, id: ProductId, window_days: Option<u32>) -> EngineResult<SalesTrend> {
        self.require_product(id)?;
        let window = window_days.unwrap_or(self.settings().scoring.trend_window_days).max(1);
        let yesterday = self.clock().yesterday();
        let span = DateRange::trailing(yesterday, window.saturating_mul(2));
        let rows = self.catalog().sales_rows(id, span)?;
        Ok(SalesTrend::compute(id, &rows, yesterday, window))
    }

    pub fn sales_anomaly(&self, id: ProductId) -> EngineResult<SalesAnomalyOutcome> {
        self.require_product(id)?;
        let yesterday = self.clock().yesterday();
        let rows = self
            .catalog()
            .sales_rows(id, DateRange::trailing(yesterday, self.settings().forecast.window_days))?;
        Ok(analytics::detect_sales_anomaly(id, &rows, yesterday))
    }

    /// Every active product whose last full day is a spike or a drop.
    pub fn sales_anomalies(&self) -> EngineResult<Vec<ProductAnomaly>> {
        let mut out = Vec::new();
        for product in self.catalog().list_products(true)? {
            match self.sales_anomaly(product.id) {
                Ok(outcome) => {
                    if let Some(anomaly) = outcome.anomaly() {
                        out.push(ProductAnomaly {
                            offer_id: product.offer_id.clone(),
                            name: product.name.clone(),
                            anomaly: anomaly.clone(),
                        });
                    }
                }
                Err(e) => tracing::warn!(product_id = %product.id, error = %e, "anomaly check skipped"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testkit::{day, kit, product};
    use super::*;

    #[test]
    fn forecast_uses_window_ending_yesterday() {
        let k = kit();
        k.add_product(product(1, 100, 50));
        k.set_stock(1, 30);
        k.sell(1, day(14), 30, 2);
        // Today's partial row must not count.
        k.sell(1, day(15), 1, 100);

        let f = k.engine.forecast(ProductId::new(1)).unwrap();
        assert_eq!(f.avg_daily_sales, 2.0);
        assert_eq!(f.days_remaining, 15.0);
        assert_eq!(f.urgency, Urgency::Normal);
    }

    #[test]
    fn missing_product_is_not_found() {
        let k = kit();
        assert!(matches!(
            k.engine.forecast(ProductId::new(9)),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn low_stock_and_overstock_split_the_catalog() {
        let k = kit();
        for id in 1..=3 {
            k.add_product(product(id, 100, 50));
        }
        k.set_stock(1, 6);
        k.sell(1, day(14), 30, 1); // 6 days
        k.set_stock(2, 500);
        k.sell(2, day(14), 30, 1); // 500 days
        k.set_stock(3, 20);
        k.sell(3, day(14), 30, 1); // 20 days

        let low = k.engine.low_stock(None).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].urgency, Urgency::Critical);

        let over = k.engine.overstock(None).unwrap();
        assert_eq!(over.iter().map(|f| f.product_id.get()).collect::<Vec<_>>(), vec![2]);

        let summary = k.engine.inventory_summary().unwrap();
        assert_eq!(summary.total_products, 3);
        assert_eq!(summary.critical_count, 1);
        assert_eq!(summary.overstock_count, 1);
        assert_eq!(summary.inventory_value, Money::from_major(50 * 526));
    }

    #[test]
    fn reorder_plan_respects_budget() {
        let k = kit();
        k.add_product(product(1, 100, 50));
        k.add_product(product(2, 100, 10));
        k.set_stock(1, 0);
        k.sell(1, day(14), 30, 10);
        k.set_stock(2, 0);
        k.sell(2, day(14), 30, 1);

        let unbounded = k.engine.reorder_plan(None).unwrap();
        assert_eq!(unbounded.lines.len(), 2);

        // Product 1 needs 440 units at 50; only product 2 (44 units at 10) fits.
        let tight = k.engine.reorder_plan(Some(Money::from_major(1000))).unwrap();
        assert_eq!(tight.lines.len(), 1);
        assert_eq!(tight.lines[0].forecast.product_id, ProductId::new(2));
        assert_eq!(tight.skipped_over_budget, 1);
        assert!(tight.total_cost <= Money::from_major(1000));
    }

    #[test]
    fn trend_and_anomaly_read_the_last_full_day() {
        let k = kit();
        k.add_product(product(1, 100, 50));
        k.sell(1, day(13), 13, 4);
        k.sell(1, day(14), 1, 40);

        let trend = k.engine.sales_trend(ProductId::new(1), Some(7)).unwrap();
        assert_eq!(trend.recent_totals.quantity, 6 * 4 + 40);
        assert_eq!(trend.previous_totals.quantity, 7 * 4);

        let anomalies = k.engine.sales_anomalies().unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].anomaly.kind, Some(analytics::AnomalyKind::Spike));
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;

use pricepilot_catalog::{DateRange, InventorySnapshot, Product, SalesAggregate, SalesTotals, current_stock};
use pricepilot_core::{Money, ProductId};

use super::StoreError;

/// Catalog rows owned by the marketplace sync collaborator.
///
/// The engine reads everything here and writes only `Product::price`.
pub trait CatalogStore: Send + Sync {
    /// Insert or replace a product.
    fn upsert_product(&self, product: Product) -> Result<(), StoreError>;

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Products ordered by id.
    fn list_products(&self, active_only: bool) -> Result<Vec<Product>, StoreError>;

    /// Set the live price; returns the product as it was before.
    fn set_price(&self, id: ProductId, price: Money) -> Result<Product, StoreError>;

    /// Insert or replace the row for `(product_id, date)`.
    fn upsert_sales(&self, row: SalesAggregate) -> Result<(), StoreError>;

    /// Rows for one product inside `range`, ordered by date.
    fn sales_rows(&self, id: ProductId, range: DateRange) -> Result<Vec<SalesAggregate>, StoreError>;

    fn sales_totals(&self, id: ProductId, range: DateRange) -> Result<SalesTotals, StoreError> {
        Ok(SalesTotals::over(&self.sales_rows(id, range)?, range))
    }

    /// Insert or replace the snapshot for `(product_id, warehouse, snapshot_date)`.
    fn record_stock(&self, snapshot: InventorySnapshot) -> Result<(), StoreError>;

    /// Sum across warehouses on the latest snapshot day; 0 without snapshots.
    fn current_stock(&self, id: ProductId) -> Result<i64, StoreError>;
}

impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        (**self).upsert_product(product)
    }

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id)
    }

    fn list_products(&self, active_only: bool) -> Result<Vec<Product>, StoreError> {
        (**self).list_products(active_only)
    }

    fn set_price(&self, id: ProductId, price: Money) -> Result<Product, StoreError> {
        (**self).set_price(id, price)
    }

    fn upsert_sales(&self, row: SalesAggregate) -> Result<(), StoreError> {
        (**self).upsert_sales(row)
    }

    fn sales_rows(&self, id: ProductId, range: DateRange) -> Result<Vec<SalesAggregate>, StoreError> {
        (**self).sales_rows(id, range)
    }

    fn record_stock(&self, snapshot: InventorySnapshot) -> Result<(), StoreError> {
        (**self).record_stock(snapshot)
    }

    fn current_stock(&self, id: ProductId) -> Result<i64, StoreError> {
        (**self).current_stock(id)
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    products: BTreeMap<ProductId, Product>,
    sales: HashMap<ProductId, BTreeMap<NaiveDate, SalesAggregate>>,
    stock: HashMap<ProductId, BTreeMap<(NaiveDate, String), InventorySnapshot>>,
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<CatalogState>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogStore for InMemoryCatalogStore {
    fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        state.products.insert(product.id, product);
        Ok(())
    }

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state.products.get(&id).cloned())
    }

    fn list_products(&self, active_only: bool) -> Result<Vec<Product>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state
            .products
            .values()
            .filter(|p| !active_only || p.active)
            .cloned()
            .collect())
    }

    fn set_price(&self, id: ProductId, price: Money) -> Result<Product, StoreError> {
        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))?;
        let before = product.clone();
        product.price = price;
        Ok(before)
    }

    fn upsert_sales(&self, row: SalesAggregate) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        state.sales.entry(row.product_id).or_default().insert(row.date, row);
        Ok(())
    }

    fn sales_rows(&self, id: ProductId, range: DateRange) -> Result<Vec<SalesAggregate>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state
            .sales
            .get(&id)
            .map(|rows| rows.range(range.start()..=range.end()).map(|(_, r)| r.clone()).collect())
            .unwrap_or_default())
    }

    fn record_stock(&self, snapshot: InventorySnapshot) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| StoreError::poisoned())?;
        state
            .stock
            .entry(snapshot.product_id)
            .or_default()
            .insert((snapshot.snapshot_date, snapshot.warehouse.clone()), snapshot);
        Ok(())
    }

    fn current_stock(&self, id: ProductId) -> Result<i64, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(state.stock.get(&id).map(|s| current_stock(s.values())).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    fn product(id: i64) -> Product {
        Product::new(ProductId::new(id), format!("SKU-{id}"), "Mug", Money::from_major(500), Money::from_major(200))
            .unwrap()
    }

    fn sale(day: u32, qty: i64) -> SalesAggregate {
        SalesAggregate {
            product_id: ProductId::new(1),
            date: d(day),
            quantity: qty,
            revenue: Money::from_major(500 * qty),
            returns_qty: 0,
            returns_amount: Money::ZERO,
        }
    }

    #[test]
    fn sales_rows_upsert_per_day() {
        let store = InMemoryCatalogStore::new();
        store.upsert_sales(sale(1, 3)).unwrap();
        store.upsert_sales(sale(1, 5)).unwrap();
        store.upsert_sales(sale(2, 1)).unwrap();
        let range = DateRange::new(d(1), d(2)).unwrap();
        let totals = store.sales_totals(ProductId::new(1), range).unwrap();
        assert_eq!(totals.quantity, 6);
        assert_eq!(store.sales_rows(ProductId::new(1), range).unwrap().len(), 2);
    }

    #[test]
    fn current_stock_uses_latest_day_across_warehouses() {
        let store = InMemoryCatalogStore::new();
        for (wh, day, qty) in [("A", 1, 100), ("A", 2, 40), ("B", 2, 15)] {
            store
                .record_stock(InventorySnapshot {
                    product_id: ProductId::new(1),
                    warehouse: wh.to_string(),
                    quantity: qty,
                    reserved: 0,
                    snapshot_date: d(day),
                })
                .unwrap();
        }
        assert_eq!(store.current_stock(ProductId::new(1)).unwrap(), 55);
        assert_eq!(store.current_stock(ProductId::new(2)).unwrap(), 0);
    }

    #[test]
    fn list_products_can_skip_inactive() {
        let store = InMemoryCatalogStore::new();
        store.upsert_product(product(1)).unwrap();
        store.upsert_product(product(2).deactivated()).unwrap();
        assert_eq!(store.list_products(true).unwrap().len(), 1);
        assert_eq!(store.list_products(false).unwrap().len(), 2);
    }

    #[test]
    fn set_price_returns_previous_state() {
        let store = InMemoryCatalogStore::new();
        store.upsert_product(product(1)).unwrap();
        let before = store.set_price(ProductId::new(1), Money::from_major(450)).unwrap();
        assert_eq!(before.price, Money::from_major(500));
        assert_eq!(
            store.get_product(ProductId::new(1)).unwrap().unwrap().price,
            Money::from_major(450)
        );
        assert!(matches!(
            store.set_price(ProductId::new(9), Money::from_major(1)),
            Err(StoreError::NotFound(_))
        ));
    }
}

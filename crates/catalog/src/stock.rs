use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pricepilot_core::ProductId;

/// Stock level of one product in one warehouse on one snapshot day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub product_id: ProductId,
    pub warehouse: String,
    pub quantity: i64,
    #[serde(default)]
    pub reserved: i64,
    pub snapshot_date: NaiveDate,
}

/// Sum of quantities across warehouses on the most recent snapshot day.
///
/// Returns 0 when there are no snapshots at all.
pub fn current_stock<'a>(snapshots: impl IntoIterator<Item = &'a InventorySnapshot>) -> i64 {
    let mut latest: Option<NaiveDate> = None;
    let mut total = 0i64;
    for s in snapshots {
        match latest {
            Some(d) if s.snapshot_date < d => {}
            Some(d) if s.snapshot_date == d => total += s.quantity,
            _ => {
                latest = Some(s.snapshot_date);
                total = s.quantity;
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(warehouse: &str, day: u32, qty: i64) -> InventorySnapshot {
        InventorySnapshot {
            product_id: ProductId::new(7),
            warehouse: warehouse.to_string(),
            quantity: qty,
            reserved: 0,
            snapshot_date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
        }
    }

    #[test]
    fn sums_warehouses_on_latest_day_only() {
        let snaps = vec![snap("A", 1, 100), snap("A", 2, 10), snap("B", 2, 5), snap("B", 1, 50)];
        assert_eq!(current_stock(&snaps), 15);
    }

    #[test]
    fn no_snapshots_means_zero_stock() {
        assert_eq!(current_stock(&Vec::<InventorySnapshot>::new()), 0);
    }
}

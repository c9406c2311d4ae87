//! Weighted-average cost recomputation.

use tradebook_core::div_round;

/// The quantity/cost pool a variant's average is blended over.
///
/// Seeded from the pre-movement snapshot (on-hand sum + stored `avg_cost`)
/// read in the same transaction as the writes that follow. Purchases blend
/// stock in at the purchase cost; supplier returns blend stock out at the
/// original cost, removing both quantity and cost from the pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CostPool {
    pub quantity: i64,
    pub avg_cost: i64,
}

impl CostPool {
    pub fn new(quantity: i64, avg_cost: i64) -> Self {
        Self { quantity, avg_cost }
    }

    /// Blend `delta_qty` units at `unit_cost` into the pool (negative to
    /// remove). When the pool empties exactly, the average resets to the
    /// unit cost of the last movement.
    pub fn blend(&mut self, delta_qty: i64, unit_cost: i64) {
        let new_qty = self.quantity + delta_qty;
        debug_assert!(new_qty >= 0, "cost pool cannot go negative");
        if new_qty == 0 {
            self.avg_cost = unit_cost;
        } else {
            let numerator = self.quantity as i128 * self.avg_cost as i128
                + delta_qty as i128 * unit_cost as i128;
            self.avg_cost = div_round(numerator, new_qty as i128);
        }
        self.quantity = new_qty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn worked_example_from_two_purchases() {
        let mut pool = CostPool::new(0, 0);
        pool.blend(10, 1_000);
        assert_eq!(pool.avg_cost, 1_000);
        assert_eq!(pool.quantity, 10);

        pool.blend(5, 2_000);
        // round((10*1000 + 5*2000) / 15) = round(20000/15) = 1333
        assert_eq!(pool.avg_cost, 1_333);
        assert_eq!(pool.quantity, 15);
    }

    #[test]
    fn emptying_the_pool_resets_to_unit_cost() {
        let mut pool = CostPool::new(0, 0);
        pool.blend(4, 1_000);
        pool.blend(-4, 1_000);
        assert_eq!(pool.quantity, 0);
        assert_eq!(pool.avg_cost, 1_000);
    }

    #[test]
    fn supplier_return_removes_cost_from_the_pool() {
        let mut pool = CostPool::new(0, 0);
        pool.blend(10, 1_000);
        pool.blend(5, 2_000); // avg 1333, qty 15
        pool.blend(-5, 2_000); // return the expensive batch
        // round((15*1333 - 5*2000) / 10) = round(9995/10) = 1000 (rounded)
        assert_eq!(pool.quantity, 10);
        assert_eq!(pool.avg_cost, 1_000);
    }

    proptest! {
        /// Blending purchases only, the average stays within the min/max of
        /// the contributing unit costs.
        #[test]
        fn average_bounded_by_contributing_costs(
            batches in prop::collection::vec((1i64..10_000i64, 1i64..1_000_000i64), 1..12)
        ) {
            let mut pool = CostPool::new(0, 0);
            let mut lo = i64::MAX;
            let mut hi = i64::MIN;
            for (qty, cost) in batches {
                lo = lo.min(cost);
                hi = hi.max(cost);
                pool.blend(qty, cost);
            }
            prop_assert!(pool.avg_cost >= lo - 1 && pool.avg_cost <= hi + 1);
        }
    }
}

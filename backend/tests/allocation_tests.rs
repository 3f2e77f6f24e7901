//! Stock allocation tests
//!
//! Tests for the allocation planner:
//! - Conservation: planned takes add up to the demand and never exceed stock
//! - Atomicity on shortfall: insufficient total stock plans nothing
//! - FEFO ordering: soonest-to-expire batches are exhausted first

use chrono::NaiveDate;
use proptest::prelude::*;
use uuid::Uuid;

use retail_stock_backend::error::AppError;
use retail_stock_backend::services::allocation::{
    plan_allocation, plan_from_batch, BatchAvailability,
};

fn batch(qty: i32, expiry: Option<&str>) -> BatchAvailability {
    BatchAvailability {
        batch_id: Uuid::new_v4(),
        invent_quantity: qty,
        expired_at: expiry.map(|d| d.parse().unwrap()),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// The worked FEFO example: B1(2024-01-01, qty 5), B2(2024-02-01, qty 10),
    /// demand 8 consumes all of B1 and 3 of B2
    #[test]
    fn test_fefo_worked_example() {
        let b1 = batch(5, Some("2024-01-01"));
        let b2 = batch(10, Some("2024-02-01"));

        let plan = plan_allocation(8, &[b1, b2]).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].batch_id, b1.batch_id);
        assert_eq!(plan[0].amount, 5);
        assert_eq!(plan[1].batch_id, b2.batch_id);
        assert_eq!(plan[1].amount, 3);

        // B2 is left with 7
        assert_eq!(b2.invent_quantity - plan[1].amount, 7);
    }

    /// Input order of the snapshots does not matter; expiry order does
    #[test]
    fn test_fefo_independent_of_input_order() {
        let b1 = batch(5, Some("2024-01-01"));
        let b2 = batch(10, Some("2024-02-01"));

        let plan = plan_allocation(8, &[b2, b1]).unwrap();

        assert_eq!(plan[0].batch_id, b1.batch_id);
        assert_eq!(plan[1].batch_id, b2.batch_id);
    }

    /// Batches without an expiry date are consumed after all dated ones
    #[test]
    fn test_undated_batches_consumed_last() {
        let undated = batch(20, None);
        let dated = batch(5, Some("2099-01-01"));

        let plan = plan_allocation(10, &[undated, dated]).unwrap();

        assert_eq!(plan[0].batch_id, dated.batch_id);
        assert_eq!(plan[0].amount, 5);
        assert_eq!(plan[1].batch_id, undated.batch_id);
        assert_eq!(plan[1].amount, 5);
    }

    /// Demand exceeding the total across all batches fails up front
    #[test]
    fn test_insufficient_total_stock() {
        let batches = [batch(3, Some("2024-01-01")), batch(4, Some("2024-03-01"))];
        let err = plan_allocation(10, &batches).unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock(_)));
    }

    /// No batches at all is just the degenerate shortfall
    #[test]
    fn test_no_batches() {
        let err = plan_allocation(1, &[]).unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock(_)));
    }

    /// Exact fit consumes everything without spilling
    #[test]
    fn test_exact_fit() {
        let batches = [batch(3, Some("2024-01-01")), batch(7, Some("2024-02-01"))];
        let plan = plan_allocation(10, &batches).unwrap();
        let total: i32 = plan.iter().map(|a| a.amount).sum();
        assert_eq!(total, 10);
        assert_eq!(plan.len(), 2);
    }

    /// Zero and negative demand are validation failures
    #[test]
    fn test_non_positive_demand() {
        let batches = [batch(10, None)];
        assert!(matches!(
            plan_allocation(0, &batches),
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            plan_allocation(-1, &batches),
            Err(AppError::Validation { .. })
        ));
    }

    /// Explicit batch: overrun fails and plans nothing
    #[test]
    fn test_explicit_batch_overrun() {
        let b1 = batch(5, None);
        let err = plan_from_batch(10, &b1).unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock(_)));
    }

    /// Explicit batch: a fitting demand takes exactly the demand
    #[test]
    fn test_explicit_batch_take() {
        let b1 = batch(5, None);
        let allocation = plan_from_batch(3, &b1).unwrap();
        assert_eq!(allocation.batch_id, b1.batch_id);
        assert_eq!(allocation.amount, 3);
    }

    /// Exhausted batches are skipped even when they expire first
    #[test]
    fn test_empty_batches_skipped() {
        let empty = batch(0, Some("2023-01-01"));
        let live = batch(8, Some("2024-01-01"));

        let plan = plan_allocation(8, &[empty, live]).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].batch_id, live.batch_id);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for a batch snapshot with stock and an optional expiry
    fn batch_strategy() -> impl Strategy<Value = BatchAvailability> {
        (0i32..=500, proptest::option::of(0u32..3650)).prop_map(|(qty, days)| {
            BatchAvailability {
                batch_id: Uuid::new_v4(),
                invent_quantity: qty,
                expired_at: days.map(|d| {
                    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                        + chrono::Duration::days(i64::from(d))
                }),
            }
        })
    }

    fn batches_strategy() -> impl Strategy<Value = Vec<BatchAvailability>> {
        proptest::collection::vec(batch_strategy(), 1..12)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Conservation: a successful plan adds up to exactly the demand,
        /// takes from each batch at most once, and never takes more than a
        /// batch holds
        #[test]
        fn prop_plan_conserves_quantity(batches in batches_strategy(), demand in 1i32..=1000) {
            let total: i64 = batches.iter().map(|b| i64::from(b.invent_quantity)).sum();
            prop_assume!(i64::from(demand) <= total);

            let plan = plan_allocation(demand, &batches).unwrap();

            let planned: i32 = plan.iter().map(|a| a.amount).sum();
            prop_assert_eq!(planned, demand);

            for allocation in &plan {
                let source = batches
                    .iter()
                    .find(|b| b.batch_id == allocation.batch_id)
                    .expect("plan references a known batch");
                prop_assert!(allocation.amount > 0);
                prop_assert!(allocation.amount <= source.invent_quantity);
            }

            let mut ids: Vec<_> = plan.iter().map(|a| a.batch_id).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), plan.len());
        }

        /// Applying the plan leaves every batch non-negative and removes
        /// exactly the demand from the total
        #[test]
        fn prop_applying_plan_never_goes_negative(
            batches in batches_strategy(),
            demand in 1i32..=1000
        ) {
            let total: i64 = batches.iter().map(|b| i64::from(b.invent_quantity)).sum();
            prop_assume!(i64::from(demand) <= total);

            let plan = plan_allocation(demand, &batches).unwrap();

            let mut remaining = batches.clone();
            for allocation in &plan {
                let source = remaining
                    .iter_mut()
                    .find(|b| b.batch_id == allocation.batch_id)
                    .unwrap();
                source.invent_quantity -= allocation.amount;
                prop_assert!(source.invent_quantity >= 0);
            }

            let after: i64 = remaining.iter().map(|b| i64::from(b.invent_quantity)).sum();
            prop_assert_eq!(total - i64::from(demand), after);
        }

        /// Atomicity on shortfall: demand above the total plans nothing
        #[test]
        fn prop_shortfall_plans_nothing(batches in batches_strategy(), extra in 1i32..=100) {
            let total: i64 = batches.iter().map(|b| i64::from(b.invent_quantity)).sum();
            prop_assume!(total + i64::from(extra) <= i64::from(i32::MAX));

            let demand = (total as i32) + extra;
            let result = plan_allocation(demand, &batches);
            prop_assert!(matches!(result, Err(AppError::InsufficientStock(_))));
        }

        /// FEFO: every take is at least as early-expiring as the next one,
        /// with undated stock strictly after dated stock
        #[test]
        fn prop_plan_respects_fefo(batches in batches_strategy(), demand in 1i32..=1000) {
            let total: i64 = batches.iter().map(|b| i64::from(b.invent_quantity)).sum();
            prop_assume!(i64::from(demand) <= total);

            let plan = plan_allocation(demand, &batches).unwrap();

            let expiries: Vec<Option<NaiveDate>> = plan
                .iter()
                .map(|a| {
                    batches
                        .iter()
                        .find(|b| b.batch_id == a.batch_id)
                        .unwrap()
                        .expired_at
                })
                .collect();

            for pair in expiries.windows(2) {
                match (pair[0], pair[1]) {
                    (Some(a), Some(b)) => prop_assert!(a <= b),
                    // Undated after dated, never the reverse
                    (None, Some(_)) => prop_assert!(false, "undated batch taken before dated"),
                    _ => {}
                }
            }
        }

        /// Every batch except possibly the last in the plan is fully drained
        #[test]
        fn prop_partial_take_only_on_last(batches in batches_strategy(), demand in 1i32..=1000) {
            let total: i64 = batches.iter().map(|b| i64::from(b.invent_quantity)).sum();
            prop_assume!(i64::from(demand) <= total);

            let plan = plan_allocation(demand, &batches).unwrap();

            for (i, allocation) in plan.iter().enumerate() {
                let source = batches
                    .iter()
                    .find(|b| b.batch_id == allocation.batch_id)
                    .unwrap();
                if i + 1 < plan.len() {
                    prop_assert_eq!(allocation.amount, source.invent_quantity);
                }
            }
        }

        /// Explicit-batch planning takes all-or-nothing
        #[test]
        fn prop_explicit_batch_all_or_nothing(qty in 0i32..=500, demand in 1i32..=1000) {
            let b = BatchAvailability {
                batch_id: Uuid::new_v4(),
                invent_quantity: qty,
                expired_at: None,
            };

            match plan_from_batch(demand, &b) {
                Ok(allocation) => {
                    prop_assert!(demand <= qty);
                    prop_assert_eq!(allocation.amount, demand);
                }
                Err(err) => {
                    prop_assert!(demand > qty);
                    prop_assert!(matches!(err, AppError::InsufficientStock(_)));
                }
            }
        }
    }
}

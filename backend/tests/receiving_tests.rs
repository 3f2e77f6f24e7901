//! Receiving tests
//!
//! Tests for the receipt lifecycle and the paid-receipt immutability rule:
//! - Draft -> Received -> Paid, with Paid terminal
//! - Writes against a paid receipt (or payloads setting the paid flag) fail
//! - Batch quantity corrections keep 0 <= invent <= inbound

use proptest::prelude::*;

use retail_stock_backend::services::receiving::ensure_receipt_mutable;
use shared::{validate_batch_quantities, ReceiptStatus};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_lifecycle_happy_path() {
        let draft = ReceiptStatus::from_flags(false, false);
        assert_eq!(draft, ReceiptStatus::Draft);
        assert!(draft.can_transition_to(ReceiptStatus::Received));

        let received = ReceiptStatus::from_flags(true, false);
        assert!(received.can_transition_to(ReceiptStatus::Paid));

        let paid = ReceiptStatus::from_flags(true, true);
        assert!(paid.is_terminal());
    }

    #[test]
    fn test_draft_cannot_jump_to_paid() {
        assert!(!ReceiptStatus::Draft.can_transition_to(ReceiptStatus::Paid));
    }

    #[test]
    fn test_no_transition_out_of_paid() {
        for next in [
            ReceiptStatus::Draft,
            ReceiptStatus::Received,
            ReceiptStatus::Paid,
        ] {
            assert!(!ReceiptStatus::Paid.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_backward_transition() {
        assert!(!ReceiptStatus::Received.can_transition_to(ReceiptStatus::Draft));
    }

    /// The paid guard rejects a stored paid receipt regardless of payload
    #[test]
    fn test_paid_receipt_is_immutable() {
        assert!(ensure_receipt_mutable(true, None).is_err());
        assert!(ensure_receipt_mutable(true, Some(false)).is_err());
        assert!(ensure_receipt_mutable(true, Some(true)).is_err());
    }

    /// The paid guard rejects payloads that try to flip the paid flag
    #[test]
    fn test_update_cannot_set_paid_flag() {
        assert!(ensure_receipt_mutable(false, Some(true)).is_err());
    }

    #[test]
    fn test_unpaid_receipt_is_mutable() {
        assert!(ensure_receipt_mutable(false, None).is_ok());
        assert!(ensure_receipt_mutable(false, Some(false)).is_ok());
    }

    /// Corrections keep the batch quantity invariant
    #[test]
    fn test_batch_correction_bounds() {
        assert!(validate_batch_quantities(10, 10).is_ok());
        assert!(validate_batch_quantities(10, 3).is_ok());
        assert!(validate_batch_quantities(10, 0).is_ok());
        assert!(validate_batch_quantities(10, 11).is_err());
        assert!(validate_batch_quantities(10, -1).is_err());
        assert!(validate_batch_quantities(0, 0).is_err());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = ReceiptStatus> {
        prop_oneof![
            Just(ReceiptStatus::Draft),
            Just(ReceiptStatus::Received),
            Just(ReceiptStatus::Paid),
        ]
    }

    proptest! {
        /// The only legal transitions are the two forward steps
        #[test]
        fn prop_only_forward_steps_allowed(
            from in status_strategy(),
            to in status_strategy()
        ) {
            let legal = matches!(
                (from, to),
                (ReceiptStatus::Draft, ReceiptStatus::Received)
                    | (ReceiptStatus::Received, ReceiptStatus::Paid)
            );
            prop_assert_eq!(from.can_transition_to(to), legal);
        }

        /// Flag derivation and transitions agree: a paid receipt derived
        /// from any flag combination never accepts a transition
        #[test]
        fn prop_paid_flags_are_terminal(is_received in any::<bool>(), to in status_strategy()) {
            let status = ReceiptStatus::from_flags(is_received, true);
            prop_assert!(status.is_terminal());
            prop_assert!(!status.can_transition_to(to));
        }

        /// The paid guard is exactly: stored paid, or payload sets paid
        #[test]
        fn prop_mutability_guard(
            stored_paid in any::<bool>(),
            incoming in proptest::option::of(any::<bool>())
        ) {
            let rejected = ensure_receipt_mutable(stored_paid, incoming).is_err();
            prop_assert_eq!(rejected, stored_paid || incoming == Some(true));
        }

        /// Quantity corrections are accepted iff they respect the bounds
        #[test]
        fn prop_correction_bounds(inbound in -50i32..=200, invent in -50i32..=250) {
            let ok = validate_batch_quantities(inbound, invent).is_ok();
            prop_assert_eq!(ok, inbound > 0 && invent >= 0 && invent <= inbound);
        }
    }
}

//! Order status derivation.
//!
//! An order's status and payment status are projections of its items,
//! recomputed after every item transition. The rules are evaluated top to
//! bottom; the first match wins.

use crate::item::{ItemStatus, LineItem};

use super::status::{OrderStatus, PaymentStatus};

/// Derives the order status from its items.
///
/// Evaluation order:
/// 1. every item in its type's success set -> `Completed`
/// 2. every item cancelled -> `Cancelled`
/// 3. every item refunded -> `Refunded`
/// 4. at least one item refunded -> `PartiallyRefunded`
/// 5. any item still pending -> `Processing` once another item has moved,
///    otherwise `Pending`
/// 6. everything else -> `Confirmed`
pub fn derive_order_status(items: &[LineItem]) -> OrderStatus {
    if items.is_empty() {
        return OrderStatus::Pending;
    }

    if items.iter().all(LineItem::is_success) {
        return OrderStatus::Completed;
    }

    if items.iter().all(|item| item.status == ItemStatus::Cancelled) {
        return OrderStatus::Cancelled;
    }

    let refunded = items
        .iter()
        .filter(|item| item.status == ItemStatus::Refunded)
        .count();
    if refunded == items.len() {
        return OrderStatus::Refunded;
    }
    if refunded > 0 {
        return OrderStatus::PartiallyRefunded;
    }

    if items.iter().any(|item| item.status == ItemStatus::Pending) {
        let any_moved = items.iter().any(|item| item.status != ItemStatus::Pending);
        return if any_moved {
            OrderStatus::Processing
        } else {
            OrderStatus::Pending
        };
    }

    OrderStatus::Confirmed
}

/// Derives the payment posture from the items.
///
/// All refunded -> `Refunded`; some refunded -> `PartiallyRefunded`; no item
/// still pending and at least one item not cancelled -> `Paid`; everything
/// else -> `Pending`.
pub fn derive_payment_status(items: &[LineItem]) -> PaymentStatus {
    if items.is_empty() {
        return PaymentStatus::Pending;
    }

    let refunded = items
        .iter()
        .filter(|item| item.status == ItemStatus::Refunded)
        .count();
    if refunded == items.len() {
        return PaymentStatus::Refunded;
    }
    if refunded > 0 {
        return PaymentStatus::PartiallyRefunded;
    }

    let any_pending = items.iter().any(|item| item.status == ItemStatus::Pending);
    let all_cancelled = items.iter().all(|item| item.status == ItemStatus::Cancelled);
    if any_pending || all_cancelled {
        return PaymentStatus::Pending;
    }

    PaymentStatus::Paid
}

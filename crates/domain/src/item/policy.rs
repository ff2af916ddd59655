//! Per-type fulfillment policies.
//!
//! Transition legality is data, not code: each item type owns a static
//! policy struct listing its transition table and derived status sets, and
//! everything else in the crate consults the policy instead of matching on
//! the type.

use super::item_type::ItemType;
use super::status::{FulfillmentStatus, ItemStatus};

use ItemStatus::*;

/// The fulfillment rules for one item type.
#[derive(Debug)]
pub struct FulfillmentPolicy {
    /// The type these rules govern.
    pub item_type: ItemType,

    /// Allowed transitions: `(from, legal targets)`. Every status reachable
    /// by this type appears as a key; terminal statuses map to no targets.
    transitions: &'static [(ItemStatus, &'static [ItemStatus])],

    /// Statuses from which the item may be cancelled.
    cancellable: &'static [ItemStatus],

    /// Statuses from which a refund may be requested.
    refundable: &'static [ItemStatus],

    /// The type's successful end states, as seen by the order coordinator.
    success: &'static [ItemStatus],
}

static PHYSICAL: FulfillmentPolicy = FulfillmentPolicy {
    item_type: ItemType::Physical,
    transitions: &[
        (Pending, &[PaymentConfirmed, Cancelled]),
        (PaymentConfirmed, &[Preparing, Cancelled]),
        (Preparing, &[ReadyToShip, Cancelled]),
        (ReadyToShip, &[Shipped]),
        (Shipped, &[OutForDelivery]),
        (OutForDelivery, &[Delivered]),
        (Delivered, &[RefundRequested]),
        (RefundRequested, &[Refunded]),
        (Refunded, &[]),
        (Cancelled, &[]),
    ],
    cancellable: &[Pending, PaymentConfirmed, Preparing],
    refundable: &[Delivered],
    success: &[Delivered],
};

static DIGITAL: FulfillmentPolicy = FulfillmentPolicy {
    item_type: ItemType::Digital,
    transitions: &[
        (Pending, &[PaymentConfirmed, Cancelled]),
        (PaymentConfirmed, &[AccessGranted, Cancelled]),
        (AccessGranted, &[Downloaded, RefundRequested]),
        (Downloaded, &[RefundRequested]),
        (RefundRequested, &[Refunded]),
        (Refunded, &[]),
        (Cancelled, &[]),
    ],
    cancellable: &[Pending, PaymentConfirmed],
    refundable: &[AccessGranted, Downloaded],
    success: &[AccessGranted, Downloaded],
};

static SERVICE: FulfillmentPolicy = FulfillmentPolicy {
    item_type: ItemType::Service,
    transitions: &[
        (Pending, &[PaymentConfirmed, Cancelled]),
        (PaymentConfirmed, &[BookingConfirmed, Cancelled]),
        (BookingConfirmed, &[ReminderSent, Cancelled]),
        (ReminderSent, &[InProgress]),
        (InProgress, &[Completed, NoShow]),
        (Completed, &[RefundRequested]),
        (NoShow, &[RefundRequested]),
        (RefundRequested, &[Refunded]),
        (Refunded, &[]),
        (Cancelled, &[]),
    ],
    cancellable: &[Pending, PaymentConfirmed, BookingConfirmed],
    refundable: &[Completed, NoShow],
    success: &[Completed, NoShow],
};

impl FulfillmentPolicy {
    /// Resolves the policy for an item type.
    pub fn for_type(item_type: ItemType) -> &'static FulfillmentPolicy {
        match item_type {
            ItemType::Physical => &PHYSICAL,
            ItemType::Digital => &DIGITAL,
            ItemType::Service => &SERVICE,
        }
    }

    /// The status every new item starts in.
    pub fn initial(&self) -> ItemStatus {
        Pending
    }

    /// Returns true when `from -> to` is in this type's transition table.
    pub fn allows(&self, from: ItemStatus, to: ItemStatus) -> bool {
        self.targets(from).contains(&to)
    }

    /// Returns the legal targets from a status. Statuses this type never
    /// reaches have no targets.
    pub fn targets(&self, from: ItemStatus) -> &'static [ItemStatus] {
        self.transitions
            .iter()
            .find(|(status, _)| *status == from)
            .map(|(_, targets)| *targets)
            .unwrap_or(&[])
    }

    /// Returns true when the status belongs to this type's table at all.
    pub fn is_known(&self, status: ItemStatus) -> bool {
        self.transitions.iter().any(|(from, _)| *from == status)
    }

    /// Returns true when the item may still be cancelled from this status.
    pub fn is_cancellable(&self, status: ItemStatus) -> bool {
        self.cancellable.contains(&status)
    }

    /// Returns true when a refund may be requested from this status.
    pub fn is_refundable(&self, status: ItemStatus) -> bool {
        self.refundable.contains(&status)
    }

    /// Returns true when the status is one of the type's successful end
    /// states (delivered goods, granted or downloaded content, a finished or
    /// no-show session).
    pub fn is_success(&self, status: ItemStatus) -> bool {
        self.success.contains(&status)
    }

    /// Returns true when no further transition is possible from this status.
    pub fn is_terminal(&self, status: ItemStatus) -> bool {
        self.is_known(status) && self.targets(status).is_empty()
    }

    /// Projects a detailed status onto the coarse fulfillment status.
    pub fn projection(&self, status: ItemStatus) -> FulfillmentStatus {
        match status {
            Pending => FulfillmentStatus::Pending,
            Cancelled => FulfillmentStatus::Cancelled,
            RefundRequested | Refunded => FulfillmentStatus::Fulfilled,
            other if self.is_success(other) => FulfillmentStatus::Fulfilled,
            _ => FulfillmentStatus::Processing,
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::error::FulfillmentError;

/// The fulfillment status of a single line item.
///
/// One closed enum covers the statuses of all item types; which statuses are
/// reachable, and along which edges, is decided by the owning type's
/// [`FulfillmentPolicy`](super::FulfillmentPolicy):
///
/// ```text
/// physical: pending ─► payment_confirmed ─► preparing ─► ready_to_ship
///               │              │                │              │
///               └──────────────┴── cancelled ◄──┘              ▼
///                                                 shipped ─► out_for_delivery
///                                                                │
///           refunded ◄── refund_requested ◄── delivered ◄───────┘
///
/// digital:  pending ─► payment_confirmed ─► access_granted ─► downloaded
///               │              │                  │               │
///               └── cancelled ◄┘                  └─► refund_requested ◄┘
///                                                          │
///                                                          ▼
///                                                      refunded
///
/// service:  pending ─► payment_confirmed ─► booking_confirmed ─► reminder_sent
///               │              │                  │                   │
///               └──────────────┴── cancelled ◄────┘                   ▼
///                                                               in_progress
///                                                               │         │
///           refunded ◄── refund_requested ◄── completed ◄───────┘         ▼
///                                 ▲                                    no_show
///                                 └────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Placed but not yet paid for.
    Pending,

    /// Payment settled; fulfillment may begin.
    PaymentConfirmed,

    /// Physical: being picked and packed.
    Preparing,

    /// Physical: packed and awaiting carrier pickup.
    ReadyToShip,

    /// Physical: handed to the carrier.
    Shipped,

    /// Physical: on the delivery vehicle.
    OutForDelivery,

    /// Physical: received by the customer.
    Delivered,

    /// Digital: download access issued.
    AccessGranted,

    /// Digital: the customer pulled the content at least once.
    Downloaded,

    /// Service: appointment slot confirmed.
    BookingConfirmed,

    /// Service: reminder notification sent.
    ReminderSent,

    /// Service: session currently running.
    InProgress,

    /// Service: session finished.
    Completed,

    /// Service: customer did not appear.
    NoShow,

    /// Cancelled before fulfillment finished.
    Cancelled,

    /// Customer asked for their money back.
    RefundRequested,

    /// Refund settled.
    Refunded,
}

impl ItemStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::PaymentConfirmed => "payment_confirmed",
            ItemStatus::Preparing => "preparing",
            ItemStatus::ReadyToShip => "ready_to_ship",
            ItemStatus::Shipped => "shipped",
            ItemStatus::OutForDelivery => "out_for_delivery",
            ItemStatus::Delivered => "delivered",
            ItemStatus::AccessGranted => "access_granted",
            ItemStatus::Downloaded => "downloaded",
            ItemStatus::BookingConfirmed => "booking_confirmed",
            ItemStatus::ReminderSent => "reminder_sent",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
            ItemStatus::NoShow => "no_show",
            ItemStatus::Cancelled => "cancelled",
            ItemStatus::RefundRequested => "refund_requested",
            ItemStatus::Refunded => "refunded",
        }
    }

    /// Returns the PascalCase fragment used in outbox event type names,
    /// e.g. `payment_confirmed` becomes `PaymentConfirmed`.
    pub fn event_fragment(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "Pending",
            ItemStatus::PaymentConfirmed => "PaymentConfirmed",
            ItemStatus::Preparing => "Preparing",
            ItemStatus::ReadyToShip => "ReadyToShip",
            ItemStatus::Shipped => "Shipped",
            ItemStatus::OutForDelivery => "OutForDelivery",
            ItemStatus::Delivered => "Delivered",
            ItemStatus::AccessGranted => "AccessGranted",
            ItemStatus::Downloaded => "Downloaded",
            ItemStatus::BookingConfirmed => "BookingConfirmed",
            ItemStatus::ReminderSent => "ReminderSent",
            ItemStatus::InProgress => "InProgress",
            ItemStatus::Completed => "Completed",
            ItemStatus::NoShow => "NoShow",
            ItemStatus::Cancelled => "Cancelled",
            ItemStatus::RefundRequested => "RefundRequested",
            ItemStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = FulfillmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ItemStatus::Pending),
            "payment_confirmed" => Ok(ItemStatus::PaymentConfirmed),
            "preparing" => Ok(ItemStatus::Preparing),
            "ready_to_ship" => Ok(ItemStatus::ReadyToShip),
            "shipped" => Ok(ItemStatus::Shipped),
            "out_for_delivery" => Ok(ItemStatus::OutForDelivery),
            "delivered" => Ok(ItemStatus::Delivered),
            "access_granted" => Ok(ItemStatus::AccessGranted),
            "downloaded" => Ok(ItemStatus::Downloaded),
            "booking_confirmed" => Ok(ItemStatus::BookingConfirmed),
            "reminder_sent" => Ok(ItemStatus::ReminderSent),
            "in_progress" => Ok(ItemStatus::InProgress),
            "completed" => Ok(ItemStatus::Completed),
            "no_show" => Ok(ItemStatus::NoShow),
            "cancelled" => Ok(ItemStatus::Cancelled),
            "refund_requested" => Ok(ItemStatus::RefundRequested),
            "refunded" => Ok(ItemStatus::Refunded),
            other => Err(FulfillmentError::UnknownStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// Coarse projection of an item's detailed status.
///
/// Derived from [`ItemStatus`] on every transition, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    /// Nothing has happened yet.
    #[default]
    Pending,

    /// Somewhere between payment and the type's success status.
    Processing,

    /// Reached the type's success status (refunds do not undo this).
    Fulfilled,

    /// Cancelled before fulfillment.
    Cancelled,
}

impl FulfillmentStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Processing => "processing",
            FulfillmentStatus::Fulfilled => "fulfilled",
            FulfillmentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FulfillmentStatus {
    type Err = FulfillmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(FulfillmentStatus::Pending),
            "processing" => Ok(FulfillmentStatus::Processing),
            "fulfilled" => Ok(FulfillmentStatus::Fulfilled),
            "cancelled" => Ok(FulfillmentStatus::Cancelled),
            other => Err(FulfillmentError::UnknownFulfillmentStatus {
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [ItemStatus; 17] = [
        ItemStatus::Pending,
        ItemStatus::PaymentConfirmed,
        ItemStatus::Preparing,
        ItemStatus::ReadyToShip,
        ItemStatus::Shipped,
        ItemStatus::OutForDelivery,
        ItemStatus::Delivered,
        ItemStatus::AccessGranted,
        ItemStatus::Downloaded,
        ItemStatus::BookingConfirmed,
        ItemStatus::ReminderSent,
        ItemStatus::InProgress,
        ItemStatus::Completed,
        ItemStatus::NoShow,
        ItemStatus::Cancelled,
        ItemStatus::RefundRequested,
        ItemStatus::Refunded,
    ];

    #[test]
    fn every_status_round_trips_through_as_str() {
        for status in ALL_STATUSES {
            let parsed: ItemStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        let result: Result<ItemStatus, _> = "returned".parse();
        assert!(matches!(
            result,
            Err(FulfillmentError::UnknownStatus { value }) if value == "returned"
        ));
    }

    #[test]
    fn serde_uses_snake_case_strings() {
        let json = serde_json::to_string(&ItemStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"out_for_delivery\"");
        let back: ItemStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ItemStatus::OutForDelivery);
    }

    #[test]
    fn serde_rejects_unknown_status_strings() {
        let result: Result<ItemStatus, _> = serde_json::from_str("\"misplaced\"");
        assert!(result.is_err());
    }

    #[test]
    fn event_fragment_is_pascal_case() {
        assert_eq!(ItemStatus::PaymentConfirmed.event_fragment(), "PaymentConfirmed");
        assert_eq!(ItemStatus::NoShow.event_fragment(), "NoShow");
    }

    #[test]
    fn fulfillment_status_round_trips() {
        for status in [
            FulfillmentStatus::Pending,
            FulfillmentStatus::Processing,
            FulfillmentStatus::Fulfilled,
            FulfillmentStatus::Cancelled,
        ] {
            let parsed: FulfillmentStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn default_fulfillment_status_is_pending() {
        assert_eq!(FulfillmentStatus::default(), FulfillmentStatus::Pending);
    }
}

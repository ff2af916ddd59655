use serde::{Deserialize, Serialize};

use crate::error::FulfillmentError;

/// The derived status of an order.
///
/// Never set directly: always recomputed from the order's items by
/// [`derive_order_status`](super::derive_order_status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// No item has moved yet.
    #[default]
    Pending,

    /// Every item has left pending, none settled yet.
    Confirmed,

    /// Some items moved while at least one is still pending.
    Processing,

    /// Every item reached its type's successful end state.
    Completed,

    /// Every item was cancelled.
    Cancelled,

    /// Every item was refunded.
    Refunded,

    /// At least one, but not every, item was refunded.
    PartiallyRefunded,
}

impl OrderStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    /// Returns the PascalCase fragment used in outbox event type names.
    pub fn event_fragment(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Refunded => "Refunded",
            OrderStatus::PartiallyRefunded => "PartiallyRefunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = FulfillmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            "partially_refunded" => Ok(OrderStatus::PartiallyRefunded),
            other => Err(FulfillmentError::UnknownOrderStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// The derived payment posture of an order, for downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// At least one item has not been paid for (or nothing remains payable).
    #[default]
    Pending,

    /// Every live item has confirmed payment.
    Paid,

    /// Some items have been refunded.
    PartiallyRefunded,

    /// Every item has been refunded.
    Refunded,
}

impl PaymentStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = FulfillmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "partially_refunded" => Ok(PaymentStatus::PartiallyRefunded),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(FulfillmentError::UnknownPaymentStatus {
                value: other.to_string(),
            }),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::error::FulfillmentError;

use super::policy::FulfillmentPolicy;

/// The kind of goods a line item represents.
///
/// Each type carries its own fulfillment state machine; the type is fixed at
/// order placement and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// A shippable good that moves through a carrier.
    Physical,

    /// A downloadable good granted by access, not shipment.
    Digital,

    /// A booked appointment or session.
    Service,
}

impl ItemType {
    /// Returns the fulfillment policy governing items of this type.
    pub fn policy(&self) -> &'static FulfillmentPolicy {
        FulfillmentPolicy::for_type(*self)
    }

    /// Returns the type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Physical => "physical",
            ItemType::Digital => "digital",
            ItemType::Service => "service",
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = FulfillmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "physical" => Ok(ItemType::Physical),
            "digital" => Ok(ItemType::Digital),
            "service" => Ok(ItemType::Service),
            other => Err(FulfillmentError::UnknownItemType {
                value: other.to_string(),
            }),
        }
    }
}

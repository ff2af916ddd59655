use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item_type::ItemType;

/// Type-specific fulfillment payload attached to a line item as it moves.
///
/// Each variant belongs to exactly one item type; attaching the wrong kind
/// is rejected by [`LineItem::attach_fulfillment_data`](super::LineItem::attach_fulfillment_data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FulfillmentData {
    /// Carrier details for a physical shipment.
    Tracking {
        carrier: String,
        tracking_number: String,
    },

    /// Download grant for a digital item.
    DownloadAccess {
        url: String,
        expires_at: DateTime<Utc>,
    },

    /// Appointment details for a service item.
    Booking {
        scheduled_for: DateTime<Utc>,
        location: String,
    },
}

impl FulfillmentData {
    /// Returns the variant name used in errors and serialized payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            FulfillmentData::Tracking { .. } => "tracking",
            FulfillmentData::DownloadAccess { .. } => "download_access",
            FulfillmentData::Booking { .. } => "booking",
        }
    }

    /// Returns the item type this payload belongs to.
    pub fn applies_to(&self) -> ItemType {
        match self {
            FulfillmentData::Tracking { .. } => ItemType::Physical,
            FulfillmentData::DownloadAccess { .. } => ItemType::Digital,
            FulfillmentData::Booking { .. } => ItemType::Service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_applies_to_physical_only() {
        let data = FulfillmentData::Tracking {
            carrier: "UPS".to_string(),
            tracking_number: "1Z999AA10123456784".to_string(),
        };
        assert_eq!(data.applies_to(), ItemType::Physical);
        assert_eq!(data.kind(), "tracking");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let data = FulfillmentData::Booking {
            scheduled_for: Utc::now(),
            location: "Room 4".to_string(),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "booking");
        assert_eq!(json["location"], "Room 4");
    }

    #[test]
    fn deserializes_from_tagged_json() {
        let json = r#"{"kind":"download_access","url":"https://cdn.example/archive.zip","expires_at":"2026-01-01T00:00:00Z"}"#;
        let data: FulfillmentData = serde_json::from_str(json).unwrap();
        assert_eq!(data.applies_to(), ItemType::Digital);
    }
}

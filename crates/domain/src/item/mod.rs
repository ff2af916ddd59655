//! Line items and their per-type fulfillment state machines.

mod data;
mod item_type;
mod line_item;
mod policy;
mod status;

pub use data::FulfillmentData;
pub use item_type::ItemType;
pub use line_item::{LineItem, StatusChange};
pub use policy::FulfillmentPolicy;
pub use status::{FulfillmentStatus, ItemStatus};

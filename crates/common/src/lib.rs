//! Shared types used across the order lifecycle engine.

pub mod ids;
pub mod revision;

pub use ids::{DlqEntryId, EventId, LineItemId, OrderId};
pub use revision::Revision;

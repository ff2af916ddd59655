//! Orders and the status derivation over their items.

mod aggregate;
mod coordinator;
mod status;

pub use aggregate::Order;
pub use coordinator::{derive_order_status, derive_payment_status};
pub use status::{OrderStatus, PaymentStatus};

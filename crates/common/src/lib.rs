//! Shared value types for the commerce core.

mod identity;
mod money;
mod status;
mod types;

pub use identity::{Caller, Role};
pub use money::Money;
pub use status::{OrderStatus, PaymentStatus, UnknownStatus};
pub use types::{CartId, CartItemId, OrderId, OrderItemId, PaymentId, ProductId, UserId};

//! HTTP handlers.

pub mod carts;
pub mod orders;
pub mod system;

use domain::{CartService, OrderService};
use store::Store;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub carts: CartService<S>,
    pub orders: OrderService<S>,
}

/// Parses a UUID path segment into a typed id.
pub(crate) fn parse_id<T: From<uuid::Uuid>>(
    raw: &str,
    what: &str,
) -> Result<T, crate::error::ApiError> {
    uuid::Uuid::parse_str(raw)
        .map(T::from)
        .map_err(|e| crate::error::ApiError::BadRequest(format!("Invalid {what}: {e}")))
}

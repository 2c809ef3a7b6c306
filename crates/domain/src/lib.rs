//! Commerce core: carts, inventory and orders.
//!
//! This crate provides:
//! - Inventory ledger with race-safe stock reservation and release
//! - `CartService` for per-user carts
//! - `OrderService` for placement, payment, delivery and rejection
//! - A single authorization policy and a retry wrapper for store conflicts
//!
//! Services are generic over [`store::Store`] and receive the store handle
//! explicitly.

pub mod cart;
pub mod error;
pub mod inventory;
pub mod order;
pub mod policy;
pub mod retry;

pub use cart::{CartService, CartView};
pub use error::{CommerceError, ErrorKind, Result};
pub use order::{OrderDetails, OrderService, order_total};
pub use policy::{Action, authorize};
pub use retry::RetryPolicy;

//! Transactional persistence for carts, orders, payments and product stock.
//!
//! The [`Store`] / [`StoreTx`] traits are the port the domain services are
//! written against; [`InMemoryStore`] and [`PostgresStore`] are the adapters.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use records::{Cart, CartItem, Order, OrderItem, Payment, Product, StockUpdate};
pub use store::{DEFAULT_LOCK_TIMEOUT, Store, StoreTx};

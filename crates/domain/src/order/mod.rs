//! Order placement and the order lifecycle.
//!
//! ```text
//! cart ──place_order──► PENDING ──pay──► PAID ──deliver──► DELIVERED
//!                          │
//!                          └──reject──► (order removed, stock released)
//! ```

mod lifecycle;
mod placement;

use common::Money;
use serde::Serialize;
use store::{Order, OrderItem, Payment, Store};

use crate::error::{CommerceError, Result};
use crate::retry::RetryPolicy;

/// An order together with its items and payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Sum of `quantity * unit_price` over the items, at captured prices.
    pub total: Money,
    pub payment: Option<Payment>,
}

impl OrderDetails {
    fn new(order: Order, items: Vec<OrderItem>, payment: Option<Payment>) -> Result<Self> {
        let total = order_total(&items)?;
        Ok(Self {
            order,
            items,
            total,
            payment,
        })
    }
}

/// Amount owed for a set of order items.
///
/// Fails with [`CommerceError::InvalidInput`] if the amount does not fit in
/// cents.
pub fn order_total(items: &[OrderItem]) -> Result<Money> {
    items
        .iter()
        .map(OrderItem::line_total)
        .try_fold(Money::zero(), |acc, line| acc.checked_add(line?))
        .ok_or_else(|| CommerceError::InvalidInput("order total is too large".to_string()))
}

/// Service for placing orders and moving them through their lifecycle.
#[derive(Clone)]
pub struct OrderService<S: Store> {
    store: S,
    retry: RetryPolicy,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

//! Persisted entities.

use chrono::{DateTime, Utc};
use common::{
    CartId, CartItemId, Money, OrderId, OrderItemId, OrderStatus, PaymentId, PaymentStatus,
    ProductId, UserId,
};
use serde::{Deserialize, Serialize};

/// A catalog product. The core only reads `price` and moves `stock_qty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock_qty: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a product with fresh timestamps.
    pub fn new(name: impl Into<String>, price: Money, stock_qty: u32) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock_qty,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user's in-progress selection. One per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line of a cart. At most one per (cart, product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A placed order. Only `status` changes after placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// The cart the order was drained from.
    pub cart_id: CartId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order for the given cart.
    pub fn pending(user_id: UserId, cart_id: CartId) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            user_id,
            cart_id,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A line of an order with the unit price captured at placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            id: OrderItemId::new(),
            order_id,
            product_id,
            quantity,
            unit_price,
        }
    }

    /// Returns `quantity * unit_price`, or `None` if it overflows.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// A recorded payment. At most one per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub method: String,
    pub transaction_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a successful payment for an order. The transaction reference
    /// is derived from the order id, so it is unique per order.
    pub fn record(order_id: OrderId, amount: Money, method: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id,
            amount,
            status: PaymentStatus::Paid,
            method: method.into(),
            transaction_ref: format!("TXN-{order_id}"),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockUpdate {
    /// The decrement was applied; `remaining` is the new stock level.
    Applied { remaining: u32 },
    /// The product has fewer units than requested; nothing changed.
    Insufficient { available: u32 },
    /// No such product.
    Missing,
}

use std::time::Duration;

use async_trait::async_trait;
use common::{CartId, CartItemId, OrderId, OrderStatus, ProductId, UserId};

use crate::{Cart, CartItem, Order, OrderItem, Payment, Product, Result, StockUpdate};

/// Default bound on how long a transaction waits for a lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Entry point to the persistent store.
///
/// Implementations must be thread-safe (Send + Sync) and cheap to clone into
/// each service that needs them.
#[async_trait]
pub trait Store: Send + Sync {
    /// The unit of work handed out by [`Store::begin`].
    type Tx: StoreTx;

    /// Starts a new transaction.
    ///
    /// Fails with `StoreError::Conflict` when the store cannot provide a
    /// transaction within its lock wait bound.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A single all-or-nothing unit of work.
///
/// Effects become visible to other transactions only after [`StoreTx::commit`].
/// Dropping a transaction without committing discards every effect.
///
/// Methods named `lock_*` take a row lock that is held until the transaction
/// ends; concurrent transactions touching the same row wait for it, bounded by
/// the store's lock timeout.
#[async_trait]
pub trait StoreTx: Send {
    // -- Products --

    /// Reads a product row without locking it.
    async fn find_product(&mut self, product_id: ProductId) -> Result<Option<Product>>;

    /// Reads and locks a product row.
    async fn lock_product(&mut self, product_id: ProductId) -> Result<Option<Product>>;

    /// Decrements stock by `quantity` only if at least `quantity` units remain.
    ///
    /// This is a single conditional update; it never reads then writes.
    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32)
    -> Result<StockUpdate>;

    /// Returns `quantity` units to stock. Returns false if the product is gone.
    ///
    /// Fails with `StoreError::OutOfRange` if the stock would exceed `u32::MAX`.
    async fn increment_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<bool>;

    // -- Carts --

    /// Returns the user's cart, creating it if absent. Safe under concurrent
    /// first-time calls for the same user: exactly one cart is ever created.
    async fn upsert_cart(&mut self, user_id: UserId) -> Result<Cart>;

    /// Reads the user's cart, if any, without locking it.
    async fn find_cart(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Reads and locks the user's cart, if any.
    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Adds `quantity` to the (cart, product) line, inserting it if absent.
    /// Returns the line after the merge.
    ///
    /// Fails with `StoreError::OutOfRange` if the merged quantity would exceed
    /// `u32::MAX`; the line is then left unchanged.
    async fn add_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem>;

    /// Reads and locks the (cart, product) line, if any.
    async fn lock_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItem>>;

    async fn set_cart_item_quantity(&mut self, item_id: CartItemId, quantity: u32) -> Result<()>;

    async fn delete_cart_item(&mut self, item_id: CartItemId) -> Result<()>;

    /// Reads every line of a cart without locking, ordered by ascending
    /// product id.
    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>>;

    /// Reads and locks every line of a cart, ordered by ascending product id.
    async fn lock_cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>>;

    /// Deletes every line of a cart. The cart row itself is kept.
    async fn clear_cart(&mut self, cart_id: CartId) -> Result<u64>;

    // -- Orders --

    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<()>;

    /// Reads an order row without locking it.
    async fn find_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Reads and locks an order row.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Returns the items of an order, ordered by ascending product id.
    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    async fn update_order_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<()>;

    /// Deletes an order. Its items are removed with it.
    async fn delete_order(&mut self, order_id: OrderId) -> Result<()>;

    // -- Payments --

    async fn find_payment(&mut self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Inserts a payment. Fails with `StoreError::UniqueViolation` if the
    /// order already has one.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    // -- Completion --

    /// Makes every effect of this transaction durable.
    async fn commit(self) -> Result<()>;

    /// Discards every effect of this transaction.
    async fn rollback(self) -> Result<()>;
}

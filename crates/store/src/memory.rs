use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, CartItemId, OrderId, OrderItemId, OrderStatus, PaymentId, ProductId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Cart, CartItem, Order, OrderItem, Payment, Product, Result, StockUpdate, StoreError,
    store::{DEFAULT_LOCK_TIMEOUT, Store, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    carts_by_user: HashMap<UserId, CartId>,
    cart_items: HashMap<CartItemId, CartItem>,
    orders: HashMap<OrderId, Order>,
    order_items: HashMap<OrderItemId, OrderItem>,
    payments: HashMap<PaymentId, Payment>,
}

impl MemoryState {
    fn cart_item_mut(&mut self, cart_id: CartId, product_id: ProductId) -> Option<&mut CartItem> {
        self.cart_items
            .values_mut()
            .find(|item| item.cart_id == cart_id && item.product_id == product_id)
    }
}

/// In-memory store implementation for testing and local runs.
///
/// Transactions are fully serialized: a transaction holds the store lock from
/// `begin` until it commits or is dropped, and works on a private copy of the
/// state that replaces the shared state only on commit. This is stricter than
/// the row-level locking of the PostgreSQL store but gives the same guarantees
/// to callers.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long `begin` waits for a running transaction to finish.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Adds or replaces a catalog product.
    pub async fn insert_product(&self, product: Product) {
        self.state
            .lock()
            .await
            .products
            .insert(product.id, product);
    }

    /// Returns the committed state of a product.
    pub async fn product(&self, product_id: ProductId) -> Option<Product> {
        self.state.lock().await.products.get(&product_id).cloned()
    }

    /// Returns the committed lines of a user's cart.
    pub async fn cart_items_for(&self, user_id: UserId) -> Vec<CartItem> {
        let state = self.state.lock().await;
        let Some(cart_id) = state.carts_by_user.get(&user_id) else {
            return Vec::new();
        };
        let mut items: Vec<_> = state
            .cart_items
            .values()
            .filter(|item| item.cart_id == *cart_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.product_id);
        items
    }

    /// Returns the number of carts stored.
    pub async fn cart_count(&self) -> usize {
        self.state.lock().await.carts.len()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the number of order items stored.
    pub async fn order_item_count(&self) -> usize {
        self.state.lock().await.order_items.len()
    }

    /// Returns the number of payments stored.
    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                StoreError::Conflict(format!(
                    "could not acquire store lock within {:?}",
                    self.lock_timeout
                ))
            })?;
        let working = MemoryState::clone(&guard);
        Ok(InMemoryTx { guard, working })
    }
}

/// A serialized in-memory transaction.
pub struct InMemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn find_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&product_id).cloned())
    }

    // The whole store is already held by this transaction.
    async fn lock_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        self.find_product(product_id).await
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockUpdate> {
        let Some(product) = self.working.products.get_mut(&product_id) else {
            return Ok(StockUpdate::Missing);
        };
        match product.stock_qty.checked_sub(quantity) {
            Some(remaining) => {
                product.stock_qty = remaining;
                product.updated_at = Utc::now();
                Ok(StockUpdate::Applied { remaining })
            }
            None => Ok(StockUpdate::Insufficient {
                available: product.stock_qty,
            }),
        }
    }

    async fn increment_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<bool> {
        let Some(product) = self.working.products.get_mut(&product_id) else {
            return Ok(false);
        };
        product.stock_qty = product
            .stock_qty
            .checked_add(quantity)
            .ok_or(StoreError::OutOfRange {
                column: "stock_qty",
            })?;
        product.updated_at = Utc::now();
        Ok(true)
    }

    async fn upsert_cart(&mut self, user_id: UserId) -> Result<Cart> {
        if let Some(cart_id) = self.working.carts_by_user.get(&user_id)
            && let Some(cart) = self.working.carts.get_mut(cart_id)
        {
            cart.updated_at = Utc::now();
            return Ok(cart.clone());
        }

        let now = Utc::now();
        let cart = Cart {
            id: CartId::new(),
            user_id,
            created_at: now,
            updated_at: now,
        };
        self.working.carts_by_user.insert(user_id, cart.id);
        self.working.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn find_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self
            .working
            .carts_by_user
            .get(&user_id)
            .and_then(|cart_id| self.working.carts.get(cart_id))
            .cloned())
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        self.find_cart(user_id).await
    }

    async fn add_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        if let Some(existing) = self.working.cart_item_mut(cart_id, product_id) {
            existing.quantity = existing
                .quantity
                .checked_add(quantity)
                .ok_or(StoreError::OutOfRange { column: "quantity" })?;
            return Ok(existing.clone());
        }

        let item = CartItem {
            id: CartItemId::new(),
            cart_id,
            product_id,
            quantity,
        };
        self.working.cart_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn lock_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItem>> {
        Ok(self
            .working
            .cart_item_mut(cart_id, product_id)
            .cloned())
    }

    async fn set_cart_item_quantity(&mut self, item_id: CartItemId, quantity: u32) -> Result<()> {
        if let Some(item) = self.working.cart_items.get_mut(&item_id) {
            item.quantity = quantity;
        }
        Ok(())
    }

    async fn delete_cart_item(&mut self, item_id: CartItemId) -> Result<()> {
        self.working.cart_items.remove(&item_id);
        Ok(())
    }

    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let mut items: Vec<_> = self
            .working
            .cart_items
            .values()
            .filter(|item| item.cart_id == cart_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.product_id);
        Ok(items)
    }

    async fn lock_cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>> {
        self.cart_items(cart_id).await
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<u64> {
        let before = self.working.cart_items.len();
        self.working
            .cart_items
            .retain(|_, item| item.cart_id != cart_id);
        Ok((before - self.working.cart_items.len()) as u64)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<()> {
        self.working.order_items.insert(item.id, item.clone());
        Ok(())
    }

    async fn find_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        self.find_order(order_id).await
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let mut items: Vec<_> = self
            .working
            .order_items
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.product_id);
        Ok(items)
    }

    async fn update_order_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        if let Some(order) = self.working.orders.get_mut(&order_id) {
            order.status = status;
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_order(&mut self, order_id: OrderId) -> Result<()> {
        self.working.orders.remove(&order_id);
        self.working
            .order_items
            .retain(|_, item| item.order_id != order_id);
        self.working
            .payments
            .retain(|_, payment| payment.order_id != order_id);
        Ok(())
    }

    async fn find_payment(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|payment| payment.order_id == order_id)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        if self
            .working
            .payments
            .values()
            .any(|existing| existing.order_id == payment.order_id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: "payments_order_id_key".to_string(),
            });
        }
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

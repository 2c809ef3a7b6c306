use std::time::Instant;

use common::Caller;
use store::{Order, OrderItem, Store, StoreTx};

use super::{OrderDetails, OrderService};
use crate::error::{CommerceError, Result};
use crate::inventory;
use crate::policy::{self, Action};

impl<S: Store> OrderService<S> {
    /// Turns the caller's cart into a pending order.
    ///
    /// Stock for every line is reserved and the cart is emptied in the same
    /// transaction. If any line cannot be satisfied nothing is changed.
    #[tracing::instrument(skip(self))]
    pub async fn place_order(&self, caller: Caller) -> Result<OrderDetails> {
        policy::authorize(&caller, Action::PlaceOrder, Some(caller.user_id))?;

        let start = Instant::now();
        let result = self
            .retry
            .run("place_order", || self.try_place_order(caller))
            .await;
        metrics::histogram!("order_placement_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(details) => {
                metrics::counter!("orders_placed_total").increment(1);
                tracing::info!(
                    order_id = %details.order.id,
                    items = details.items.len(),
                    total = %details.total,
                    "Order placed"
                );
            }
            Err(e) => {
                metrics::counter!("order_placement_failures_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::info!(error = %e, "Order placement refused");
            }
        }

        result
    }

    async fn try_place_order(&self, caller: Caller) -> Result<OrderDetails> {
        let mut tx = self.store.begin().await?;

        let cart = tx
            .lock_cart(caller.user_id)
            .await?
            .ok_or(CommerceError::EmptyCart)?;
        // Ascending product id, so concurrent placements lock products in the same order.
        let lines = tx.lock_cart_items(cart.id).await?;
        if lines.is_empty() {
            return Err(CommerceError::EmptyCart);
        }

        let order = Order::pending(caller.user_id, cart.id);
        tx.insert_order(&order).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = tx
                .lock_product(line.product_id)
                .await?
                .ok_or(CommerceError::ProductNotFound(line.product_id))?;
            if product.stock_qty < line.quantity {
                return Err(CommerceError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity,
                    available: product.stock_qty,
                });
            }

            inventory::reserve(&mut tx, product.id, line.quantity).await?;

            let item = OrderItem::new(order.id, product.id, line.quantity, product.price);
            tx.insert_order_item(&item).await?;
            items.push(item);
        }

        // The total must fit before anything is committed.
        let details = OrderDetails::new(order, items, None)?;

        tx.clear_cart(cart.id).await?;
        tx.commit().await?;

        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, OrderStatus, UserId};
    use store::{InMemoryStore, Product};

    use crate::cart::CartService;

    use super::*;

    #[tokio::test]
    async fn empty_or_missing_cart_is_refused() {
        let store = InMemoryStore::new();
        let carts = CartService::new(store.clone());
        let orders = OrderService::new(store.clone());
        let caller = Caller::user(UserId::new());

        assert!(matches!(
            orders.place_order(caller).await,
            Err(CommerceError::EmptyCart)
        ));

        carts.get_or_create_cart(caller).await.unwrap();
        assert!(matches!(
            orders.place_order(caller).await,
            Err(CommerceError::EmptyCart)
        ));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn placement_captures_price_and_empties_cart() {
        let store = InMemoryStore::new();
        let product = Product::new("Chair", Money::from_cents(4999), 4);
        let product_id = product.id;
        store.insert_product(product).await;

        let carts = CartService::new(store.clone());
        let orders = OrderService::new(store.clone());
        let caller = Caller::user(UserId::new());
        carts.add_item(caller, product_id, 3).await.unwrap();

        let placed = orders.place_order(caller).await.unwrap();

        assert_eq!(placed.order.status, OrderStatus::Pending);
        assert_eq!(placed.order.user_id, caller.user_id);
        assert_eq!(placed.items.len(), 1);
        assert_eq!(placed.items[0].unit_price, Money::from_cents(4999));
        assert_eq!(placed.total, Money::from_cents(14997));
        assert!(placed.payment.is_none());
        assert_eq!(store.product(product_id).await.unwrap().stock_qty, 1);
        assert!(store.cart_items_for(caller.user_id).await.is_empty());
        assert_eq!(store.cart_count().await, 1);
    }
}

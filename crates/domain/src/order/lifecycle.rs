use chrono::Utc;
use common::{Caller, OrderId, OrderStatus};
use store::{Order, Payment, Store, StoreError, StoreTx};

use super::{OrderDetails, OrderService, order_total};
use crate::error::{CommerceError, Result};
use crate::inventory;
use crate::policy::{self, Action};

impl<S: Store> OrderService<S> {
    /// Records the payment of a pending order and marks it paid.
    ///
    /// The amount is computed from the prices captured at placement. A second
    /// call for the same order fails with [`CommerceError::AlreadyPaid`].
    #[tracing::instrument(skip(self))]
    pub async fn pay(&self, caller: Caller, order_id: OrderId, method: &str) -> Result<Payment> {
        let method = method.trim();
        if method.is_empty() {
            return Err(CommerceError::InvalidInput(
                "payment method is required".to_string(),
            ));
        }
        policy::authorize(&caller, Action::PayOrder, None)?;

        let payment = self
            .retry
            .run("pay", || self.try_pay(caller, order_id, method))
            .await?;

        metrics::counter!("payments_recorded_total").increment(1);
        tracing::info!(
            %order_id,
            amount = %payment.amount,
            transaction_ref = %payment.transaction_ref,
            "Payment recorded"
        );
        Ok(payment)
    }

    async fn try_pay(&self, caller: Caller, order_id: OrderId, method: &str) -> Result<Payment> {
        let mut tx = self.store.begin().await?;

        let order = lock_existing(&mut tx, order_id).await?;
        policy::authorize(&caller, Action::PayOrder, Some(order.user_id))?;

        if tx.find_payment(order_id).await?.is_some() {
            return Err(CommerceError::AlreadyPaid(order_id));
        }
        if !order.status.can_pay() {
            return Err(invalid_transition(&order, "pay"));
        }

        let items = tx.order_items(order_id).await?;
        let payment = Payment::record(order_id, order_total(&items)?, method);

        match tx.insert_payment(&payment).await {
            Err(StoreError::UniqueViolation { .. }) => {
                return Err(CommerceError::AlreadyPaid(order_id));
            }
            other => other?,
        }
        tx.update_order_status(order_id, OrderStatus::Paid).await?;
        tx.commit().await?;

        Ok(payment)
    }

    /// Marks a paid order as delivered. Operators only.
    #[tracing::instrument(skip(self))]
    pub async fn deliver(&self, caller: Caller, order_id: OrderId) -> Result<Order> {
        policy::authorize(&caller, Action::DeliverOrder, None)?;

        let order = self
            .retry
            .run("deliver", || async move {
                let mut tx = self.store.begin().await?;
                let mut order = lock_existing(&mut tx, order_id).await?;
                if !order.status.can_deliver() {
                    return Err(invalid_transition(&order, "deliver"));
                }

                tx.update_order_status(order_id, OrderStatus::Delivered)
                    .await?;
                tx.commit().await?;

                order.status = OrderStatus::Delivered;
                order.updated_at = Utc::now();
                Ok(order)
            })
            .await?;

        metrics::counter!("orders_delivered_total").increment(1);
        tracing::info!(%order_id, "Order delivered");
        Ok(order)
    }

    /// Rejects a pending order. Operators only.
    ///
    /// The order and its items are removed and the stock they reserved is
    /// returned, all in one transaction. Returns the removed order.
    #[tracing::instrument(skip(self))]
    pub async fn reject(&self, caller: Caller, order_id: OrderId) -> Result<Order> {
        policy::authorize(&caller, Action::RejectOrder, None)?;

        let order = self
            .retry
            .run("reject", || async move {
                let mut tx = self.store.begin().await?;
                let order = lock_existing(&mut tx, order_id).await?;
                if !order.status.can_reject() {
                    return Err(invalid_transition(&order, "reject"));
                }

                for item in tx.order_items(order_id).await? {
                    inventory::release(&mut tx, item.product_id, item.quantity).await?;
                }
                tx.delete_order(order_id).await?;
                tx.commit().await?;
                Ok(order)
            })
            .await?;

        metrics::counter!("orders_rejected_total").increment(1);
        tracing::info!(%order_id, "Order rejected");
        Ok(order)
    }

    /// Returns an order with its items and payment. Owner or operator only.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, caller: Caller, order_id: OrderId) -> Result<OrderDetails> {
        policy::authorize(&caller, Action::ViewOrder, None)?;

        self.retry
            .run("get_order", || async move {
                let mut tx = self.store.begin().await?;
                let order = tx
                    .find_order(order_id)
                    .await?
                    .ok_or(CommerceError::OrderNotFound(order_id))?;
                policy::authorize(&caller, Action::ViewOrder, Some(order.user_id))?;

                let items = tx.order_items(order_id).await?;
                let payment = tx.find_payment(order_id).await?;
                tx.rollback().await?;

                OrderDetails::new(order, items, payment)
            })
            .await
    }
}

async fn lock_existing<T: StoreTx>(tx: &mut T, order_id: OrderId) -> Result<Order> {
    tx.lock_order(order_id)
        .await?
        .ok_or(CommerceError::OrderNotFound(order_id))
}

fn invalid_transition(order: &Order, action: &'static str) -> CommerceError {
    CommerceError::InvalidTransition {
        order_id: order.id,
        status: order.status,
        action,
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, ProductId, UserId};
    use store::{InMemoryStore, Product};

    use super::*;
    use crate::cart::CartService;

    struct Fixture {
        store: InMemoryStore,
        orders: OrderService<InMemoryStore>,
        owner: Caller,
        operator: Caller,
        product_id: ProductId,
    }

    async fn placed_order() -> (Fixture, OrderId) {
        let store = InMemoryStore::new();
        let product = Product::new("Desk", Money::from_dollars(120), 5);
        let product_id = product.id;
        store.insert_product(product).await;

        let owner = Caller::user(UserId::new());
        CartService::new(store.clone())
            .add_item(owner, product_id, 2)
            .await
            .unwrap();
        let orders = OrderService::new(store.clone());
        let order_id = orders.place_order(owner).await.unwrap().order.id;

        let fixture = Fixture {
            store,
            orders,
            owner,
            operator: Caller::operator(UserId::new()),
            product_id,
        };
        (fixture, order_id)
    }

    #[tokio::test]
    async fn pay_records_captured_amount() {
        let (f, order_id) = placed_order().await;

        let payment = f.orders.pay(f.owner, order_id, " card ").await.unwrap();

        assert_eq!(payment.amount, Money::from_dollars(240));
        assert_eq!(payment.method, "card");
        let details = f.orders.get_order(f.owner, order_id).await.unwrap();
        assert_eq!(details.order.status, OrderStatus::Paid);
        assert_eq!(details.payment, Some(payment));
    }

    #[tokio::test]
    async fn pay_checks_input_and_ownership() {
        let (f, order_id) = placed_order().await;
        let stranger = Caller::user(UserId::new());

        assert!(matches!(
            f.orders.pay(f.owner, order_id, "   ").await,
            Err(CommerceError::InvalidInput(_))
        ));
        assert!(matches!(
            f.orders.pay(stranger, order_id, "card").await,
            Err(CommerceError::Forbidden(Action::PayOrder))
        ));
        assert!(matches!(
            f.orders.pay(f.owner, OrderId::new(), "card").await,
            Err(CommerceError::OrderNotFound(_))
        ));
        assert_eq!(f.store.payment_count().await, 0);

        // Operators may pay on behalf of the owner.
        f.orders.pay(f.operator, order_id, "cash").await.unwrap();
    }

    #[tokio::test]
    async fn deliver_requires_operator_and_payment() {
        let (f, order_id) = placed_order().await;

        assert!(matches!(
            f.orders.deliver(f.owner, order_id).await,
            Err(CommerceError::Forbidden(Action::DeliverOrder))
        ));
        assert!(matches!(
            f.orders.deliver(f.operator, order_id).await,
            Err(CommerceError::InvalidTransition {
                status: OrderStatus::Pending,
                ..
            })
        ));

        f.orders.pay(f.owner, order_id, "card").await.unwrap();
        let delivered = f.orders.deliver(f.operator, order_id).await.unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);

        assert!(matches!(
            f.orders.pay(f.owner, order_id, "card").await,
            Err(CommerceError::AlreadyPaid(_))
        ));
    }

    #[tokio::test]
    async fn reject_removes_order_and_releases_stock() {
        let (f, order_id) = placed_order().await;
        assert_eq!(f.store.product(f.product_id).await.unwrap().stock_qty, 3);

        assert!(matches!(
            f.orders.reject(f.owner, order_id).await,
            Err(CommerceError::Forbidden(Action::RejectOrder))
        ));

        let rejected = f.orders.reject(f.operator, order_id).await.unwrap();
        assert_eq!(rejected.id, order_id);
        assert_eq!(f.store.order_count().await, 0);
        assert_eq!(f.store.order_item_count().await, 0);
        assert_eq!(f.store.product(f.product_id).await.unwrap().stock_qty, 5);

        assert!(matches!(
            f.orders.get_order(f.operator, order_id).await,
            Err(CommerceError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn paid_orders_cannot_be_rejected() {
        let (f, order_id) = placed_order().await;
        f.orders.pay(f.owner, order_id, "card").await.unwrap();

        assert!(matches!(
            f.orders.reject(f.operator, order_id).await,
            Err(CommerceError::InvalidTransition { action: "reject", .. })
        ));
        assert_eq!(f.store.product(f.product_id).await.unwrap().stock_qty, 3);
    }

    #[tokio::test]
    async fn only_owner_or_operator_can_view() {
        let (f, order_id) = placed_order().await;

        assert!(f.orders.get_order(f.owner, order_id).await.is_ok());
        assert!(f.orders.get_order(f.operator, order_id).await.is_ok());
        assert!(matches!(
            f.orders.get_order(Caller::user(UserId::new()), order_id).await,
            Err(CommerceError::Forbidden(Action::ViewOrder))
        ));
    }
}

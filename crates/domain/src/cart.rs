//! Cart aggregate: a user's in-progress selection.

use common::{Caller, ProductId};
use serde::Serialize;
use store::{Cart, CartItem, Store, StoreTx};

use crate::error::{CommerceError, Result};
use crate::policy::{self, Action};
use crate::retry::RetryPolicy;

/// A read-only view of a user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    /// `None` if the user never added anything.
    pub cart: Option<Cart>,
    pub items: Vec<CartItem>,
}

/// Service for managing carts.
///
/// Every operation runs in its own transaction and is re-run on store
/// conflicts according to the configured [`RetryPolicy`].
#[derive(Clone)]
pub struct CartService<S: Store> {
    store: S,
    retry: RetryPolicy,
}

impl<S: Store> CartService<S> {
    /// Creates a new cart service over the given store.
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

    /// Returns the caller's cart, creating exactly one if absent.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create_cart(&self, caller: Caller) -> Result<Cart> {
        policy::authorize(&caller, Action::ManageOwnCart, Some(caller.user_id))?;

        self.retry
            .run("get_or_create_cart", || async move {
                let mut tx = self.store.begin().await?;
                let cart = tx.upsert_cart(caller.user_id).await?;
                tx.commit().await?;
                Ok(cart)
            })
            .await
    }

    /// Adds `quantity` units of a product, merging into an existing line.
    ///
    /// The stock check here is advisory; stock is only reserved when the order
    /// is placed.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        caller: Caller,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        require_positive(quantity)?;
        policy::authorize(&caller, Action::ManageOwnCart, Some(caller.user_id))?;

        let item = self
            .retry
            .run("add_item", || self.try_add_item(caller, product_id, quantity))
            .await?;

        metrics::counter!("cart_items_added_total").increment(u64::from(quantity));
        tracing::info!(cart_id = %item.cart_id, quantity = item.quantity, "Cart item added");
        Ok(item)
    }

    async fn try_add_item(
        &self,
        caller: Caller,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let mut tx = self.store.begin().await?;

        let product = tx
            .find_product(product_id)
            .await?
            .ok_or(CommerceError::ProductNotFound(product_id))?;
        if product.stock_qty < quantity {
            return Err(CommerceError::InsufficientStock {
                product_id,
                requested: quantity,
                available: product.stock_qty,
            });
        }

        // Cart before line, the lock order placement uses.
        let cart = tx.upsert_cart(caller.user_id).await?;
        if let Some(line) = tx.lock_cart_item(cart.id, product_id).await?
            && line.quantity.checked_add(quantity).is_none()
        {
            return Err(CommerceError::InvalidInput(format!(
                "cart already holds {} of product {product_id}",
                line.quantity
            )));
        }

        let item = tx.add_cart_item(cart.id, product_id, quantity).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Removes `quantity` units of a product from the cart.
    ///
    /// Returns the remaining line, or `None` if the line was removed entirely.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        caller: Caller,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Option<CartItem>> {
        require_positive(quantity)?;
        policy::authorize(&caller, Action::ManageOwnCart, Some(caller.user_id))?;

        self.retry
            .run("remove_item", || async move {
                let mut tx = self.store.begin().await?;
                let cart = tx
                    .lock_cart(caller.user_id)
                    .await?
                    .ok_or(CommerceError::CartNotFound)?;
                let mut item = tx
                    .lock_cart_item(cart.id, product_id)
                    .await?
                    .ok_or(CommerceError::ItemNotFound(product_id))?;

                let remaining = if quantity > item.quantity {
                    return Err(CommerceError::ExceedsQuantity {
                        product_id,
                        requested: quantity,
                        in_cart: item.quantity,
                    });
                } else if quantity == item.quantity {
                    tx.delete_cart_item(item.id).await?;
                    None
                } else {
                    item.quantity -= quantity;
                    tx.set_cart_item_quantity(item.id, item.quantity).await?;
                    Some(item)
                };

                tx.commit().await?;
                Ok(remaining)
            })
            .await
    }

    /// Returns the caller's cart and its lines without creating anything.
    #[tracing::instrument(skip(self))]
    pub async fn view_cart(&self, caller: Caller) -> Result<CartView> {
        policy::authorize(&caller, Action::ManageOwnCart, Some(caller.user_id))?;

        self.retry
            .run("view_cart", || async move {
                let mut tx = self.store.begin().await?;
                let view = match tx.find_cart(caller.user_id).await? {
                    Some(cart) => {
                        let items = tx.cart_items(cart.id).await?;
                        CartView {
                            cart: Some(cart),
                            items,
                        }
                    }
                    None => CartView {
                        cart: None,
                        items: Vec::new(),
                    },
                };
                tx.rollback().await?;
                Ok(view)
            })
            .await
    }
}

pub(crate) fn require_positive(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(CommerceError::InvalidInput(
            "quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

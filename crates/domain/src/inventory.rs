//! Inventory ledger: race-safe stock reservation and release.
//!
//! Both operations run inside the caller's transaction, so a reservation made
//! by a placement that later fails is rolled back with it.

use common::ProductId;
use store::{StockUpdate, StoreTx};

use crate::cart::require_positive;
use crate::error::{CommerceError, Result};

/// Takes `quantity` units out of stock. Returns the remaining stock.
///
/// The decrement is a single conditional update in the store, so concurrent
/// reservations can never take stock below zero.
pub async fn reserve<T: StoreTx>(tx: &mut T, product_id: ProductId, quantity: u32) -> Result<u32> {
    require_positive(quantity)?;

    match tx.decrement_stock(product_id, quantity).await? {
        StockUpdate::Applied { remaining } => {
            tracing::debug!(%product_id, quantity, remaining, "Stock reserved");
            metrics::counter!("stock_reserved_units_total").increment(u64::from(quantity));
            Ok(remaining)
        }
        StockUpdate::Insufficient { available } => Err(CommerceError::InsufficientStock {
            product_id,
            requested: quantity,
            available,
        }),
        StockUpdate::Missing => Err(CommerceError::ProductNotFound(product_id)),
    }
}

/// Returns `quantity` units to stock.
pub async fn release<T: StoreTx>(tx: &mut T, product_id: ProductId, quantity: u32) -> Result<()> {
    if !tx.increment_stock(product_id, quantity).await? {
        return Err(CommerceError::ProductNotFound(product_id));
    }
    tracing::debug!(%product_id, quantity, "Stock released");
    metrics::counter!("stock_released_units_total").increment(u64::from(quantity));
    Ok(())
}

#[cfg(test)]
mod tests {
    use common::Money;
    use store::{InMemoryStore, Product, Store};

    use super::*;

    async fn store_with(stock: u32) -> (InMemoryStore, ProductId) {
        let store = InMemoryStore::new();
        let product = Product::new("Lamp", Money::from_cents(1500), stock);
        let id = product.id;
        store.insert_product(product).await;
        (store, id)
    }

    #[tokio::test]
    async fn reserve_decrements_stock() {
        let (store, id) = store_with(5).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(reserve(&mut tx, id, 3).await.unwrap(), 2);
        tx.commit().await.unwrap();

        assert_eq!(store.product(id).await.unwrap().stock_qty, 2);
    }

    #[tokio::test]
    async fn reserve_refuses_more_than_available() {
        let (store, id) = store_with(2).await;

        let mut tx = store.begin().await.unwrap();
        let err = reserve(&mut tx, id, 3).await.unwrap_err();
        assert!(matches!(
            err,
            CommerceError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        tx.commit().await.unwrap();

        assert_eq!(store.product(id).await.unwrap().stock_qty, 2);
    }

    #[tokio::test]
    async fn reserve_rejects_zero_and_unknown_products() {
        let (store, id) = store_with(2).await;

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            reserve(&mut tx, id, 0).await,
            Err(CommerceError::InvalidInput(_))
        ));
        assert!(matches!(
            reserve(&mut tx, ProductId::new(), 1).await,
            Err(CommerceError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn release_restores_stock() {
        let (store, id) = store_with(1).await;

        let mut tx = store.begin().await.unwrap();
        release(&mut tx, id, 4).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.product(id).await.unwrap().stock_qty, 5);

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            release(&mut tx, ProductId::new(), 1).await,
            Err(CommerceError::ProductNotFound(_))
        ));
    }
}

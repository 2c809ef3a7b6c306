//! Cart endpoints. Every route acts on the caller's own cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use domain::CartView;
use serde::{Deserialize, Serialize};
use store::{CartItem, Store};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::identity::Identity;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct RemoveItemQuery {
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub cart_id: Option<String>,
    pub items: Vec<CartItemResponse>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub product_id: String,
    pub quantity: u32,
}

impl From<CartView> for CartResponse {
    fn from(view: CartView) -> Self {
        Self {
            cart_id: view.cart.map(|cart| cart.id.to_string()),
            items: view.items.iter().map(CartItemResponse::from).collect(),
        }
    }
}

impl From<&CartItem> for CartItemResponse {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
        }
    }
}

// -- Handlers --

/// GET /cart: the caller's cart, empty if none exists yet.
#[tracing::instrument(skip(state))]
pub async fn view<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
) -> Result<Json<CartResponse>, ApiError> {
    let view = state.carts.view_cart(caller).await?;
    Ok(Json(view.into()))
}

/// POST /cart/items: add units of a product to the cart.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> Result<Json<CartItemResponse>, ApiError> {
    let product_id: ProductId = parse_id(&req.product_id, "product_id")?;
    let item = state
        .carts
        .add_item(caller, product_id, req.quantity)
        .await?;
    Ok(Json(CartItemResponse::from(&item)))
}

/// DELETE /cart/items/{product_id}?quantity=N: remove units of a product.
///
/// Responds with the remaining line; quantity 0 means the line is gone.
#[tracing::instrument(skip(state, query))]
pub async fn remove_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(product_id): Path<String>,
    ApiQuery(query): ApiQuery<RemoveItemQuery>,
) -> Result<Json<CartItemResponse>, ApiError> {
    let product_id: ProductId = parse_id(&product_id, "product_id")?;
    let remaining = state
        .carts
        .remove_item(caller, product_id, query.quantity)
        .await?;

    Ok(Json(match remaining {
        Some(item) => CartItemResponse::from(&item),
        None => CartItemResponse {
            product_id: product_id.to_string(),
            quantity: 0,
        },
    }))
}

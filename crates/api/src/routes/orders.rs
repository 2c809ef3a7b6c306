//! Order placement and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::OrderDetails;
use serde::{Deserialize, Serialize};
use store::{Order, OrderItem, Payment, Store};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::identity::Identity;

// -- Request types --

#[derive(Deserialize)]
pub struct PayRequest {
    pub payment_method: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub payment: Option<PaymentResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub payment_method: String,
    pub transaction_ref: String,
}

#[derive(Serialize)]
pub struct OrderStatusResponse {
    pub id: String,
    pub status: String,
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        Self {
            id: details.order.id.to_string(),
            user_id: details.order.user_id.to_string(),
            status: details.order.status.to_string(),
            items: details.items.iter().map(OrderItemResponse::from).collect(),
            total_cents: details.total.cents(),
            payment: details.payment.as_ref().map(PaymentResponse::from),
        }
    }
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
        }
    }
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            order_id: payment.order_id.to_string(),
            amount_cents: payment.amount.cents(),
            status: payment.status.to_string(),
            payment_method: payment.method.clone(),
            transaction_ref: payment.transaction_ref.clone(),
        }
    }
}

impl From<&Order> for OrderStatusResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            status: order.status.to_string(),
        }
    }
}

// -- Handlers --

/// POST /orders: place an order from the caller's cart.
#[tracing::instrument(skip(state))]
pub async fn place<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let details = state.orders.place_order(caller).await?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let details = state.orders.get_order(caller, order_id).await?;
    Ok(Json(details.into()))
}

/// POST /orders/{id}/pay: record the payment of a pending order.
#[tracing::instrument(skip(state, req))]
pub async fn pay<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<PayRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let payment = state
        .orders
        .pay(caller, order_id, &req.payment_method)
        .await?;
    Ok(Json(PaymentResponse::from(&payment)))
}

/// POST /orders/{id}/deliver: operators only.
#[tracing::instrument(skip(state))]
pub async fn deliver<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = state.orders.deliver(caller, order_id).await?;
    Ok(Json(OrderStatusResponse::from(&order)))
}

/// DELETE /orders/{id}: reject a pending order, operators only.
#[tracing::instrument(skip(state))]
pub async fn reject<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    state.orders.reject(caller, order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! HTTP API server with observability for the commerce core.
//!
//! Provides REST endpoints for carts and orders, with structured logging
//! (tracing) and Prometheus metrics. Caller identity arrives in headers set
//! by the authentication gateway; see [`identity::Identity`].

pub mod config;
pub mod error;
pub mod extract;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use domain::{CartService, OrderService, RetryPolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/cart", get(routes::carts::view::<S>))
        .route("/cart/items", post(routes::carts::add_item::<S>))
        .route(
            "/cart/items/{product_id}",
            delete(routes::carts::remove_item::<S>),
        )
        .route("/orders", post(routes::orders::place::<S>))
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>).delete(routes::orders::reject::<S>),
        )
        .route("/orders/{id}/pay", post(routes::orders::pay::<S>))
        .route("/orders/{id}/deliver", post(routes::orders::deliver::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with cart and order services over `store`.
pub fn create_default_state<S: Store + Clone + 'static>(
    store: S,
    retry: RetryPolicy,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        carts: CartService::new(store.clone()).with_retry(retry),
        orders: OrderService::new(store).with_retry(retry),
    })
}

//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Money, ProductId, UserId};
use domain::RetryPolicy;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryStore, Product};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: InMemoryStore,
}

impl TestApp {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let state = api::create_default_state(store.clone(), RetryPolicy::default());
        let app = api::create_app(state, get_metrics_handle());
        Self { app, store }
    }

    async fn product(&self, price_cents: i64, stock: u32) -> ProductId {
        let product = Product::new("Test product", Money::from_cents(price_cents), stock);
        let id = product.id;
        self.store.insert_product(product).await;
        id
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        caller: Option<(UserId, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = caller {
            builder = builder
                .header("x-user-id", user_id.to_string())
                .header("x-user-role", role);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

fn user() -> Option<(UserId, &'static str)> {
    Some((UserId::new(), "user"))
}

fn operator() -> Option<(UserId, &'static str)> {
    Some((UserId::new(), "operator"))
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, json) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = TestApp::new();

    let (status, json) = app.send("GET", "/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains("x-user-id"));

    let bad = Some((UserId::new(), "superuser"));
    let (status, _) = app.send("GET", "/cart", bad, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cart_add_view_and_remove() {
    let app = TestApp::new();
    let product_id = app.product(250, 10).await;
    let caller = user();

    let (status, json) = app.send("GET", "/cart", caller, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["cart_id"].is_null());

    for quantity in [2, 3] {
        let (status, _) = app
            .send(
                "POST",
                "/cart/items",
                caller,
                Some(json!({ "product_id": product_id.to_string(), "quantity": quantity })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, json) = app.send("GET", "/cart", caller, None).await;
    assert!(json["cart_id"].is_string());
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
    assert_eq!(json["items"][0]["quantity"], 5);

    let uri = format!("/cart/items/{product_id}?quantity=4");
    let (status, json) = app.send("DELETE", &uri, caller, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["quantity"], 1);

    let uri = format!("/cart/items/{product_id}?quantity=2");
    let (status, _) = app.send("DELETE", &uri, caller, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/cart/items/{product_id}?quantity=1");
    let (status, json) = app.send("DELETE", &uri, caller, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["quantity"], 0);
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    let app = TestApp::new();
    let product_id = app.product(250, 10).await;
    let caller = user();

    let bodies = [
        Some(json!({ "product_id": product_id.to_string(), "quantity": -1 })),
        Some(json!({ "product_id": product_id.to_string() })),
        None,
    ];
    for body in bodies {
        let (status, json) = app.send("POST", "/cart/items", caller, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    app.send(
        "POST",
        "/cart/items",
        caller,
        Some(json!({ "product_id": product_id.to_string(), "quantity": 2 })),
    )
    .await;
    for uri in [
        format!("/cart/items/{product_id}"),
        format!("/cart/items/{product_id}?quantity=-3"),
    ] {
        let (status, json) = app.send("DELETE", &uri, caller, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    let (_, cart) = app.send("GET", "/cart", caller, None).await;
    assert_eq!(cart["items"][0]["quantity"], 2);

    let (status, json) = app
        .send(
            "POST",
            &format!("/orders/{}/pay", ProductId::new()),
            caller,
            Some(json!({ "method": "card" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_add_item_errors() {
    let app = TestApp::new();
    let product_id = app.product(250, 1).await;
    let caller = user();

    let (status, _) = app
        .send(
            "POST",
            "/cart/items",
            caller,
            Some(json!({ "product_id": product_id.to_string(), "quantity": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            "/cart/items",
            caller,
            Some(json!({ "product_id": ProductId::new().to_string(), "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            "POST",
            "/cart/items",
            caller,
            Some(json!({ "product_id": product_id.to_string(), "quantity": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            "POST",
            "/cart/items",
            caller,
            Some(json!({ "product_id": "not-a-uuid", "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_lifecycle() {
    let app = TestApp::new();
    let product_a = app.product(1000, 5).await;
    let product_b = app.product(500, 5).await;
    let owner = user();
    let operator = operator();

    for (product_id, quantity) in [(product_a, 2), (product_b, 1)] {
        app.send(
            "POST",
            "/cart/items",
            owner,
            Some(json!({ "product_id": product_id.to_string(), "quantity": quantity })),
        )
        .await;
    }

    let (status, json) = app.send("POST", "/orders", owner, None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "PENDING");
    assert_eq!(json["total_cents"], 2500);
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
    let order_id = json["id"].as_str().unwrap().to_string();

    let (_, cart) = app.send("GET", "/cart", owner, None).await;
    assert!(cart["items"].as_array().unwrap().is_empty());

    let (status, _) = app
        .send("GET", &format!("/orders/{order_id}"), user(), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let deliver = format!("/orders/{order_id}/deliver");
    let (status, _) = app.send("POST", &deliver, operator, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let pay = format!("/orders/{order_id}/pay");
    let (status, json) = app
        .send("POST", &pay, owner, Some(json!({ "payment_method": "card" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["amount_cents"], 2500);
    assert_eq!(json["status"], "PAID");
    assert_eq!(json["transaction_ref"], format!("TXN-{order_id}"));

    let (status, _) = app
        .send("POST", &pay, owner, Some(json!({ "payment_method": "card" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app.send("POST", &deliver, owner, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = app.send("POST", &deliver, operator, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "DELIVERED");

    let (status, json) = app
        .send("GET", &format!("/orders/{order_id}"), owner, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "DELIVERED");
    assert_eq!(json["payment"]["payment_method"], "card");
}

#[tokio::test]
async fn test_place_order_errors() {
    let app = TestApp::new();
    let caller = user();

    let (status, _) = app.send("POST", "/orders", caller, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("GET", &format!("/orders/{}", ProductId::new()), caller, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send("GET", "/orders/123", caller, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reject_releases_stock() {
    let app = TestApp::new();
    let product_id = app.product(700, 4).await;
    let owner = user();

    app.send(
        "POST",
        "/cart/items",
        owner,
        Some(json!({ "product_id": product_id.to_string(), "quantity": 3 })),
    )
    .await;
    let (_, json) = app.send("POST", "/orders", owner, None).await;
    let order_id = json["id"].as_str().unwrap().to_string();
    assert_eq!(app.store.product(product_id).await.unwrap().stock_qty, 1);

    let uri = format!("/orders/{order_id}");
    let (status, _) = app.send("DELETE", &uri, owner, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("DELETE", &uri, operator(), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.store.product(product_id).await.unwrap().stock_qty, 4);

    let (status, _) = app.send("GET", &uri, owner, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new();
    let product_id = app.product(100, 1).await;
    let caller = user();
    app.send(
        "POST",
        "/cart/items",
        caller,
        Some(json!({ "product_id": product_id.to_string(), "quantity": 1 })),
    )
    .await;
    app.send("POST", "/orders", caller, None).await;

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_placed_total"));
}

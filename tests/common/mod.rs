#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uniform_ops_api::{
    config::AppConfig,
    db,
    events::{self},
    services::inventory::StockPolicy,
    AppState,
};

/// Application backed by a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

/// Status plus decoded JSON body of a response.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    /// The `data` member of a success envelope.
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_policy(StockPolicy::Reject).await
    }

    pub async fn with_policy(policy: StockPolicy) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.stock_policy = policy;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, Some(Arc::new(event_sender)));
        let router = uniform_ops_api::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None).await
    }

    /// Restocks a key through the HTTP surface.
    pub async fn restock(&self, product_type: &str, level: &str, size: Option<&str>, quantity: i32) -> Value {
        let response = self
            .post(
                "/api/inventory",
                json!({ "productType": product_type, "level": level, "size": size, "quantity": quantity }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.data().clone()
    }

    /// Creates a PENDING order with the given `(productType, level, size, quantity, unitPrice)` lines.
    pub async fn create_order(&self, lines: &[(&str, &str, Option<&str>, i32, &str)]) -> Value {
        let order_items: Vec<Value> = lines
            .iter()
            .map(|(product_type, level, size, quantity, unit_price)| {
                json!({
                    "productType": product_type,
                    "level": level,
                    "size": size,
                    "quantity": quantity,
                    "unitPrice": unit_price,
                })
            })
            .collect();
        let response = self
            .post(
                "/api/order",
                json!({
                    "studentNumber": "2024-0001",
                    "studentName": "Ana Cruz",
                    "contactNumber": "09170000000",
                    "orderItems": order_items,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.data().clone()
    }

    pub async fn claim(&self, order_id: &str) -> TestResponse {
        self.put(&format!("/api/order/{order_id}"), json!({ "status": "CLAIMED" }))
            .await
    }

    /// Current stock entry for a key, if any.
    pub async fn stock(&self, product_type: &str, level: &str, size: Option<&str>) -> Option<Value> {
        let response = self.get("/api/inventory?limit=100").await;
        assert_eq!(response.status, StatusCode::OK);
        response.data()["items"]
            .as_array()
            .expect("items array")
            .iter()
            .find(|entry| {
                entry["productType"] == product_type
                    && entry["level"] == level
                    && entry["size"].as_str() == size
            })
            .cloned()
    }

    /// Sales aggregate row for a key, if any.
    pub async fn sales_report(&self, product_type: &str, level: &str, size: Option<&str>) -> Option<Value> {
        let response = self.get("/api/sales-report?limit=100").await;
        assert_eq!(response.status, StatusCode::OK);
        response.data()["items"]
            .as_array()
            .expect("items array")
            .iter()
            .find(|row| {
                row["productType"] == product_type
                    && row["level"] == level
                    && row["size"].as_str() == size
            })
            .cloned()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads a decimal that may be encoded as a JSON string or number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}

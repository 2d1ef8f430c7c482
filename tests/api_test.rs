mod common;

use axum::http::StatusCode;
use common::{decimal, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

async fn register(app: &TestApp, name: &str, email: &str) -> serde_json::Value {
    let response = app
        .post(
            "/api/user",
            json!({ "name": name, "email": email, "password": "sewing-room-3" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    response.data().clone()
}

#[tokio::test]
async fn health_endpoints_report_up() {
    let app = TestApp::new().await;

    let live = app.get("/health").await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(live.body["status"], "up");

    let ready = app.get("/health/ready").await;
    assert_eq!(ready.status, StatusCode::OK);
    assert_eq!(ready.body["details"]["database"]["status"], "up");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let response = app.get("/api-docs/openapi.json").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["paths"]["/api/order/{id}"].is_object());
}

#[tokio::test]
async fn user_registration_and_login() {
    let app = TestApp::new().await;
    let user = register(&app, "Maria Santos", "Maria@Example.com").await;
    assert_eq!(user["email"], "maria@example.com");
    assert!(user.get("passwordHash").is_none());
    assert!(user.get("password").is_none());

    let duplicate = app
        .post(
            "/api/user",
            json!({ "name": "Someone Else", "email": "maria@example.com", "password": "sewing-room-3" }),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let wrong = app
        .post(
            "/api/user/login",
            json!({ "email": "maria@example.com", "password": "nope-nope-nope" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let ok = app
        .post(
            "/api/user/login",
            json!({ "email": "MARIA@example.com", "password": "sewing-room-3" }),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK, "{}", ok.body);
    assert_eq!(ok.data()["id"], user["id"]);
}

#[tokio::test]
async fn legacy_password_hash_field_registers() {
    let app = TestApp::new().await;
    let response = app
        .post(
            "/api/user",
            json!({ "name": "Jo Lim", "email": "jo@example.com", "passwordHash": "sewing-room-3" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

    let ok = app
        .post(
            "/api/user/login",
            json!({ "email": "jo@example.com", "password": "sewing-room-3" }),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);
}

#[tokio::test]
async fn invalid_payload_is_a_bad_request() {
    let app = TestApp::new().await;
    let response = app
        .post(
            "/api/user",
            json!({ "name": "", "email": "not-an-email", "password": "sewing-room-3" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_prices_must_fit_money_columns() {
    let app = TestApp::new().await;
    let order = |quantity: i32, unit_price: &str| {
        json!({
            "studentNumber": "2024-0002",
            "studentName": "Ben Reyes",
            "contactNumber": "09170000001",
            "orderItems": [
                { "productType": "Polo", "level": "Grade7", "size": "M", "quantity": quantity, "unitPrice": unit_price }
            ],
        })
    };

    for (quantity, unit_price) in [
        (2, "79228162514264337593543950335"),
        (1, "1000000000000"),
        (2, "999999999999.99"),
        (1, "0.333"),
    ] {
        let response = app.post("/api/order", order(quantity, unit_price)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{unit_price}: {}", response.body);
    }

    let listed = app.get("/api/order").await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.data()["total"], 0);

    let accepted = app.post("/api/order", order(1, "999999999999.99")).await;
    assert_eq!(accepted.status, StatusCode::CREATED, "{}", accepted.body);
    let created = app.create_order(&[("Polo", "Grade7", Some("M"), 1, "10")]).await;
    let response = app
        .put(
            &format!("/api/order/{}", created["id"].as_str().unwrap()),
            json!({
                "status": "CLAIMED",
                "orderItems": [
                    { "productType": "Polo", "level": "Grade7", "size": "M", "quantity": 2, "unitPrice": "79228162514264337593543950335" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", response.body);
}

#[tokio::test]
async fn orders_need_at_least_one_line() {
    let app = TestApp::new().await;
    let response = app
        .post(
            "/api/order",
            json!({
                "studentNumber": "2024-0003",
                "studentName": "Cara Lim",
                "contactNumber": "09170000002",
                "orderItems": [],
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", response.body);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let app = TestApp::new().await;
    let id = uuid::Uuid::new_v4();
    for uri in [
        format!("/api/user/{id}"),
        format!("/api/order/{id}"),
        format!("/api/inventory/{id}"),
        format!("/api/order-items/order/{id}"),
        format!("/api/sales-report/{id}"),
    ] {
        let response = app.get(&uri).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn raw_material_post_upserts_and_put_detects_collisions() {
    let app = TestApp::new().await;

    let created = app
        .post(
            "/api/raw-material-inventory",
            json!({ "rawMaterialType": "Cotton", "quantity": 10, "unit": "m" }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let cotton_id = created.data()["id"].clone();

    let restated = app
        .post(
            "/api/raw-material-inventory",
            json!({ "rawMaterialType": "Cotton", "quantity": 0, "unit": "m" }),
        )
        .await;
    assert_eq!(restated.status, StatusCode::OK);
    assert_eq!(restated.data()["id"], cotton_id);
    assert_eq!(restated.data()["status"], "OUT_OF_STOCK");

    let thread = app
        .post(
            "/api/raw-material-inventory",
            json!({ "rawMaterialType": "Thread", "quantity": 4 }),
        )
        .await;
    assert_eq!(thread.status, StatusCode::CREATED);
    let thread_id = thread.data()["id"].as_str().unwrap().to_string();

    let collision = app
        .put(
            &format!("/api/raw-material-inventory/{thread_id}"),
            json!({ "rawMaterialType": "Cotton", "quantity": 4 }),
        )
        .await;
    assert_eq!(collision.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn order_items_are_listed_per_order() {
    let app = TestApp::new().await;
    let order = app
        .create_order(&[
            ("Polo", "Grade7", Some("M"), 2, "10"),
            ("Skirt", "Grade7", None, 1, "12.50"),
        ])
        .await;
    assert_eq!(decimal(&order["totalPrice"]), dec!(32.50));

    let response = app
        .get(&format!("/api/order-items/order/{}", order["id"].as_str().unwrap()))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let items = response.data().as_array().unwrap();
    assert_eq!(items.len(), 2);
    let polo = items.iter().find(|item| item["productType"] == "Polo").unwrap();
    assert_eq!(decimal(&polo["totalPrice"]), dec!(20));
}

#[tokio::test]
async fn sales_report_reconcile_is_idempotent() {
    let app = TestApp::new().await;

    let missing = app
        .post(
            "/api/sales-report",
            json!({ "productType": "Polo", "level": "Grade7", "size": "M" }),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    app.restock("Polo", "Grade7", Some("M"), 10).await;
    let order = app.create_order(&[("Polo", "Grade7", Some("M"), 3, "10")]).await;
    assert_eq!(app.claim(order["id"].as_str().unwrap()).await.status, StatusCode::OK);

    for _ in 0..2 {
        let response = app
            .post(
                "/api/sales-report",
                json!({ "productType": "Polo", "level": "Grade7", "size": "M" }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        assert_eq!(decimal(&response.data()["totalRevenue"]), dec!(30));
    }
}

#[tokio::test]
async fn completing_production_moves_quantity_into_stock() {
    let app = TestApp::new().await;
    let user = register(&app, "Lito Garcia", "lito@example.com").await;

    let created = app
        .post(
            "/api/production",
            json!({
                "email": "lito@example.com",
                "level": "Grade7",
                "productType": "Polo",
                "size": "M",
                "quantity": 12
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.data()["status"], "PENDING");
    assert_eq!(created.data()["userId"], user["id"]);
    let id = created.data()["id"].as_str().unwrap().to_string();

    let completed = app
        .put(&format!("/api/production/{id}"), json!({ "status": "COMPLETED" }))
        .await;
    assert_eq!(completed.status, StatusCode::OK, "{}", completed.body);
    assert!(completed.data()["productionEndTime"].is_string());

    let stock = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(stock["quantity"], 12);

    let finished = app.get("/api/finished-product").await;
    let rows = finished.data()["items"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["quantity"], 12);

    let again = app
        .put(&format!("/api/production/{id}"), json!({ "quantity": 5 }))
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    let stock = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(stock["quantity"], 12);

    let by_name = app.get("/api/production/name/lito").await;
    assert_eq!(by_name.status, StatusCode::OK);
    assert_eq!(by_name.data()["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn production_for_unknown_user_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .post(
            "/api/production",
            json!({ "email": "ghost@example.com", "level": "Grade7", "productType": "Polo", "quantity": 1 }),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_endpoints_paginate() {
    let app = TestApp::new().await;
    for level in ["Grade7", "Grade8", "Grade9"] {
        app.restock("Polo", level, Some("M"), 1).await;
    }
    let response = app.get("/api/inventory?page=2&limit=2").await;
    assert_eq!(response.status, StatusCode::OK);
    let data = response.data();
    assert_eq!(data["total"], 3);
    assert_eq!(data["page"], 2);
    assert_eq!(data["totalPages"], 2);
    assert_eq!(data["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn responses_echo_request_id() {
    let app = TestApp::new().await;
    let response = app.get("/api/order").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["meta"]["requestId"].is_string());
}

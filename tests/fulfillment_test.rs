mod common;

use axum::http::StatusCode;
use common::{decimal, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uniform_ops_api::services::inventory::StockPolicy;

#[tokio::test]
async fn claiming_decrements_stock_and_records_revenue() {
    let app = TestApp::new().await;
    app.restock("Polo", "Grade7", Some("M"), 5).await;
    let order = app.create_order(&[("Polo", "Grade7", Some("M"), 3, "10")]).await;
    assert_eq!(order["status"], "PENDING");
    assert_eq!(decimal(&order["totalPrice"]), dec!(30));

    let claimed = app.claim(order["id"].as_str().unwrap()).await;
    assert_eq!(claimed.status, StatusCode::OK, "{}", claimed.body);
    assert_eq!(claimed.data()["status"], "CLAIMED");

    let stock = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(stock["quantity"], 2);
    assert_eq!(stock["status"], "IN_STOCK");

    let report = app.sales_report("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(decimal(&report["totalRevenue"]), dec!(30));
}

#[tokio::test]
async fn reject_policy_leaves_everything_unchanged_on_shortfall() {
    let app = TestApp::with_policy(StockPolicy::Reject).await;
    app.restock("Polo", "Grade7", Some("M"), 1).await;
    let drained = app
        .post(
            "/api/inventory/adjust",
            json!({ "productType": "Polo", "level": "Grade7", "size": "M", "quantity": 1 }),
        )
        .await;
    assert_eq!(drained.status, StatusCode::OK);
    assert_eq!(drained.data()["status"], "OUT_OF_STOCK");

    let order = app.create_order(&[("Polo", "Grade7", Some("M"), 1, "10")]).await;
    let order_id = order["id"].as_str().unwrap();
    let response = app.claim(order_id).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);

    let stock = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(stock["quantity"], 0);
    let stored = app.get(&format!("/api/order/{order_id}")).await;
    assert_eq!(stored.data()["status"], "PENDING");
    assert!(app.sales_report("Polo", "Grade7", Some("M")).await.is_none());
}

#[tokio::test]
async fn reject_policy_rolls_back_satisfiable_lines_when_another_falls_short() {
    let app = TestApp::with_policy(StockPolicy::Reject).await;
    app.restock("Polo", "Grade7", Some("M"), 5).await;
    app.restock("Pants", "Grade7", Some("L"), 1).await;
    let order = app
        .create_order(&[
            ("Polo", "Grade7", Some("M"), 3, "10"),
            ("Pants", "Grade7", Some("L"), 2, "12.50"),
        ])
        .await;
    let order_id = order["id"].as_str().unwrap();

    let response = app.claim(order_id).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY, "{}", response.body);

    let polo = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(polo["quantity"], 5);
    let pants = app.stock("Pants", "Grade7", Some("L")).await.unwrap();
    assert_eq!(pants["quantity"], 1);
    let stored = app.get(&format!("/api/order/{order_id}")).await;
    assert_eq!(stored.data()["status"], "PENDING");
    assert!(app.sales_report("Polo", "Grade7", Some("M")).await.is_none());
    assert!(app.sales_report("Pants", "Grade7", Some("L")).await.is_none());
}

#[tokio::test]
async fn claiming_several_keys_decrements_each_by_its_line() {
    let app = TestApp::new().await;
    app.restock("Polo", "Grade7", Some("M"), 5).await;
    app.restock("Pants", "Grade7", Some("L"), 4).await;
    let lines = [
        ("Polo", "Grade7", Some("M"), 3, "10"),
        ("Pants", "Grade7", Some("L"), 2, "12.50"),
    ];
    let order = app.create_order(&lines).await;

    let response = app.claim(order["id"].as_str().unwrap()).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);

    let polo = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    let pants = app.stock("Pants", "Grade7", Some("L")).await.unwrap();
    assert_eq!(polo["quantity"], 2);
    assert_eq!(pants["quantity"], 2);
    let removed = (5 - polo["quantity"].as_i64().unwrap()) + (4 - pants["quantity"].as_i64().unwrap());
    let ordered: i64 = lines.iter().map(|line| i64::from(line.3)).sum();
    assert_eq!(removed, ordered);

    let polo_report = app.sales_report("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(decimal(&polo_report["totalRevenue"]), dec!(30));
    let pants_report = app.sales_report("Pants", "Grade7", Some("L")).await.unwrap();
    assert_eq!(decimal(&pants_report["totalRevenue"]), dec!(25));
}

#[tokio::test]
async fn clamp_policy_floors_stock_at_zero() {
    let app = TestApp::with_policy(StockPolicy::Clamp).await;
    app.restock("Polo", "Grade7", Some("M"), 2).await;
    let order = app.create_order(&[("Polo", "Grade7", Some("M"), 3, "10")]).await;

    let response = app.claim(order["id"].as_str().unwrap()).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);

    let stock = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(stock["quantity"], 0);
    assert_eq!(stock["status"], "OUT_OF_STOCK");
}

#[tokio::test]
async fn concurrent_claims_under_reject_allow_exactly_one() {
    let app = TestApp::with_policy(StockPolicy::Reject).await;
    app.restock("Polo", "Grade7", Some("M"), 4).await;
    let first = app.create_order(&[("Polo", "Grade7", Some("M"), 2, "10")]).await;
    let second = app.create_order(&[("Polo", "Grade7", Some("M"), 3, "10")]).await;

    let (a, b) = tokio::join!(
        app.claim(first["id"].as_str().unwrap()),
        app.claim(second["id"].as_str().unwrap())
    );
    let successes = [a.status, b.status]
        .iter()
        .filter(|status| **status == StatusCode::OK)
        .count();
    assert_eq!(successes, 1, "first: {} second: {}", a.body, b.body);

    let stock = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    let remaining = stock["quantity"].as_i64().unwrap();
    assert!(remaining == 2 || remaining == 1, "unexpected stock {remaining}");
}

#[tokio::test]
async fn concurrent_claims_under_allow_negative_apply_both() {
    let app = TestApp::with_policy(StockPolicy::AllowNegative).await;
    app.restock("Polo", "Grade7", Some("M"), 4).await;
    let first = app.create_order(&[("Polo", "Grade7", Some("M"), 2, "10")]).await;
    let second = app.create_order(&[("Polo", "Grade7", Some("M"), 3, "10")]).await;

    let claims = futures::future::join_all([
        app.claim(first["id"].as_str().unwrap()),
        app.claim(second["id"].as_str().unwrap()),
    ])
    .await;
    assert!(claims.iter().all(|r| r.status == StatusCode::OK));

    let stock = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(stock["quantity"], -1);
    assert_eq!(stock["status"], "OUT_OF_STOCK");

    let report = app.sales_report("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(decimal(&report["totalRevenue"]), dec!(50));
}

#[tokio::test]
async fn reclaiming_is_a_conflict_without_side_effects() {
    let app = TestApp::new().await;
    app.restock("Polo", "Grade7", Some("M"), 5).await;
    let order = app.create_order(&[("Polo", "Grade7", Some("M"), 2, "15")]).await;
    let order_id = order["id"].as_str().unwrap();

    assert_eq!(app.claim(order_id).await.status, StatusCode::OK);
    let again = app.claim(order_id).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let stock = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(stock["quantity"], 3);
    let report = app.sales_report("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(decimal(&report["totalRevenue"]), dec!(30));
}

#[tokio::test]
async fn leaving_claimed_is_rejected() {
    let app = TestApp::new().await;
    app.restock("Polo", "Grade7", Some("M"), 5).await;
    let order = app.create_order(&[("Polo", "Grade7", Some("M"), 1, "10")]).await;
    let order_id = order["id"].as_str().unwrap();
    assert_eq!(app.claim(order_id).await.status, StatusCode::OK);

    let response = app
        .put(&format!("/api/order/{order_id}"), json!({ "status": "PENDING" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_stock_entry_is_skipped_but_revenue_is_recorded() {
    let app = TestApp::new().await;
    let order = app.create_order(&[("Skirt", "Grade9", Some("S"), 2, "20")]).await;

    let response = app.claim(order["id"].as_str().unwrap()).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);

    assert!(app.stock("Skirt", "Grade9", Some("S")).await.is_none());
    let report = app.sales_report("Skirt", "Grade9", Some("S")).await.unwrap();
    assert_eq!(decimal(&report["totalRevenue"]), dec!(40));
}

#[tokio::test]
async fn supplied_lines_drive_fulfillment_and_total() {
    let app = TestApp::new().await;
    app.restock("Polo", "Grade7", Some("M"), 10).await;
    let order = app.create_order(&[("Polo", "Grade7", Some("M"), 1, "10")]).await;
    let order_id = order["id"].as_str().unwrap();

    let response = app
        .put(
            &format!("/api/order/{order_id}"),
            json!({
                "status": "claimed",
                "orderItems": [
                    { "productType": "Polo", "level": "Grade7", "size": "M", "quantity": 4, "unitPrice": "10", "totalPrice": "1" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(decimal(&response.data()["totalPrice"]), dec!(40));
    // Stored lines are left as they were.
    assert_eq!(response.data()["orderItems"][0]["quantity"], 1);

    let stock = app.stock("Polo", "Grade7", Some("M")).await.unwrap();
    assert_eq!(stock["quantity"], 6);
}

#[tokio::test]
async fn orders_cannot_be_created_claimed() {
    let app = TestApp::new().await;
    let response = app
        .post(
            "/api/order",
            json!({
                "studentNumber": "2024-0002",
                "studentName": "Ben Reyes",
                "contactNumber": "09171111111",
                "status": "CLAIMED",
                "orderItems": [
                    { "productType": "Polo", "level": "Grade7", "size": "M", "quantity": 1, "unitPrice": "10" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

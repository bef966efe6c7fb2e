//! Payment callback and provider webhook reconciliation.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp, TEST_WEBHOOK_SECRET};
use food_order_api::services::stripe::sign_webhook_payload;
use serde_json::{json, Value};

async fn place_order(app: &TestApp, token: &str) -> String {
    let body = response_json(
        app.request(
            Method::POST,
            "/api/order/place",
            Some(json!({
                "items": [{ "name": "Thali", "price": 250, "quantity": 1 }],
                "amount": 270,
                "address": { "city": "Pune" }
            })),
            Some(token),
        )
        .await,
    )
    .await;
    body["orderId"].as_str().expect("order id").to_string()
}

async fn verify(app: &TestApp, order_id: &str, success: Value) -> Value {
    let response = app
        .request(
            Method::POST,
            "/api/order/verify",
            Some(json!({ "orderId": order_id, "success": success })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await
}

async fn user_orders(app: &TestApp, token: &str) -> Vec<Value> {
    let body = response_json(
        app.request(Method::POST, "/api/order/userOrders", None, Some(token))
            .await,
    )
    .await;
    body["data"].as_array().cloned().unwrap_or_default()
}

#[tokio::test]
async fn confirmed_payment_marks_order_paid_idempotently() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("asha@example.com").await;
    let order_id = place_order(&app, &token).await;
    app.provider.set_payment_status("paid");

    let body = verify(&app, &order_id, json!("true")).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Paid");

    let body = verify(&app, &order_id, json!(true)).await;
    assert_eq!(body["success"], true);

    let orders = user_orders(&app, &token).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["payment"], true);
}

#[tokio::test]
async fn cancelled_payment_deletes_the_order() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("asha@example.com").await;
    let order_id = place_order(&app, &token).await;

    let body = verify(&app, &order_id, json!("false")).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Not Paid");
    assert!(user_orders(&app, &token).await.is_empty());

    // repeating the callback for a removed order is harmless
    let body = verify(&app, &order_id, json!("false")).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Order not found");
}

#[tokio::test]
async fn unconfirmed_success_leaves_order_pending() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("asha@example.com").await;
    let order_id = place_order(&app, &token).await;

    let body = verify(&app, &order_id, json!("true")).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Payment not confirmed");

    let orders = user_orders(&app, &token).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["payment"], false);
}

#[tokio::test]
async fn client_flag_is_trusted_when_provider_check_is_off() {
    let app = TestApp::with_config(|cfg| cfg.verify_payment_with_provider = false).await;
    let (_, token) = app.customer("asha@example.com").await;
    let order_id = place_order(&app, &token).await;

    let body = verify(&app, &order_id, json!("true")).await;
    assert_eq!(body["message"], "Paid");
    assert_eq!(user_orders(&app, &token).await[0]["payment"], true);
}

#[tokio::test]
async fn malformed_verify_requests_are_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/order/verify", Some(json!({ "success": "true" })), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/order/verify",
            Some(json!({ "orderId": "not-an-id", "success": "true" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

fn completed_event(order_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": format!("cs_test_{}", order_id),
                "payment_status": "paid",
                "client_reference_id": order_id
            }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn signed_webhook_settles_the_order() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("asha@example.com").await;
    let order_id = place_order(&app, &token).await;

    let payload = completed_event(&order_id);
    let signature =
        sign_webhook_payload(&payload, TEST_WEBHOOK_SECRET, chrono::Utc::now().timestamp());
    let response = app
        .post_raw(
            "/api/order/webhook",
            payload,
            &[("stripe-signature", signature.as_str()), ("content-type", "application/json")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["received"], true);

    assert_eq!(user_orders(&app, &token).await[0]["payment"], true);
}

#[tokio::test]
async fn webhook_with_bad_signature_changes_nothing() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("asha@example.com").await;
    let order_id = place_order(&app, &token).await;

    let payload = completed_event(&order_id);
    let signature = sign_webhook_payload(&payload, "whsec_other", chrono::Utc::now().timestamp());
    let response = app
        .post_raw("/api/order/webhook", payload.clone(), &[("stripe-signature", signature.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.post_raw("/api/order/webhook", payload, &[]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(user_orders(&app, &token).await[0]["payment"], false);
}

use actix_web::{http::StatusCode, test::TestRequest};
use kiosk_common::wire::API_KEY_HEADER;
use serde_json::json;

use super::helpers::{json, TestContext};

#[actix_web::test]
async fn requests_without_the_key_are_rejected() {
    let ctx = TestContext::with_api_key("kiosk-secret");
    let (status, body) = ctx.send(TestRequest::get().uri("/sessions/active")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&body)["error"], "Missing or invalid API key. The X-API-Key header is required.");

    let req = TestRequest::post()
        .uri("/sessions/ORD-1/cash")
        .insert_header((API_KEY_HEADER, "guess"))
        .set_json(json!({"amountAdded": 100}));
    let (status, _) = ctx.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn requests_with_the_key_are_served() {
    let ctx = TestContext::with_api_key("kiosk-secret");
    let (status, _) = ctx.post("/sessions", json!({"orderId": "ORD-1", "totalRequired": 10})).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = ctx.get("/sessions/active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body).as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn health_needs_no_key() {
    let ctx = TestContext::with_api_key("kiosk-secret");
    let (status, _) = ctx.send(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

use actix_web::http::StatusCode;
use serde_json::json;

use super::helpers::{json, TestContext};

#[actix_web::test]
async fn cash_payment_flow() {
    let ctx = TestContext::new();
    let (status, body) = ctx.post("/sessions", json!({"orderId": "ORD-1", "totalRequired": 250.00})).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let session = json(&body);
    assert_eq!(session["status"], "Active");
    assert_eq!(session["amountRemaining"], 250.0);

    let (status, body) = ctx.post("/sessions/ORD-1/cash", json!({"amountAdded": 100.00})).await;
    assert_eq!(status, StatusCode::OK);
    let update = json(&body);
    assert_eq!(update["amountInserted"], 100.0);
    assert_eq!(update["isComplete"], false);

    let (_, body) = ctx.post("/sessions/ORD-1/cash", json!({"amountAdded": "150.00"})).await;
    let update = json(&body);
    assert_eq!(update["amountInserted"], 250.0);
    assert_eq!(update["isComplete"], true);
    assert_eq!(update["status"], "Completed");
    assert_eq!(ctx.queue.jobs_for_order(&"ORD-1".into()).await.len(), 1);

    // Cash arriving after completion changes nothing
    let (status, body) = ctx.post("/sessions/ORD-1/cash", json!({"amountAdded": 10.00})).await;
    assert_eq!(status, StatusCode::OK);
    let update = json(&body);
    assert_eq!(update["amountInserted"], 250.0);
    assert_eq!(update["isComplete"], true);
    assert_eq!(update["applied"], false);
    assert_eq!(ctx.queue.jobs_for_order(&"ORD-1".into()).await.len(), 1);

    let (_, body) = ctx.get("/sessions/active").await;
    assert_eq!(json(&body), json!([]));

    let (status, body) = ctx.get("/sessions/ORD-1").await;
    assert_eq!(status, StatusCode::OK);
    let session = json(&body);
    assert_eq!(session["status"], "Completed");
    assert!(session["completedAt"].is_string());
}

#[actix_web::test]
async fn creating_twice_returns_the_existing_session() {
    let ctx = TestContext::new();
    let (status, _) = ctx.post("/sessions", json!({"orderId": "ORD-2", "totalRequired": 80})).await;
    assert_eq!(status, StatusCode::CREATED);
    ctx.post("/sessions/ORD-2/cash", json!({"amountAdded": 20})).await;
    let (status, body) = ctx.post("/sessions", json!({"orderId": "ORD-2", "totalRequired": 80})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["amountInserted"], 20.0);
}

#[actix_web::test]
async fn active_is_not_mistaken_for_an_order_id() {
    let ctx = TestContext::new();
    ctx.post("/sessions", json!({"orderId": "ORD-A", "totalRequired": 50})).await;
    ctx.post("/sessions", json!({"orderId": "ORD-B", "totalRequired": 75.5})).await;
    let (status, body) = ctx.get("/sessions/active").await;
    assert_eq!(status, StatusCode::OK);
    let active = json(&body);
    let active = active.as_array().unwrap();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0]["orderId"], "ORD-A");
    assert_eq!(active[1]["totalRequired"], 75.5);
    assert!(active[0]["startedAt"].is_string());
}

#[actix_web::test]
async fn unknown_sessions_are_not_found() {
    let ctx = TestContext::new();
    let (status, body) = ctx.post("/sessions/ORD-404/cash", json!({"amountAdded": 20})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "Not found. No payment session exists for order ORD-404");
    let (status, _) = ctx.get("/sessions/ORD-404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = ctx.post_empty("/sessions/ORD-404/cancel").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn invalid_amounts_are_rejected() {
    let ctx = TestContext::new();
    let (status, _) = ctx.post("/sessions", json!({"orderId": "ORD-3", "totalRequired": 0})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = ctx.post("/sessions", json!({"orderId": "  ", "totalRequired": 10})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.post("/sessions", json!({"orderId": "ORD-3", "totalRequired": 10})).await;
    let (status, body) = ctx.post("/sessions/ORD-3/cash", json!({"amountAdded": -5})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].is_string());
    let (status, _) = ctx.post("/sessions/ORD-3/cash", json!({"amountAdded": "12.345"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = ctx.post("/sessions/ORD-3/cash", json!({"amount": 5})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let session = ctx.store.get_session(&"ORD-3".into()).await.unwrap();
    assert!(session.amount_inserted.is_zero());
}

#[actix_web::test]
async fn replayed_cash_events_are_counted_once() {
    let ctx = TestContext::new();
    ctx.post("/sessions", json!({"orderId": "ORD-4", "totalRequired": 100})).await;
    let update = json!({"amountAdded": 50, "eventId": "edge-0001"});
    let (_, first) = ctx.post("/sessions/ORD-4/cash", update.clone()).await;
    let (_, replay) = ctx.post("/sessions/ORD-4/cash", update).await;
    assert_eq!(json(&first)["applied"], true);
    assert_eq!(json(&replay)["applied"], false);
    assert_eq!(json(&replay)["amountInserted"], 50.0);
}

#[actix_web::test]
async fn cancel_returns_the_inserted_cash() {
    let ctx = TestContext::new();
    ctx.post("/sessions", json!({"orderId": "ORD-5", "totalRequired": 300})).await;
    ctx.post("/sessions/ORD-5/cash", json!({"amountAdded": 100})).await;
    let (status, body) = ctx.post_empty("/sessions/ORD-5/cancel").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), json!({"amountReturned": 100.0, "status": "Cancelled"}));
    let (_, body) = ctx.post_empty("/sessions/ORD-5/cancel").await;
    assert_eq!(json(&body), json!({"amountReturned": 0.0, "status": "Cancelled"}));
    let (_, body) = ctx.post("/sessions/ORD-5/cash", json!({"amountAdded": 20})).await;
    assert_eq!(json(&body)["status"], "Cancelled");
    assert_eq!(json(&body)["isComplete"], false);
    assert!(ctx.queue.jobs().await.is_empty());
}

use actix_web::http::StatusCode;
use cash_ledger::PrintJobState;
use serde_json::json;

use super::helpers::{json, TestContext};

#[actix_web::test]
async fn empty_queue_is_no_content() {
    let ctx = TestContext::new();
    let (status, body) = ctx.get("/print-jobs/next").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[actix_web::test]
async fn completed_session_receipt_is_delivered_once() {
    let ctx = TestContext::new();
    let receipt = json!({"restaurantName": "Bochog's", "items": [{"name": "Sisig", "quantity": 1, "price": 180}]});
    ctx.post("/sessions", json!({"orderId": "ORD-1", "totalRequired": 180, "receipt": receipt})).await;
    ctx.post("/sessions/ORD-1/cash", json!({"amountAdded": 200})).await;

    let (status, body) = ctx.get("/print-jobs/next").await;
    assert_eq!(status, StatusCode::OK);
    let job = json(&body);
    assert_eq!(job["orderId"], "ORD-1");
    assert_eq!(job["receiptPayload"]["restaurantName"], "Bochog's");
    assert_eq!(job["receiptPayload"]["change"], 20.0);
    let job_id = job["jobId"].as_str().unwrap().to_string();

    // Dispatched jobs are not handed out again
    let (status, _) = ctx.get("/print-jobs/next").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = ctx.post_empty(&format!("/print-jobs/{job_id}/complete")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["success"], true);
    // Acknowledging twice is harmless
    let (status, _) = ctx.post_empty(&format!("/print-jobs/{job_id}/complete")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ctx.get("/print-jobs/next").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn failed_jobs_are_retried_then_abandoned() {
    let ctx = TestContext::new();
    let (status, body) = ctx.post("/print-jobs", json!({"orderId": "ORD-9", "receiptPayload": {"orderNumber": 9}})).await;
    assert_eq!(status, StatusCode::CREATED);
    let job_id = json(&body)["jobId"].as_str().unwrap().to_string();

    for attempt in 1..=3 {
        let (status, body) = ctx.get("/print-jobs/next").await;
        assert_eq!(status, StatusCode::OK, "attempt {attempt}");
        assert_eq!(json(&body)["jobId"], job_id.as_str());
        let (status, _) =
            ctx.post(&format!("/print-jobs/{job_id}/failed"), json!({"reason": "Printer out of paper"})).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = ctx.get("/print-jobs/next").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let job = ctx.queue.job(&job_id).await.unwrap();
    assert_eq!(job.state, PrintJobState::Failed);
    assert_eq!(job.last_error.as_deref(), Some("Printer out of paper"));
}

#[actix_web::test]
async fn failure_reason_is_optional() {
    let ctx = TestContext::new();
    ctx.post("/print-jobs", json!({"orderId": "ORD-8", "receiptPayload": {}})).await;
    let (_, body) = ctx.get("/print-jobs/next").await;
    let job_id = json(&body)["jobId"].as_str().unwrap().to_string();
    let (status, _) = ctx.post_empty(&format!("/print-jobs/{job_id}/failed")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ctx.get("/print-jobs/next").await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn late_failures_do_not_touch_the_next_dispatch() {
    let ctx = TestContext::new();
    ctx.post("/print-jobs", json!({"orderId": "ORD-6", "receiptPayload": {}})).await;
    let (_, body) = ctx.get("/print-jobs/next").await;
    let job_id = json(&body)["jobId"].as_str().unwrap().to_string();
    assert_eq!(json(&body)["attempt"], 1);
    ctx.post(&format!("/print-jobs/{job_id}/failed"), json!({"reason": "jam", "attempt": 1})).await;
    let (_, body) = ctx.get("/print-jobs/next").await;
    assert_eq!(json(&body)["attempt"], 2);

    // A duplicate of the first report arrives while the second dispatch is printing
    let (status, _) = ctx.post(&format!("/print-jobs/{job_id}/failed"), json!({"reason": "jam", "attempt": 1})).await;
    assert_eq!(status, StatusCode::OK);
    let job = ctx.queue.job(&job_id).await.unwrap();
    assert_eq!(job.state, PrintJobState::Dispatched);
    assert_eq!(job.attempts, 2);
}

#[actix_web::test]
async fn unknown_jobs_are_not_found() {
    let ctx = TestContext::new();
    let (status, body) = ctx.post_empty("/print-jobs/PJ-nope/complete").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json(&body)["error"].as_str().unwrap().contains("PJ-nope"));
    let (status, _) = ctx.post("/print-jobs/PJ-nope/failed", json!({"error": "jam"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn manual_jobs_need_an_object_payload() {
    let ctx = TestContext::new();
    let (status, _) = ctx.post("/print-jobs", json!({"orderId": "ORD-7", "receiptPayload": "hello"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

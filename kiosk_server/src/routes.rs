//! Request handler definitions
//!
//! Define each route and it handler here. Handlers stay thin: all of the rules about money and print jobs live in
//! `cash_ledger`, and handlers only translate between JSON and ledger calls.
//!
//! Handlers run on actix worker threads, so they must never block. Every ledger call is async and holds its locks only
//! for in-memory work.
use actix_web::{get, post, web, HttpResponse, Responder};
use cash_ledger::{PrintQueue, SessionStore};
use kiosk_common::{
    wire::{
        CancelResponse,
        CashUpdateRequest,
        CashUpdateResponse,
        JsonResponse,
        NewPrintJobRequest,
        NewPrintJobResponse,
        NewSessionRequest,
        PrintFailureRequest,
    },
    OrderId,
};
use log::*;

use crate::errors::ServerError;

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Sessions  ----------------------------------------------------------
/// Opens a cash payment session. Called by the checkout when the customer chooses to pay with cash.
///
/// Returns `201 Created` with the new session, or `200 OK` with the existing session if one was already open for the
/// order.
#[post("/sessions")]
pub async fn create_session(
    store: web::Data<SessionStore>,
    body: web::Json<NewSessionRequest>,
) -> Result<HttpResponse, ServerError> {
    let NewSessionRequest { order_id, total_required, receipt } = body.into_inner();
    debug!("💻️ POST new cash session for order {order_id} ({total_required})");
    let order_id = validate_order_id(order_id.as_str())?;
    let result = store.create_session(order_id, total_required, receipt).await?;
    let mut response = if result.created { HttpResponse::Created() } else { HttpResponse::Ok() };
    Ok(response.json(result.session))
}

/// The sessions still waiting for cash. The edge polls this to find out which order the next banknote belongs to.
#[get("/sessions/active")]
pub async fn active_sessions(store: web::Data<SessionStore>) -> impl Responder {
    trace!("💻️ GET active sessions");
    let sessions = store.list_active().await;
    HttpResponse::Ok().json(sessions)
}

#[get("/sessions/{order_id}")]
pub async fn session_by_id(
    store: web::Data<SessionStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let order_id = validate_order_id(&path.into_inner())?;
    trace!("💻️ GET session for order {order_id}");
    let session = store
        .get_session(&order_id)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("No payment session exists for order {order_id}")))?;
    Ok(HttpResponse::Ok().json(session))
}

#[post("/sessions/{order_id}/cash")]
pub async fn cash_update(
    store: web::Data<SessionStore>,
    path: web::Path<String>,
    body: web::Json<CashUpdateRequest>,
) -> Result<HttpResponse, ServerError> {
    let order_id = validate_order_id(&path.into_inner())?;
    let CashUpdateRequest { amount_added, event_id } = body.into_inner();
    debug!("💻️ POST {amount_added} cash for order {order_id} (event: {})", event_id.as_deref().unwrap_or("none"));
    let outcome = store.apply_cash_update(&order_id, amount_added, event_id.as_deref()).await?;
    Ok(HttpResponse::Ok().json(CashUpdateResponse::from(&outcome)))
}

#[post("/sessions/{order_id}/cancel")]
pub async fn cancel_session(
    store: web::Data<SessionStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let order_id = validate_order_id(&path.into_inner())?;
    debug!("💻️ POST cancel session for order {order_id}");
    let outcome = store.cancel_session(&order_id).await?;
    Ok(HttpResponse::Ok().json(CancelResponse::from(&outcome)))
}

//----------------------------------------------   Print jobs  --------------------------------------------------------
/// Queues a receipt by hand, e.g. a reprint requested by staff.
#[post("/print-jobs")]
pub async fn new_print_job(
    queue: web::Data<PrintQueue>,
    body: web::Json<NewPrintJobRequest>,
) -> Result<HttpResponse, ServerError> {
    let NewPrintJobRequest { order_id, receipt_payload } = body.into_inner();
    let order_id = validate_order_id(order_id.as_str())?;
    if !receipt_payload.is_object() {
        return Err(ServerError::InvalidRequestBody("receiptPayload must be a JSON object".into()));
    }
    let job_id = queue.enqueue(order_id.clone(), receipt_payload).await;
    info!("💻️ Receipt for order {order_id} queued by request as {job_id}");
    Ok(HttpResponse::Created().json(NewPrintJobResponse { job_id }))
}

/// Hands the oldest queued receipt to the caller, or `204 No Content` if there is nothing to print.
#[get("/print-jobs/next")]
pub async fn next_print_job(queue: web::Data<PrintQueue>) -> impl Responder {
    match queue.dequeue_next().await {
        Some(job) => {
            debug!("💻️ Dispatching print job {} for order {} (attempt {})", job.job_id, job.order_id, job.attempts);
            HttpResponse::Ok().json(job.envelope())
        },
        None => {
            trace!("💻️ No print jobs waiting");
            HttpResponse::NoContent().finish()
        },
    }
}

#[post("/print-jobs/{job_id}/complete")]
pub async fn complete_print_job(
    queue: web::Data<PrintQueue>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let job_id = path.into_inner();
    debug!("💻️ POST print job {job_id} complete");
    let job = queue.mark_completed(&job_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Print job {job_id} is {}", job.state))))
}

/// The edge could not print a receipt. The body is optional; both `{"reason": ...}` and `{"error": ...}` are read, as is
/// the `attempt` the failure belongs to.
#[post("/print-jobs/{job_id}/failed")]
pub async fn fail_print_job(
    queue: web::Data<PrintQueue>,
    path: web::Path<String>,
    body: Option<web::Json<PrintFailureRequest>>,
) -> Result<HttpResponse, ServerError> {
    let job_id = path.into_inner();
    let (reason, attempt) = match body {
        Some(body) => {
            let PrintFailureRequest { reason, attempt } = body.into_inner();
            (reason, attempt)
        },
        None => ("No reason given".to_string(), None),
    };
    debug!("💻️ POST print job {job_id} failed: {reason}");
    let job = queue.mark_failed(&job_id, &reason, attempt).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Print job {job_id} is {}", job.state))))
}

fn validate_order_id(raw: &str) -> Result<OrderId, ServerError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServerError::InvalidOrderId("The order id cannot be empty".into()));
    }
    Ok(OrderId::new(trimmed))
}

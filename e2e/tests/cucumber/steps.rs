use std::time::Duration;

use cash_ledger::PrintJobState;
use cucumber::{gherkin::Step, given, then, when};
use e2e::helpers::json_is_subset_of;
use kiosk_common::{Money, OrderId};
use kiosk_edge::decoder::CashKind;
use log::*;
use reqwest::Method;
use serde_json::{json, Value};

use crate::cucumber::{world::eventually, KioskWorld};

#[given("the kiosk cloud is running")]
async fn cloud_is_running(world: &mut KioskWorld) {
    world.start_server().await;
    let (code, body) = world.get("/health").await;
    assert_eq!(code.as_u16(), 200);
    assert_eq!(body, "👍️\n");
}

#[given("the kiosk edge is running")]
async fn edge_is_running(world: &mut KioskWorld) {
    world.start_edge().await;
}

//----------------------------------------------   Checkout  ----------------------------------------------------------
#[when(expr = "the checkout opens a cash session for order {string} totalling {int}")]
async fn open_session(world: &mut KioskWorld, order_id: String, total: i64) {
    let body = json!({"orderId": order_id, "totalRequired": total});
    let res = world.request(Method::POST, "/sessions", |req| req.json(&body)).await;
    debug!("Got Response: {} {}", res.0, res.1);
    world.response = Some(res);
}

#[when(expr = "the checkout opens a cash session for order {string} totalling {int} with the receipt:")]
async fn open_session_with_receipt(world: &mut KioskWorld, order_id: String, total: i64, step: &Step) {
    let receipt: Value = serde_json::from_str(step.docstring().expect("No receipt given")).expect("Invalid receipt");
    let body = json!({"orderId": order_id, "totalRequired": total, "receipt": receipt});
    let res = world.request(Method::POST, "/sessions", |req| req.json(&body)).await;
    world.response = Some(res);
}

#[when(expr = "the checkout cancels order {string}")]
async fn cancel_session(world: &mut KioskWorld, order_id: String) {
    let res = world.request(Method::POST, &format!("/sessions/{order_id}/cancel"), |req| req).await;
    world.response = Some(res);
}

#[when(expr = "the checkout asks for the session of order {string}")]
async fn session_by_id(world: &mut KioskWorld, order_id: String) {
    world.response = Some(world.get(&format!("/sessions/{order_id}")).await);
}

#[when("I ask for the active sessions")]
async fn active_sessions(world: &mut KioskWorld) {
    world.response = Some(world.get("/sessions/active").await);
}

#[when("I stop sending the API key")]
fn stop_sending_api_key(world: &mut KioskWorld) {
    world.send_api_key = false;
}

#[when(expr = "{int} is reported for order {string} with event id {string}")]
async fn report_cash(world: &mut KioskWorld, amount: i64, order_id: String, event_id: String) {
    let body = json!({"amountAdded": amount, "eventId": event_id});
    let res = world.request(Method::POST, &format!("/sessions/{order_id}/cash"), |req| req.json(&body)).await;
    debug!("Got Response: {} {}", res.0, res.1);
    world.response = Some(res);
}

#[when(expr = "staff ask for a reprint of order {string}")]
async fn reprint(world: &mut KioskWorld, order_id: String) {
    let body = json!({"orderId": order_id, "receiptPayload": {"orderNumber": order_id, "totalAmount": 0}});
    let res = world.request(Method::POST, "/print-jobs", |req| req.json(&body)).await;
    world.response = Some(res);
}

//----------------------------------------------   Kiosk  -------------------------------------------------------------
#[when(expr = "a {int} peso {word} is inserted")]
async fn insert_cash(world: &mut KioskWorld, amount: i64, kind: String) {
    let kind = match kind.as_str() {
        "bill" => CashKind::Bill,
        "coin" => CashKind::Coin,
        other => panic!("Unknown cash kind {other}"),
    };
    let pulses = world.edge().acceptor.insert(kind, Money::from_units(amount)).expect("Could not insert cash");
    debug!("🌍️ Inserted {amount} as {pulses} {kind} pulses");
}

#[when("the customer presses cancel on the kiosk")]
async fn press_cancel(world: &mut KioskWorld) {
    world.edge().acceptor.press_cancel().expect("Could not press cancel");
}

#[when(expr = "{int} ms pass")]
async fn time_passes(_world: &mut KioskWorld, millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[when("the edge restarts")]
async fn edge_restarts(world: &mut KioskWorld) {
    world.stop_edge().await;
    world.start_edge().await;
}

#[then(expr = "the edge is collecting cash for order {string}")]
async fn edge_collects_for(world: &mut KioskWorld, order_id: String) {
    let expected = Some(OrderId::from(order_id.as_str()));
    let current = &world.edge().current;
    let expected = &expected;
    eventually(&format!("the edge to collect for {order_id}"), || async move { current.get() == *expected }).await;
}

#[then("the edge is not collecting cash for any order")]
async fn edge_is_idle(world: &mut KioskWorld) {
    let current = &world.edge().current;
    eventually("the edge to release its order", || async move { current.get().is_none() }).await;
}

#[then(expr = "order {string} has {int} inserted and is {word}")]
async fn session_state(world: &mut KioskWorld, order_id: String, amount: i64, status: String) {
    let store = world.store();
    let order_id = &OrderId::from(order_id.as_str());
    let amount = Money::from_units(amount);
    let status = status.as_str();
    eventually(&format!("order {order_id} to be {status} with {amount}"), || async move {
        store
            .get_session(order_id)
            .await
            .is_some_and(|s| s.amount_inserted == amount && s.status.to_string() == status)
    })
    .await;
}

#[then(expr = "{int} receipt(s) for order {string} is/are printed")]
async fn receipts_printed(world: &mut KioskWorld, count: usize, order_id: String) {
    let queue = world.queue();
    let acceptor = &world.edge().acceptor;
    let order = &OrderId::from(order_id.as_str());
    let marker = format!("Order: {order_id}");
    let marker = marker.as_str();
    eventually(&format!("{count} receipt(s) for {order_id}"), || async move {
        let jobs = queue.jobs_for_order(order).await;
        let printed = acceptor.printed_receipts().iter().filter(|r| r.iter().any(|l| l.trim() == marker)).count();
        jobs.len() == count && jobs.iter().all(|j| j.state == PrintJobState::Completed) && printed == count
    })
    .await;
}

#[then("no receipts are waiting to be printed")]
async fn print_queue_is_drained(world: &mut KioskWorld) {
    let queue = world.queue();
    eventually("the print queue to drain", || async move {
        queue.jobs().await.iter().all(|j| j.state.is_finished())
    })
    .await;
}

//----------------------------------------------   Responses  ---------------------------------------------------------
#[then(expr = "I receive a {int} {word} response with the message {string}")]
async fn receive_response(world: &mut KioskWorld, status: u16, text: String, message: String) {
    let (res_status, res_msg) = world.response.take().expect("No response received");
    assert_eq!(res_status, status, "Expected {status} {text} response, got {res_status}");
    assert!(res_msg.contains(&message), "Expected response to contain '{message}', got '{res_msg}'");
}

#[then(expr = "I receive a {int} {word} response")]
async fn receive_response_code(world: &mut KioskWorld, status: u16, text: String) {
    let (res_status, res_msg) = world.response.clone().expect("No response received");
    assert_eq!(res_status, status, "Expected {status} {text} response, got {res_status}: {res_msg}");
}

#[then(expr = "I receive a partial JSON response:")]
async fn receive_json_response(world: &mut KioskWorld, step: &Step) {
    let (_res_status, res_msg) = world.response.take().expect("No response received");
    let expected = step.docstring().expect("No expected response");
    assert!(json_is_subset_of(expected, res_msg.as_str()), "Expected response to be '{expected}', got '{res_msg}'");
}

use std::{collections::HashSet, sync::Arc};

use cash_ledger::{PrintJobState, PrintQueue, SessionStore};
use kiosk_common::{Money, OrderId, SessionStatus};
use log::*;
use serde_json::json;

const NUM_PULSES: i64 = 50;
const NUM_POLLERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cash_completes_exactly_once() {
    let _ = env_logger::try_init();
    info!("🚀️ Starting cash burst test");
    let queue = Arc::new(PrintQueue::default());
    let store = Arc::new(SessionStore::new(queue.clone()));
    let order_id = OrderId::from("ORD-BURST");
    store.create_session(order_id.clone(), Money::from_units(250), None).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..NUM_PULSES {
        let store = store.clone();
        let order_id = order_id.clone();
        tasks.push(tokio::spawn(async move {
            // Every pulse is sent twice, as a retrying edge would
            let event_id = format!("evt-{i}");
            let a = store.apply_cash_update(&order_id, Money::from_units(10), Some(&event_id)).await.unwrap();
            let b = store.apply_cash_update(&order_id, Money::from_units(10), Some(&event_id)).await.unwrap();
            (a.completed_now as u32) + (b.completed_now as u32)
        }));
    }
    let mut completions = 0;
    for task in tasks {
        completions += task.await.unwrap();
    }
    assert_eq!(completions, 1);

    let session = store.get_session(&order_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.amount_inserted, Money::from_units(250));
    assert_eq!(queue.jobs_for_order(&order_id).await.len(), 1);
    info!("🚀️ test complete");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pollers_never_share_a_job() {
    let _ = env_logger::try_init();
    let queue = Arc::new(PrintQueue::default());
    for i in 0..20 {
        queue.enqueue(OrderId::new(format!("ORD-{i}")), json!({"orderNumber": i})).await;
    }
    let mut pollers = Vec::new();
    for _ in 0..NUM_POLLERS {
        let queue = queue.clone();
        pollers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(job) = queue.dequeue_next().await {
                assert_eq!(job.state, PrintJobState::Dispatched);
                seen.push(job.job_id);
                tokio::task::yield_now().await;
            }
            seen
        }));
    }
    let mut all = HashSet::new();
    let mut total = 0;
    for poller in pollers {
        let seen = poller.await.unwrap();
        total += seen.len();
        all.extend(seen);
    }
    assert_eq!(total, 20);
    assert_eq!(all.len(), 20);
    assert_eq!(queue.queued_count().await, 0);
}

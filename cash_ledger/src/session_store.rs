//! The authoritative ledger of cash payment progress.
//!
//! Every order paying in cash gets one [`PaymentSession`]. The edge process reports each insertion through
//! [`SessionStore::apply_cash_update`], and the store decides when the order is paid. Completing a session queues its
//! receipt on the [`PrintQueue`] before the session lock is released, so a session yields exactly one print job no
//! matter how often the completing update is replayed.
//!
//! Locking: the map of sessions sits behind a `RwLock` that is only held long enough to look up or insert an entry.
//! Each session has its own `Mutex`, so updates for different orders never wait on each other. When both a session
//! and the print queue are locked, the session is always locked first.
use std::{collections::HashMap, sync::Arc};

use chrono::{Duration, Utc};
use kiosk_common::{
    wire::{ActiveSession, SessionView},
    Money,
    OrderId,
    SessionStatus,
};
use log::*;
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, RwLock};

use crate::{
    errors::LedgerError,
    events::{EventProducers, SessionCancelledEvent, SessionCompletedEvent},
    ledger_types::{CancelOutcome, CashUpdateOutcome, CreateSessionResult, PaymentSession},
    print_queue::PrintQueue,
};

pub struct SessionStore {
    sessions: RwLock<HashMap<OrderId, Arc<Mutex<PaymentSession>>>>,
    print_queue: Arc<PrintQueue>,
    producers: EventProducers,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionStore")
    }
}

impl SessionStore {
    pub fn new(print_queue: Arc<PrintQueue>) -> Self {
        Self::with_producers(print_queue, EventProducers::default())
    }

    pub fn with_producers(print_queue: Arc<PrintQueue>, producers: EventProducers) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), print_queue, producers }
    }

    pub fn print_queue(&self) -> &Arc<PrintQueue> {
        &self.print_queue
    }

    /// Opens a cash payment session for an order.
    ///
    /// If a session already exists for the order, nothing changes and its current state is returned with
    /// `created == false`. This makes the call safe to repeat from a checkout page that was refreshed.
    pub async fn create_session(
        &self,
        order_id: OrderId,
        total_required: Money,
        receipt_template: Option<Value>,
    ) -> Result<CreateSessionResult, LedgerError> {
        if !total_required.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("The order total must be positive, got {total_required}")));
        }
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&order_id) {
            let session = existing.lock().await.view();
            debug!("💵️ A session for order {order_id} already exists ({}). Not creating another.", session.status);
            return Ok(CreateSessionResult { session, created: false });
        }
        let session = PaymentSession::new(order_id.clone(), total_required, receipt_template);
        let view = session.view();
        sessions.insert(order_id.clone(), Arc::new(Mutex::new(session)));
        info!("💵️ Cash payment session opened for order {order_id}. Total required: {total_required}");
        Ok(CreateSessionResult { session: view, created: true })
    }

    /// Adds cash to an active session.
    ///
    /// * Unknown order: [`LedgerError::SessionNotFound`].
    /// * Session already completed or cancelled: the frozen state is returned with `applied == false`.
    /// * `event_id` already applied to this session: the current state is returned with `applied == false`.
    ///
    /// When the running total reaches the order total, the session becomes `Completed` and its receipt is queued.
    pub async fn apply_cash_update(
        &self,
        order_id: &OrderId,
        amount_added: Money,
        event_id: Option<&str>,
    ) -> Result<CashUpdateOutcome, LedgerError> {
        if !amount_added.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("Cash amounts must be positive, got {amount_added}")));
        }
        let entry = self.entry(order_id).await?;
        let mut session = entry.lock().await;
        if !session.is_active() {
            debug!(
                "💵️ Ignoring {amount_added} for order {order_id}: the session is {}. Returning its final state.",
                session.status
            );
            return Ok(frozen(&session));
        }
        if let Some(id) = event_id {
            if session.applied_events.contains(id) {
                info!("💵️ Cash event {id} for order {order_id} was already counted. Ignoring the replay.");
                return Ok(frozen(&session));
            }
        }
        let new_total =
            session.amount_inserted.checked_add(amount_added).ok_or_else(|| LedgerError::AmountOverflow(order_id.clone()))?;
        session.amount_inserted = new_total;
        if let Some(id) = event_id {
            session.applied_events.insert(id.to_string());
        }
        info!(
            "💵️ {amount_added} received for order {order_id}. {} of {} inserted.",
            session.amount_inserted, session.total_required
        );
        let mut completed = None;
        if session.amount_inserted >= session.total_required {
            session.status = SessionStatus::Completed;
            session.completed_at = Some(Utc::now());
            let payload = completion_receipt(&session);
            let job_id = self.print_queue.enqueue(order_id.clone(), payload).await;
            info!(
                "💵️ Order {order_id} is paid in full. Change due: {}. Receipt queued as {job_id}.",
                session.change_due()
            );
            completed = Some(job_id);
        }
        let outcome = CashUpdateOutcome {
            session: session.view(),
            applied: true,
            completed_now: completed.is_some(),
            print_job_id: completed.clone(),
        };
        drop(session);
        if let Some(job_id) = completed {
            self.call_session_completed_hook(SessionCompletedEvent::new(outcome.session.clone(), job_id)).await;
        }
        Ok(outcome)
    }

    /// Cancels an active session and reports how much cash must be handed back. Cancelling a finished session changes
    /// nothing and returns nothing to hand back.
    pub async fn cancel_session(&self, order_id: &OrderId) -> Result<CancelOutcome, LedgerError> {
        let entry = self.entry(order_id).await?;
        let mut session = entry.lock().await;
        if !session.is_active() {
            debug!("💵️ Session for order {order_id} is already {}. Nothing to cancel.", session.status);
            return Ok(CancelOutcome { session: session.view(), amount_returned: Money::default(), cancelled_now: false });
        }
        session.status = SessionStatus::Cancelled;
        session.cancelled_at = Some(Utc::now());
        let amount_returned = session.amount_inserted;
        let view = session.view();
        drop(session);
        info!("💵️ Session for order {order_id} cancelled. {amount_returned} to be returned to the customer.");
        self.call_session_cancelled_hook(SessionCancelledEvent::new(view.clone(), amount_returned)).await;
        Ok(CancelOutcome { session: view, amount_returned, cancelled_now: true })
    }

    /// All sessions still waiting for cash, oldest first.
    pub async fn list_active(&self) -> Vec<ActiveSession> {
        let mut active = Vec::new();
        for entry in self.entries().await {
            let session = entry.lock().await;
            if session.is_active() {
                active.push(session.as_active_session());
            }
        }
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.order_id.cmp(&b.order_id)));
        active
    }

    pub async fn get_session(&self, order_id: &OrderId) -> Option<SessionView> {
        let entry = self.sessions.read().await.get(order_id).cloned()?;
        let view = entry.lock().await.view();
        Some(view)
    }

    /// Forgets completed and cancelled sessions that ended more than `older_than` ago. Sessions that are locked at the
    /// time are left for the next sweep. Returns the evicted order ids.
    pub async fn evict_finished(&self, older_than: Duration) -> Vec<OrderId> {
        let cutoff = Utc::now() - older_than;
        let mut sessions = self.sessions.write().await;
        let expired = sessions
            .iter()
            .filter_map(|(id, entry)| {
                let session = entry.try_lock().ok()?;
                let ended = session.ended_at()?;
                (ended < cutoff).then(|| id.clone())
            })
            .collect::<Vec<_>>();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn entry(&self, order_id: &OrderId) -> Result<Arc<Mutex<PaymentSession>>, LedgerError> {
        self.sessions.read().await.get(order_id).cloned().ok_or_else(|| LedgerError::SessionNotFound(order_id.clone()))
    }

    async fn entries(&self) -> Vec<Arc<Mutex<PaymentSession>>> {
        self.sessions.read().await.values().cloned().collect()
    }

    async fn call_session_completed_hook(&self, event: SessionCompletedEvent) {
        for emitter in &self.producers.session_completed_producer {
            debug!("💵️ Notifying session completed hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }

    async fn call_session_cancelled_hook(&self, event: SessionCancelledEvent) {
        for emitter in &self.producers.session_cancelled_producer {
            debug!("💵️ Notifying session cancelled hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }
}

fn frozen(session: &PaymentSession) -> CashUpdateOutcome {
    CashUpdateOutcome { session: session.view(), applied: false, completed_now: false, print_job_id: None }
}

/// The receipt document for a paid session: the template from the ordering system, with the payment fields filled
/// in. Fields the template already carries are left alone, except for the amounts actually paid.
fn completion_receipt(session: &PaymentSession) -> Value {
    let mut receipt = match &session.receipt_template {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    receipt.entry("orderNumber").or_insert_with(|| json!(session.order_id));
    receipt.entry("totalAmount").or_insert_with(|| json!(session.total_required));
    receipt.entry("paymentMethod").or_insert_with(|| json!("Cash"));
    receipt.insert("amountPaid".into(), json!(session.amount_inserted));
    receipt.insert("change".into(), json!(session.change_due()));
    if let Some(paid_at) = session.completed_at {
        receipt.insert("paidAt".into(), json!(paid_at.to_rfc3339()));
    }
    Value::Object(receipt)
}

#[cfg(test)]
mod test {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(PrintQueue::default()))
    }

    #[tokio::test]
    async fn pay_in_full_then_replay() {
        let store = store();
        let id: OrderId = "ORD-1".into();
        store.create_session(id.clone(), Money::from_units(250), None).await.unwrap();
        let first = store.apply_cash_update(&id, Money::from_units(100), None).await.unwrap();
        assert_eq!(first.session.amount_inserted, Money::from_units(100));
        assert!(!first.is_complete());
        let second = store.apply_cash_update(&id, Money::from_units(150), None).await.unwrap();
        assert_eq!(second.session.amount_inserted, Money::from_units(250));
        assert!(second.is_complete());
        assert!(second.completed_now);
        assert_eq!(store.print_queue().jobs_for_order(&id).await.len(), 1);

        let late = store.apply_cash_update(&id, Money::from_units(10), None).await.unwrap();
        assert_eq!(late.session.amount_inserted, Money::from_units(250));
        assert!(late.is_complete());
        assert!(!late.applied);
        assert!(!late.completed_now);
        assert_eq!(late.session.completed_at, second.session.completed_at);
        assert_eq!(store.print_queue().jobs_for_order(&id).await.len(), 1);

        assert!(store.list_active().await.is_empty());
        let job = store.print_queue().dequeue_next().await.unwrap();
        assert_eq!(job.order_id, id);
        assert!(store.print_queue().dequeue_next().await.is_none());
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = store();
        let first = store.create_session("ORD-1".into(), Money::from_units(250), None).await.unwrap();
        assert!(first.created);
        assert_eq!(first.session.status, SessionStatus::Active);
        let again = store.create_session("ORD-1".into(), Money::from_units(999), None).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.session.total_required, Money::from_units(250));
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts() {
        let store = store();
        assert!(matches!(
            store.create_session("ORD-1".into(), Money::default(), None).await,
            Err(LedgerError::InvalidAmount(_))
        ));
        store.create_session("ORD-1".into(), Money::from_units(10), None).await.unwrap();
        assert!(matches!(
            store.apply_cash_update(&"ORD-1".into(), Money::default(), None).await,
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn unknown_session() {
        let store = store();
        let err = store.apply_cash_update(&"ORD-404".into(), Money::from_units(20), None).await.unwrap_err();
        assert_eq!(err, LedgerError::SessionNotFound("ORD-404".into()));
        assert!(store.cancel_session(&"ORD-404".into()).await.is_err());
    }

    #[tokio::test]
    async fn replayed_event_is_counted_once() {
        let store = store();
        let id: OrderId = "ORD-7".into();
        store.create_session(id.clone(), Money::from_units(100), None).await.unwrap();
        let first = store.apply_cash_update(&id, Money::from_units(20), Some("evt-1")).await.unwrap();
        assert!(first.applied);
        let replay = store.apply_cash_update(&id, Money::from_units(20), Some("evt-1")).await.unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.session.amount_inserted, Money::from_units(20));
        let next = store.apply_cash_update(&id, Money::from_units(20), Some("evt-2")).await.unwrap();
        assert_eq!(next.session.amount_inserted, Money::from_units(40));
    }

    #[tokio::test]
    async fn cancel_returns_inserted_cash_once() {
        let store = store();
        let id: OrderId = "ORD-3".into();
        store.create_session(id.clone(), Money::from_units(300), None).await.unwrap();
        store.apply_cash_update(&id, Money::from_units(100), None).await.unwrap();
        let cancelled = store.cancel_session(&id).await.unwrap();
        assert!(cancelled.cancelled_now);
        assert_eq!(cancelled.amount_returned, Money::from_units(100));
        assert_eq!(cancelled.session.status, SessionStatus::Cancelled);
        assert!(cancelled.session.cancelled_at.is_some());
        let again = store.cancel_session(&id).await.unwrap();
        assert!(!again.cancelled_now);
        assert_eq!(again.amount_returned, Money::default());
        let late = store.apply_cash_update(&id, Money::from_units(50), None).await.unwrap();
        assert!(!late.applied);
        assert_eq!(late.session.amount_inserted, Money::from_units(100));
        assert!(store.print_queue().jobs().await.is_empty());
    }

    #[tokio::test]
    async fn overpayment_records_change_on_the_receipt() {
        let store = store();
        let id: OrderId = "ORD-9".into();
        let template = json!({"restaurantName": "Bochog's", "orderNumber": "A-009"});
        store.create_session(id.clone(), Money::from_units(180), Some(template)).await.unwrap();
        let outcome = store.apply_cash_update(&id, Money::from_units(200), None).await.unwrap();
        assert!(outcome.completed_now);
        let job = store.print_queue().job(outcome.print_job_id.as_deref().unwrap()).await.unwrap();
        let receipt = job.receipt_payload;
        assert_eq!(receipt["restaurantName"], "Bochog's");
        assert_eq!(receipt["orderNumber"], "A-009");
        assert_eq!(receipt["paymentMethod"], "Cash");
        assert_eq!(receipt["amountPaid"], 200.0);
        assert_eq!(receipt["change"], 20.0);
        assert_eq!(receipt["totalAmount"], 180.0);
    }

    #[tokio::test]
    async fn eviction_only_touches_finished_sessions() {
        let store = store();
        store.create_session("A".into(), Money::from_units(10), None).await.unwrap();
        store.create_session("B".into(), Money::from_units(10), None).await.unwrap();
        store.apply_cash_update(&"B".into(), Money::from_units(10), None).await.unwrap();
        assert!(store.evict_finished(Duration::hours(1)).await.is_empty());
        let evicted = store.evict_finished(Duration::zero() - Duration::seconds(1)).await;
        assert_eq!(evicted, vec![OrderId::from("B")]);
        assert_eq!(store.session_count().await, 1);
        assert!(store.get_session(&"A".into()).await.is_some());
    }
}

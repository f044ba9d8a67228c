//! Forwards cash events and cancel presses from the serial bridge to the cloud.
//!
//! Events are handled one at a time, in the order the acceptor reported them. Each event is attributed to the
//! [`CurrentOrder`] at the moment it is dispatched. A cancel press cancels the current order's session and releases
//! the order. There is no local ledger: an event that cannot be delivered is
//! logged as a loss and dropped.
use std::{future::Future, sync::Arc, time::Duration};

use kiosk_common::{
    wire::{CancelResponse, CashUpdateRequest, CashUpdateResponse},
    OrderId,
    SessionStatus,
};
use log::*;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{attribution::CurrentOrder, cloud_client::CloudApi, errors::CloudError, serial_bridge::{AcceptorEvent, CashEvent}};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, delay: Duration::from_secs(2) }
    }
}

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// No session was waiting for cash.
    Unattributed,
    /// The cloud answered. The update may still have been ignored; see `response.applied`.
    Delivered { order_id: OrderId, response: CashUpdateResponse },
    /// The cloud refused the update because the session is unknown or already finished.
    SessionFinished { order_id: OrderId },
    /// The customer cancelled at the kiosk and the cloud closed the session.
    Cancelled { order_id: OrderId, response: CancelResponse },
    Lost { order_id: OrderId, error: CloudError },
}

pub struct Dispatcher<C> {
    cloud: Arc<C>,
    current: CurrentOrder,
    retry: RetryPolicy,
}

/// The receiving end of the bridge's event channel. Shared so that a restarted dispatcher picks up where the last one
/// stopped.
pub type AcceptorEvents = Mutex<mpsc::Receiver<AcceptorEvent>>;

impl<C: CloudApi> Dispatcher<C> {
    pub fn new(cloud: Arc<C>, current: CurrentOrder, retry: RetryPolicy) -> Self {
        let retry = RetryPolicy { attempts: retry.attempts.max(1), ..retry };
        Self { cloud, current, retry }
    }

    /// Drains the event channel until `token` is cancelled or the serial bridge goes away.
    pub async fn run(&self, events: &AcceptorEvents, token: CancellationToken) {
        let mut events = events.lock().await;
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                info!("💵️ The cash event channel has closed");
                break;
            };
            tokio::select! {
                _ = token.cancelled() => {
                    match &event {
                        AcceptorEvent::Cash(event) => error!(
                            "💸️ Shutting down before {} of {} ({}) was reported to the cloud",
                            event.kind, event.amount, event.event_id
                        ),
                        AcceptorEvent::Cancel => warn!("🛑️ Shutting down before a cancel press was reported"),
                    }
                    break;
                },
                _ = self.handle(&event) => {},
            }
        }
        info!("💵️ Cash dispatcher stopped");
    }

    pub async fn handle(&self, event: &AcceptorEvent) -> DispatchOutcome {
        match event {
            AcceptorEvent::Cash(event) => self.dispatch(event).await,
            AcceptorEvent::Cancel => self.cancel().await,
        }
    }

    pub async fn dispatch(&self, event: &CashEvent) -> DispatchOutcome {
        let Some(order_id) = self.current.get() else {
            warn!(
                "💸️ {} of {} was inserted but no order is waiting for cash. It has not been credited to anyone.",
                event.kind, event.amount
            );
            return DispatchOutcome::Unattributed;
        };
        let update = CashUpdateRequest { amount_added: event.amount, event_id: Some(event.event_id.clone()) };
        let what = format!("report {} for order {order_id}", update.amount_added);
        let cloud = &self.cloud;
        let (order, body) = (&order_id, &update);
        let result = self.with_retries(&what, move || cloud.post_cash(order, body)).await;
        match result {
            Ok(response) => {
                self.handle_response(&order_id, event, &response);
                DispatchOutcome::Delivered { order_id, response }
            },
            Err(e) if e.means_session_finished() => {
                warn!(
                    "💸️ The cloud no longer takes cash for order {order_id}. {} was not counted. {e}",
                    event.amount
                );
                self.current.clear_if(&order_id);
                DispatchOutcome::SessionFinished { order_id }
            },
            Err(error) => {
                error!(
                    "💸️ LOST: {} of {} for order {order_id} (event {}) could not be reported. {error}",
                    event.kind, event.amount, event.event_id
                );
                DispatchOutcome::Lost { order_id, error }
            },
        }
    }

    /// Cancels the current order's session. The cash already inserted is for staff to return.
    pub async fn cancel(&self) -> DispatchOutcome {
        let Some(order_id) = self.current.get() else {
            info!("🛑️ Cancel pressed but no order is waiting for cash. Nothing to cancel.");
            return DispatchOutcome::Unattributed;
        };
        let what = format!("cancel order {order_id}");
        let cloud = &self.cloud;
        let order = &order_id;
        let result = self.with_retries(&what, move || cloud.cancel_session(order)).await;
        match result {
            Ok(response) if response.status != SessionStatus::Cancelled => {
                warn!("🛑️ Order {order_id} was already {} and was not cancelled", response.status);
                self.current.clear_if(&order_id);
                DispatchOutcome::SessionFinished { order_id }
            },
            Ok(response) => {
                if response.amount_returned.is_positive() {
                    warn!(
                        "🛑️ Order {order_id} was cancelled at the kiosk. {} must be returned to the customer.",
                        response.amount_returned
                    );
                } else {
                    info!("🛑️ Order {order_id} is cancelled. There is no cash to return.");
                }
                self.current.clear_if(&order_id);
                DispatchOutcome::Cancelled { order_id, response }
            },
            Err(e) if e.means_session_finished() => {
                warn!("🛑️ Order {order_id} could not be cancelled because it is already over. {e}");
                self.current.clear_if(&order_id);
                DispatchOutcome::SessionFinished { order_id }
            },
            Err(error) => {
                error!("🛑️ Order {order_id} could not be cancelled. It stays open until the cloud closes it. {error}");
                DispatchOutcome::Lost { order_id, error }
            },
        }
    }

    /// Calls `call` until it succeeds, fails for good or runs out of attempts.
    async fn with_retries<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, CloudError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CloudError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retry.attempts => {
                    warn!(
                        "💵️ Attempt {attempt}/{} to {what} failed. {e} Retrying in {}s",
                        self.retry.attempts,
                        self.retry.delay.as_secs_f32()
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn handle_response(&self, order_id: &OrderId, event: &CashEvent, response: &CashUpdateResponse) {
        if response.applied {
            info!(
                "💵️ Order {order_id}: {} of {} inserted after {} {}",
                response.amount_inserted, response.total_required, event.kind, event.amount
            );
        } else if response.status == SessionStatus::Active {
            debug!("💵️ Event {} had already been counted for order {order_id}", event.event_id);
        } else {
            warn!(
                "💸️ Order {order_id} was already {}. {} was not counted and must be returned to the customer.",
                response.status, event.amount
            );
        }
        if (response.is_complete || response.status.is_terminal()) && self.current.clear_if(order_id) {
            info!("💵️ Order {order_id} is {}. Cash is no longer attributed to it.", response.status);
        }
    }
}

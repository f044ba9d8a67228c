//! Keeps [`CurrentOrder`] pointed at the session the cloud is waiting on.
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use kiosk_common::{wire::ActiveSession, OrderId};
use log::*;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{attribution::CurrentOrder, cloud_client::CloudApi, errors::CloudError};

/// Picks the order cash should be attributed to, given the currently attributed order and the active sessions.
///
/// The kiosk has one till, so normally there is at most one active session. If there are several, the current order is
/// kept while it is still active; otherwise the oldest session wins.
pub fn choose(current: Option<&OrderId>, active: &[ActiveSession]) -> Option<OrderId> {
    match active {
        [] => None,
        [only] => Some(only.order_id.clone()),
        many => current.filter(|c| many.iter().any(|s| &s.order_id == *c)).cloned().or_else(|| {
            many.iter()
                .min_by(|a, b| (a.started_at, &a.order_id).cmp(&(b.started_at, &b.order_id)))
                .map(|s| s.order_id.clone())
        }),
    }
}

pub struct SessionPoller<C> {
    cloud: Arc<C>,
    current: CurrentOrder,
    interval: Duration,
    seen: Mutex<HashSet<OrderId>>,
}

impl<C: CloudApi> SessionPoller<C> {
    pub fn new(cloud: Arc<C>, current: CurrentOrder, interval: Duration) -> Self {
        Self { cloud, current, interval, seen: Mutex::new(HashSet::new()) }
    }

    /// Fetches the active sessions once and updates the current order. On failure the current order is left alone.
    pub async fn poll_once(&self) -> Result<Option<OrderId>, CloudError> {
        let active = self.cloud.active_sessions().await?;
        self.log_new_sessions(&active);
        let previous = self.current.get();
        let chosen = choose(previous.as_ref(), &active);
        if active.len() > 1 {
            warn!(
                "🧾️ {} sessions are waiting for cash but this kiosk has one till. Cash goes to order {}.",
                active.len(),
                chosen.as_ref().map(OrderId::as_str).unwrap_or("?")
            );
        }
        match (&previous, &chosen) {
            (Some(p), Some(c)) if p == c => {},
            (_, Some(c)) => {
                self.current.set(c.clone());
                info!("🧾️ Cash is now attributed to order {c}");
            },
            (Some(p), None) => {
                if self.current.clear_if(p) {
                    info!("🧾️ Order {p} is no longer waiting for cash");
                }
            },
            (None, None) => {},
        }
        Ok(chosen)
    }

    pub async fn run(&self, token: CancellationToken) {
        info!("🧾️ Polling for cash sessions every {}s", self.interval.as_secs_f32());
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!("🧾️ Could not poll active sessions. {e}");
                    }
                },
            }
        }
        info!("🧾️ Session poller stopped");
    }

    fn log_new_sessions(&self, active: &[ActiveSession]) {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        for session in active.iter().filter(|s| !seen.contains(&s.order_id)) {
            info!(
                "🧾️ New cash session for order {}. {} due, {} inserted so far",
                session.order_id, session.total_required, session.amount_inserted
            );
        }
        *seen = active.iter().map(|s| s.order_id.clone()).collect();
    }
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};
    use kiosk_common::Money;

    use super::*;

    fn session(id: &str, started_secs: i64) -> ActiveSession {
        ActiveSession {
            order_id: OrderId::from(id),
            total_required: Money::from_units(100),
            amount_inserted: Money::default(),
            started_at: Utc.timestamp_opt(1_700_000_000 + started_secs, 0).unwrap(),
        }
    }

    #[test]
    fn no_sessions_clears() {
        assert_eq!(choose(Some(&OrderId::from("A")), &[]), None);
    }

    #[test]
    fn a_single_session_is_adopted() {
        assert_eq!(choose(None, &[session("A", 0)]), Some(OrderId::from("A")));
        assert_eq!(choose(Some(&OrderId::from("B")), &[session("A", 0)]), Some(OrderId::from("A")));
    }

    #[test]
    fn several_sessions_keep_the_current_order() {
        let active = [session("B", 5), session("A", 10)];
        assert_eq!(choose(Some(&OrderId::from("A")), &active), Some(OrderId::from("A")));
    }

    #[test]
    fn several_sessions_fall_back_to_the_oldest() {
        let active = [session("C", 10), session("B", 5), session("A", 5)];
        assert_eq!(choose(None, &active), Some(OrderId::from("A")));
        assert_eq!(choose(Some(&OrderId::from("Z")), &active), Some(OrderId::from("A")));
    }
}

//! The order that cash is currently attributed to.
//!
//! The acceptor cannot tell which order a banknote belongs to. The session poller writes the order the cloud is waiting
//! on; the dispatcher reads it when cash arrives.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kiosk_common::OrderId;

#[derive(Debug, Clone, Default)]
pub struct CurrentOrder {
    inner: Arc<Mutex<Option<OrderId>>>,
}

impl CurrentOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<OrderId> {
        self.lock().clone()
    }

    /// Points at `order_id` and returns the previous order, if any.
    pub fn set(&self, order_id: OrderId) -> Option<OrderId> {
        self.lock().replace(order_id)
    }

    pub fn clear(&self) -> Option<OrderId> {
        self.lock().take()
    }

    /// Clears the current order only if it is still `order_id`. Returns whether it was cleared.
    pub fn clear_if(&self, order_id: &OrderId) -> bool {
        let mut current = self.lock();
        if current.as_ref() == Some(order_id) {
            *current = None;
            true
        } else {
            false
        }
    }

    // No code path can leave the slot half-written, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Option<OrderId>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clear_if_only_clears_the_named_order() {
        let current = CurrentOrder::new();
        assert_eq!(current.set(OrderId::from("A-1")), None);
        assert!(!current.clear_if(&OrderId::from("A-2")));
        assert_eq!(current.get(), Some(OrderId::from("A-1")));
        assert_eq!(current.set(OrderId::from("A-2")), Some(OrderId::from("A-1")));
        assert!(current.clear_if(&OrderId::from("A-2")));
        assert_eq!(current.get(), None);
        assert!(!current.clear_if(&OrderId::from("A-2")));
    }

    #[test]
    fn clones_share_state() {
        let poller_view = CurrentOrder::new();
        let dispatcher_view = poller_view.clone();
        poller_view.set(OrderId::from("A-7"));
        assert_eq!(dispatcher_view.clear(), Some(OrderId::from("A-7")));
        assert_eq!(poller_view.get(), None);
    }
}

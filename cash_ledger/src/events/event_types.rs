use chrono::{DateTime, Utc};
use kiosk_common::{wire::SessionView, Money};

/// A session reached its total. Exactly one of these is published per order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCompletedEvent {
    pub session: SessionView,
    pub print_job_id: String,
}

impl SessionCompletedEvent {
    pub fn new(session: SessionView, print_job_id: String) -> Self {
        Self { session, print_job_id }
    }
}

/// A session was cancelled while cash was (possibly) already inside the machine. Subscribers use this to trigger
/// refunds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCancelledEvent {
    pub session: SessionView,
    pub amount_returned: Money,
    pub timestamp: DateTime<Utc>,
}

impl SessionCancelledEvent {
    pub fn new(session: SessionView, amount_returned: Money) -> Self {
        Self { session, amount_returned, timestamp: Utc::now() }
    }
}

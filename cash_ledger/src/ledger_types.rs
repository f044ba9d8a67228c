use std::{collections::HashSet, fmt::Display};

use chrono::{DateTime, Utc};
use kiosk_common::{
    wire::{ActiveSession, CancelResponse, CashUpdateResponse, PrintJobEnvelope, SessionView},
    Money,
    OrderId,
    SessionStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

//--------------------------------------   PaymentSession    ---------------------------------------------------------
/// Progress towards paying one order in cash. Only [`crate::SessionStore`] mutates these.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub order_id: OrderId,
    pub total_required: Money,
    pub amount_inserted: Money,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Receipt fields from the ordering system, completed with payment details when the session is paid.
    pub receipt_template: Option<Value>,
    pub(crate) applied_events: HashSet<String>,
}

impl PaymentSession {
    pub fn new(order_id: OrderId, total_required: Money, receipt_template: Option<Value>) -> Self {
        Self {
            order_id,
            total_required,
            amount_inserted: Money::default(),
            status: SessionStatus::Active,
            started_at: Utc::now(),
            completed_at: None,
            cancelled_at: None,
            receipt_template,
            applied_events: HashSet::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// When the session left the `Active` state, if it has.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.cancelled_at)
    }

    pub fn amount_remaining(&self) -> Money {
        self.total_required.saturating_sub(self.amount_inserted)
    }

    pub fn change_due(&self) -> Money {
        self.amount_inserted.saturating_sub(self.total_required)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            order_id: self.order_id.clone(),
            total_required: self.total_required,
            amount_inserted: self.amount_inserted,
            amount_remaining: self.amount_remaining(),
            status: self.status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            cancelled_at: self.cancelled_at,
        }
    }

    pub fn as_active_session(&self) -> ActiveSession {
        ActiveSession {
            order_id: self.order_id.clone(),
            total_required: self.total_required,
            amount_inserted: self.amount_inserted,
            started_at: self.started_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionResult {
    pub session: SessionView,
    /// False if a session for the order already existed; `session` is then the existing state.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashUpdateOutcome {
    pub session: SessionView,
    /// False when the update was a no-op: the session was finished, or the event id had been seen before.
    pub applied: bool,
    /// True only for the update that moved the session to `Completed`.
    pub completed_now: bool,
    /// The receipt job queued by this update, if it completed the session.
    pub print_job_id: Option<String>,
}

impl CashUpdateOutcome {
    pub fn is_complete(&self) -> bool {
        self.session.status == SessionStatus::Completed
    }
}

impl From<&CashUpdateOutcome> for CashUpdateResponse {
    fn from(outcome: &CashUpdateOutcome) -> Self {
        Self {
            amount_inserted: outcome.session.amount_inserted,
            total_required: outcome.session.total_required,
            is_complete: outcome.is_complete(),
            status: outcome.session.status,
            applied: outcome.applied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub session: SessionView,
    /// Cash to hand back. Zero unless this call did the cancelling.
    pub amount_returned: Money,
    pub cancelled_now: bool,
}

impl From<&CancelOutcome> for CancelResponse {
    fn from(outcome: &CancelOutcome) -> Self {
        Self { amount_returned: outcome.amount_returned, status: outcome.session.status }
    }
}

//--------------------------------------       PrintJob      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrintJobState {
    Queued,
    Dispatched,
    Completed,
    Failed,
}

impl PrintJobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Display for PrintJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "Queued",
            Self::Dispatched => "Dispatched",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintJob {
    pub job_id: String,
    pub order_id: OrderId,
    pub receipt_payload: Value,
    pub state: PrintJobState,
    pub queued_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// How many times the job has been handed to a poller.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PrintJob {
    pub fn envelope(&self) -> PrintJobEnvelope {
        PrintJobEnvelope {
            job_id: self.job_id.clone(),
            order_id: self.order_id.clone(),
            receipt_payload: self.receipt_payload.clone(),
            attempt: Some(self.attempts),
        }
    }
}

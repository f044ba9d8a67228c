//! # Cash ledger
//!
//! The in-memory state behind the kiosk cloud service. It is deliberately independent of any HTTP framework so that
//! the rules about money can be tested in isolation.
//!
//! Two pieces of state live here:
//! * [`SessionStore`] tracks each order that is being paid in cash, and how much has been inserted so far.
//! * [`PrintQueue`] holds receipts waiting for the kiosk printer. A job is only ever handed to one poller at a time.
//!
//! When a session is paid in full, the store queues exactly one receipt for it and publishes a
//! [`events::SessionCompletedEvent`] to any subscribers registered through [`events::EventHooks`].
mod errors;
pub mod events;
mod ledger_types;
mod print_queue;
mod session_store;

pub use errors::LedgerError;
pub use ledger_types::{
    CancelOutcome,
    CashUpdateOutcome,
    CreateSessionResult,
    PaymentSession,
    PrintJob,
    PrintJobState,
};
pub use print_queue::{PrintQueue, DEFAULT_MAX_PRINT_ATTEMPTS};
pub use session_store::SessionStore;

use kiosk_common::OrderId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("No payment session exists for order {0}")]
    SessionNotFound(OrderId),
    #[error("Invalid amount. {0}")]
    InvalidAmount(String),
    #[error("The running total for order {0} overflowed")]
    AmountOverflow(OrderId),
    #[error("Print job {0} does not exist")]
    JobNotFound(String),
}

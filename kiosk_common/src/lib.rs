//! Types shared by the kiosk cloud service and the edge bridge.
//!
//! * [`Money`]: cash amounts as whole centavos, with the decimal wire format both sides agree on.
//! * [`Secret`]: a wrapper that keeps API keys out of logs.
//! * [`wire`]: the JSON request/response objects exchanged over HTTP.
mod money;
mod secret;

pub mod helpers;
pub mod wire;

pub use money::{Money, MoneyError, CURRENCY_CODE, CURRENCY_SYMBOL};
pub use secret::Secret;
pub use wire::{OrderId, SessionStatus};

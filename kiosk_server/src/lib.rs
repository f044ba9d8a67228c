//! # Kiosk cloud service
//!
//! The cloud half of the kiosk's cash and receipt path. The edge computer sitting next to the cash acceptor cannot be
//! reached from the internet, so everything here is pull-based: the edge polls for active payment sessions, pushes
//! the cash it sees, and polls for receipts to print.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/sessions`: Cash payment sessions. Created by the checkout, fed by the edge.
//! * `/print-jobs`: Receipts waiting for the kiosk printer.
//!
//! Every route except `/health` requires the `X-API-Key` header when `KIOSK_API_KEY` is set.

pub mod cli;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;

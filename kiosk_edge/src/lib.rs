//! # Kiosk edge
//!
//! The process that runs next to the cash acceptor and the receipt printer. It only ever makes outbound HTTP calls, so
//! it works behind NAT on a home network.
//!
//! * [`serial_bridge`] reads the pulse decoder and turns `BILL:`/`COIN:`/`CANCEL` lines into
//!   [`serial_bridge::AcceptorEvent`]s.
//! * [`session_poller`] tracks which order the cloud is waiting on ([`attribution::CurrentOrder`]).
//! * [`dispatcher`] reports each cash event to the cloud against that order, and cancels it when the customer presses
//!   cancel.
//! * [`print_poller`] pulls queued receipts and prints them through one of the [`printer`] back ends.
//! * [`supervisor`] restarts any of these tasks if it stops.
//!
//! [`decoder`] holds the decoder's line protocol and an in-process decoder that stands in for the hardware.
pub mod app;
pub mod attribution;
pub mod cloud_client;
pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod errors;
pub mod print_poller;
pub mod printer;
pub mod receipt;
pub mod serial_bridge;
pub mod session_poller;
pub mod supervisor;

//! Asynchronous monitoring of order status.
//!
//! This module provides the bounded, cancellable poller that checks the
//! ledger for payment outcomes the provider's own events might miss.

pub mod status;

pub use status::{PollUpdate, PollerHandle, StatusPoller};

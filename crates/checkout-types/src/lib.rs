//! Common types for the hosted checkout coordinator.
//!
//! This crate defines the data shared by every checkout component: orders and
//! buyers, ledger statuses, provider events, failure reasons, the events and
//! snapshots published to the presentation layer, and the configuration
//! validation framework used by pluggable implementations.

/// API types for the presentation-facing HTTP endpoints.
pub mod api;
/// Events published by the coordinator.
pub mod events;
/// Coordinator phases and snapshots.
pub mod flow;
/// Orders, buyers and ledger statuses.
pub mod order;
/// Payment signatures, verification results and failure reasons.
pub mod payment;
/// Payment provider session types.
pub mod provider;
/// Registry trait for named implementations.
pub mod registry;
/// Small helpers shared across crates.
pub mod utils;
/// Configuration validation types.
pub mod validation;

pub use api::*;
pub use events::*;
pub use flow::*;
pub use order::*;
pub use payment::*;
pub use provider::*;
pub use registry::ImplementationRegistry;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;

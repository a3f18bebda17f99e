//! Core checkout coordinator.
//!
//! Drives one buyer's payment from order creation through the provider
//! session to a single terminal outcome. The state machine in [`state`]
//! decides every transition, [`monitoring`] polls the ledger while payment
//! is pending, and [`engine`] runs the loop that ties both to the ledger and
//! provider services. [`builder`] assembles an engine from configuration.

pub mod builder;
pub mod engine;
pub mod monitoring;
pub mod state;

#[cfg(test)]
mod test_support;

pub use builder::{BuilderError, CheckoutBuilder, CheckoutFactories};
pub use engine::event_bus::EventBus;
pub use engine::{CheckoutEngine, CheckoutHandle, EngineError, EngineSettings};
pub use state::{FlowError, FlowStateMachine};

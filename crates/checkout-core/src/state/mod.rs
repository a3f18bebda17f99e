//! State management for the payment flow.
//!
//! This module provides the pure state machine that decides every phase
//! change of the checkout and the side effects each change requires.

pub mod flow;

pub use flow::{Effect, FlowError, FlowState, FlowStateMachine, Signal};

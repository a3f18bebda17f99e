//! Coordinator phases and the snapshot exposed to the presentation layer.

use crate::{CheckoutOptions, FailureReason, Order};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the payment-flow coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
	#[default]
	Idle,
	Creating,
	AwaitingPayment,
	Verifying,
	Succeeded,
	Failed,
}

impl CheckoutPhase {
	/// Terminal phases accept no transition except a reset.
	pub fn is_terminal(&self) -> bool {
		matches!(self, CheckoutPhase::Succeeded | CheckoutPhase::Failed)
	}

	/// True while an order is being created or paid for.
	pub fn is_in_flight(&self) -> bool {
		matches!(
			self,
			CheckoutPhase::Creating | CheckoutPhase::AwaitingPayment | CheckoutPhase::Verifying
		)
	}
}

impl fmt::Display for CheckoutPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			CheckoutPhase::Idle => "idle",
			CheckoutPhase::Creating => "creating",
			CheckoutPhase::AwaitingPayment => "awaiting_payment",
			CheckoutPhase::Verifying => "verifying",
			CheckoutPhase::Succeeded => "succeeded",
			CheckoutPhase::Failed => "failed",
		};
		write!(f, "{}", s)
	}
}

/// Read-only view of the coordinator state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSnapshot {
	pub phase: CheckoutPhase,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub order: Option<Order>,
	pub poll_attempts: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure: Option<FailureReason>,
	/// Blocking notice for the buyer, e.g. a failed order creation.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub notice: Option<String>,
	/// Options of the open provider session, for rendering the widget.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub session: Option<CheckoutOptions>,
}

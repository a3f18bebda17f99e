//! Event types published by the checkout coordinator.
//!
//! Events flow through the coordinator's event bus so that the presentation
//! layer (and anything else interested) can react to the checkout lifecycle
//! without polling the snapshot.

use crate::{CheckoutOptions, CheckoutPhase, FailureReason, Order};
use serde::{Deserialize, Serialize};

/// Lifecycle event of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CheckoutEvent {
	/// The coordinator moved to a new phase.
	PhaseChanged {
		from: CheckoutPhase,
		to: CheckoutPhase,
		order_id: Option<String>,
	},
	/// A provider session was opened and should be rendered.
	SessionOpened { options: CheckoutOptions },
	/// Payment succeeded; navigate once to the confirmation location.
	Succeeded { order: Order, redirect_to: String },
	/// Payment failed.
	Failed {
		order_id: String,
		reason: FailureReason,
	},
	/// Blocking notice for the buyer.
	Notice { message: String },
}

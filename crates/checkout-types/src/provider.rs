//! Payment provider session types.
//!
//! A provider session is the hosted payment UI opened for one order. The
//! provider reports what happens inside it through [`ProviderEvent`]s.

use crate::{Order, SignaturePayload};
use serde::{Deserialize, Serialize};

/// Event originated by the payment provider's UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderEvent {
	/// UI fully loaded; status polling may start.
	Ready,
	/// Buyer finished the provider-side flow. The outcome is still unverified.
	Completed { payload: SignaturePayload },
	/// Provider declared the payment failed (e.g. card declined).
	Failed { code: String, description: String },
	/// Buyer closed the UI without completing.
	Dismissed,
}

impl ProviderEvent {
	/// Stable name of the event kind, used for de-duplication and logging.
	pub fn kind(&self) -> &'static str {
		match self {
			ProviderEvent::Ready => "ready",
			ProviderEvent::Completed { .. } => "completed",
			ProviderEvent::Failed { .. } => "failed",
			ProviderEvent::Dismissed => "dismissed",
		}
	}
}

/// Provider event tagged with the order whose session produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
	pub order_id: String,
	pub event: ProviderEvent,
}

/// Buyer details pre-filled into the provider UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefill {
	pub name: String,
	pub email: String,
	pub contact: String,
}

/// Everything the provider UI needs to open for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOptions {
	/// Public key identifying the merchant to the provider.
	pub key: String,
	pub amount: u64,
	pub currency: String,
	/// Merchant display name.
	pub name: String,
	pub description: String,
	pub order_id: String,
	pub prefill: Prefill,
	pub theme_color: String,
}

/// Provider-wide display settings combined with each order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderBranding {
	pub key_id: String,
	pub merchant_name: String,
	pub description: String,
	pub theme_color: String,
}

impl CheckoutOptions {
	pub fn for_order(order: &Order, branding: &ProviderBranding) -> Self {
		Self {
			key: branding.key_id.clone(),
			amount: order.amount,
			currency: order.currency.clone(),
			name: branding.merchant_name.clone(),
			description: branding.description.clone(),
			order_id: order.id.clone(),
			prefill: Prefill {
				name: order.buyer.name.clone(),
				email: order.buyer.email.clone(),
				contact: order.buyer.phone.clone(),
			},
			theme_color: branding.theme_color.clone(),
		}
	}
}

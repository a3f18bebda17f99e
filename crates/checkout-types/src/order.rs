//! Order types for the checkout flow.
//!
//! An order is issued by the remote ledger and identifies exactly one
//! purchase attempt. Its amount, currency and buyer never change after
//! creation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Billing details collected from the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
	pub name: String,
	pub email: String,
	pub phone: String,
}

impl Buyer {
	pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			email: email.into(),
			phone: phone.into(),
		}
	}

	/// Returns the names of the fields that are blank.
	pub fn missing_fields(&self) -> Vec<&'static str> {
		[
			("name", &self.name),
			("email", &self.email),
			("phone", &self.phone),
		]
		.into_iter()
		.filter(|(_, value)| value.trim().is_empty())
		.map(|(field, _)| field)
		.collect()
	}

	/// True when every billing field is filled in.
	pub fn is_complete(&self) -> bool {
		self.missing_fields().is_empty()
	}
}

/// Order as confirmed by the ledger service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
	/// Opaque identifier issued by the ledger.
	pub order_id: String,
	/// Amount in the currency's minor unit.
	pub amount: u64,
	pub currency: String,
}

/// A purchase attempt owned by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier issued by the ledger.
	pub id: String,
	/// Amount in the currency's minor unit.
	pub amount: u64,
	pub currency: String,
	pub buyer: Buyer,
	/// Timestamp (seconds) when the ledger confirmed the order.
	pub created_at: u64,
}

impl Order {
	pub fn from_created(created: CreatedOrder, buyer: Buyer, created_at: u64) -> Self {
		Self {
			id: created.order_id,
			amount: created.amount,
			currency: created.currency,
			buyer,
			created_at,
		}
	}
}

/// Payment status as recorded by the ledger service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
	Pending,
	Success,
	Failed,
	/// Any status string the ledger reports that this client does not know.
	#[serde(other)]
	Unrecognized,
}

impl LedgerStatus {
	/// Whether the status ends the payment lifecycle.
	pub fn is_terminal(&self) -> bool {
		matches!(self, LedgerStatus::Success | LedgerStatus::Failed)
	}
}

impl fmt::Display for LedgerStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			LedgerStatus::Pending => "pending",
			LedgerStatus::Success => "success",
			LedgerStatus::Failed => "failed",
			LedgerStatus::Unrecognized => "unrecognized",
		};
		write!(f, "{}", s)
	}
}

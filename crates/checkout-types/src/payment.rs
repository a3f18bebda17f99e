//! Payment outcome types.
//!
//! Covers the opaque signature payload returned by the provider, the
//! ledger's verification answer, and the reasons a checkout can fail.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason code sent when the buyer closes the provider UI.
pub const PAYMENT_CANCELLED: &str = "PAYMENT_CANCELLED";
/// Reason code sent when polling exhausts its attempt budget.
pub const POLL_TIMEOUT: &str = "POLL_TIMEOUT";
/// Reason code sent when the ledger itself reports the payment as failed.
pub const PAYMENT_FAILED: &str = "PAYMENT_FAILED";
/// Reason code sent when the ledger rejects or cannot verify a completion.
pub const VERIFICATION_FAILED: &str = "VERIFICATION_FAILED";
/// Reason code used when the provider session cannot be opened.
pub const SESSION_OPEN_FAILED: &str = "SESSION_OPEN_FAILED";

/// Completion payload produced by the provider.
///
/// Forwarded verbatim to the ledger; this system never inspects the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePayload {
	#[serde(rename = "razorpay_order_id")]
	pub order_id: String,
	#[serde(rename = "razorpay_payment_id")]
	pub payment_id: String,
	#[serde(rename = "razorpay_signature")]
	pub signature: String,
}

/// Ledger answer to a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
	pub verified: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl Verification {
	pub fn accepted() -> Self {
		Self {
			verified: true,
			message: None,
		}
	}

	pub fn declined(message: impl Into<String>) -> Self {
		Self {
			verified: false,
			message: Some(message.into()),
		}
	}
}

/// Category of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	/// Buyer dismissed the provider UI.
	UserCancelled,
	/// Provider declared the payment failed.
	ProviderError,
	/// No terminal ledger status within the attempt budget.
	PollTimeout,
	/// Ledger status polling observed a failed payment.
	LedgerReported,
	/// Ledger declined the completion payload or could not be reached.
	VerificationFailed,
}

/// Why a checkout ended in the failed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
	pub kind: FailureKind,
	/// Code reported to the ledger.
	pub code: String,
	pub description: String,
}

impl FailureReason {
	pub fn cancelled() -> Self {
		Self {
			kind: FailureKind::UserCancelled,
			code: PAYMENT_CANCELLED.to_string(),
			description: "Payment cancelled by user".to_string(),
		}
	}

	pub fn provider(code: impl Into<String>, description: impl Into<String>) -> Self {
		Self {
			kind: FailureKind::ProviderError,
			code: code.into(),
			description: description.into(),
		}
	}

	pub fn poll_timeout(attempts: u32) -> Self {
		Self {
			kind: FailureKind::PollTimeout,
			code: POLL_TIMEOUT.to_string(),
			description: format!(
				"Payment status inconclusive after {} status checks",
				attempts
			),
		}
	}

	pub fn ledger_reported() -> Self {
		Self {
			kind: FailureKind::LedgerReported,
			code: PAYMENT_FAILED.to_string(),
			description: "Ledger reported the payment as failed".to_string(),
		}
	}

	pub fn verification(message: impl Into<String>) -> Self {
		Self {
			kind: FailureKind::VerificationFailed,
			code: VERIFICATION_FAILED.to_string(),
			description: message.into(),
		}
	}
}

impl fmt::Display for FailureReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.code, self.description)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_signature_payload_uses_provider_field_names() {
		let payload = SignaturePayload {
			order_id: "order_1".into(),
			payment_id: "pay_1".into(),
			signature: "sig".into(),
		};
		let json = serde_json::to_value(&payload).unwrap();
		assert_eq!(json["razorpay_order_id"], "order_1");
		assert_eq!(json["razorpay_payment_id"], "pay_1");
		assert_eq!(json["razorpay_signature"], "sig");
	}

	#[test]
	fn test_failure_reason_codes() {
		assert_eq!(FailureReason::cancelled().code, PAYMENT_CANCELLED);
		assert_eq!(FailureReason::poll_timeout(60).kind, FailureKind::PollTimeout);
		assert!(FailureReason::poll_timeout(60).description.contains("inconclusive"));
		assert_eq!(
			FailureReason::provider("BAD_REQUEST_ERROR", "Card declined").to_string(),
			"BAD_REQUEST_ERROR: Card declined"
		);
	}
}

//! Order ledger client for the checkout coordinator.
//!
//! The ledger is the remote system of record for orders and payment status.
//! This crate wraps its four request/response operations behind a uniform
//! interface so the coordinator can create orders, forward provider
//! completions for verification, report failures and poll status without
//! knowing which ledger it talks to.

use async_trait::async_trait;
use checkout_types::{
	truncate_id, Buyer, ConfigSchema, CreatedOrder, ImplementationRegistry, LedgerStatus,
	SignaturePayload, Verification,
};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod memory;
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// The ledger could not be reached, timed out or failed internally.
	#[error("Ledger unreachable: {0}")]
	Unreachable(String),
	/// The ledger answered but refused the request.
	#[error("Ledger rejected request: {0}")]
	Rejected(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface to a remote order ledger.
///
/// All operations are idempotent from the caller's perspective; the ledger
/// enforces that repeated verification or failure reports do not corrupt
/// its records.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Returns the configuration schema for this ledger implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Creates an order for the given amount (major units) and buyer.
	async fn create_order(&self, amount: u64, buyer: &Buyer) -> Result<CreatedOrder, LedgerError>;

	/// Forwards the provider's completion payload for verification.
	///
	/// The payload is opaque here; only the ledger checks the signature.
	async fn verify_payment(
		&self,
		order_id: &str,
		payload: &SignaturePayload,
	) -> Result<Verification, LedgerError>;

	/// Records why a payment failed. Best-effort.
	async fn report_failure(
		&self,
		order_id: &str,
		code: &str,
		description: &str,
	) -> Result<(), LedgerError>;

	/// Reads the current payment status of an order.
	async fn fetch_status(&self, order_id: &str) -> Result<LedgerStatus, LedgerError>;
}

/// Type alias for ledger factory functions.
pub type LedgerFactory = fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError>;

/// Registry trait for ledger implementations.
pub trait LedgerRegistry: ImplementationRegistry<Factory = LedgerFactory> {}

/// Get all registered ledger implementations.
///
/// Returns a vector of (name, factory) tuples used by the service to build
/// the configured ledger.
pub fn get_all_implementations() -> Vec<(&'static str, LedgerFactory)> {
	use implementations::{http, memory};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Service wrapping a ledger implementation with an explicit per-call timeout.
///
/// No ledger call may stall the coordinator indefinitely; an elapsed timeout
/// is reported as [`LedgerError::Unreachable`].
pub struct LedgerService {
	/// The underlying ledger implementation.
	implementation: Box<dyn LedgerInterface>,
	/// Upper bound for each call.
	timeout: Duration,
}

impl LedgerService {
	/// Creates a new LedgerService with the given implementation and timeout.
	pub fn new(implementation: Box<dyn LedgerInterface>, timeout: Duration) -> Self {
		Self {
			implementation,
			timeout,
		}
	}

	#[instrument(skip_all, fields(amount = amount))]
	pub async fn create_order(
		&self,
		amount: u64,
		buyer: &Buyer,
	) -> Result<CreatedOrder, LedgerError> {
		let created = self
			.bounded(self.timeout, self.implementation.create_order(amount, buyer))
			.await?;
		tracing::info!(
			order_id = %truncate_id(&created.order_id),
			amount = created.amount,
			currency = %created.currency,
			"Ledger created order"
		);
		Ok(created)
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn verify_payment(
		&self,
		order_id: &str,
		payload: &SignaturePayload,
	) -> Result<Verification, LedgerError> {
		let verification = self
			.bounded(
				self.timeout,
				self.implementation.verify_payment(order_id, payload),
			)
			.await?;
		tracing::info!(verified = verification.verified, "Ledger answered verification");
		Ok(verification)
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), code = %code))]
	pub async fn report_failure(
		&self,
		order_id: &str,
		code: &str,
		description: &str,
	) -> Result<(), LedgerError> {
		self.bounded(
			self.timeout,
			self.implementation
				.report_failure(order_id, code, description),
		)
		.await
	}

	/// Fetches the status, bounded by the shorter of `limit` and the service timeout.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn fetch_status_within(
		&self,
		order_id: &str,
		limit: Duration,
	) -> Result<LedgerStatus, LedgerError> {
		self.bounded(
			limit.min(self.timeout),
			self.implementation.fetch_status(order_id),
		)
		.await
	}

	pub async fn fetch_status(&self, order_id: &str) -> Result<LedgerStatus, LedgerError> {
		self.fetch_status_within(order_id, self.timeout).await
	}

	async fn bounded<T>(
		&self,
		limit: Duration,
		call: impl Future<Output = Result<T, LedgerError>>,
	) -> Result<T, LedgerError> {
		match tokio::time::timeout(limit, call).await {
			Ok(result) => result,
			Err(_) => Err(LedgerError::Unreachable(format!(
				"request timed out after {}ms",
				limit.as_millis()
			))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use checkout_types::Schema;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	/// Ledger that never answers create/verify and counts status reads.
	struct StalledLedger {
		status_calls: Arc<AtomicU32>,
	}

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), checkout_types::ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	#[async_trait]
	impl LedgerInterface for StalledLedger {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}

		async fn create_order(&self, _: u64, _: &Buyer) -> Result<CreatedOrder, LedgerError> {
			std::future::pending().await
		}

		async fn verify_payment(
			&self,
			_: &str,
			_: &SignaturePayload,
		) -> Result<Verification, LedgerError> {
			std::future::pending().await
		}

		async fn report_failure(&self, _: &str, _: &str, _: &str) -> Result<(), LedgerError> {
			Ok(())
		}

		async fn fetch_status(&self, _: &str) -> Result<LedgerStatus, LedgerError> {
			self.status_calls.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(Duration::from_secs(10)).await;
			Ok(LedgerStatus::Pending)
		}
	}

	fn service(timeout: Duration) -> (LedgerService, Arc<AtomicU32>) {
		let status_calls = Arc::new(AtomicU32::new(0));
		let ledger = StalledLedger {
			status_calls: status_calls.clone(),
		};
		(LedgerService::new(Box::new(ledger), timeout), status_calls)
	}

	#[tokio::test(start_paused = true)]
	async fn test_stalled_create_times_out_as_unreachable() {
		let (service, _) = service(Duration::from_secs(30));
		let buyer = Buyer::new("Asha", "asha@example.com", "9999999999");

		let started = tokio::time::Instant::now();
		let err = service.create_order(199, &buyer).await.unwrap_err();
		assert!(matches!(err, LedgerError::Unreachable(_)));
		assert_eq!(started.elapsed(), Duration::from_secs(30));
	}

	#[tokio::test(start_paused = true)]
	async fn test_fetch_status_uses_shorter_limit() {
		let (service, calls) = service(Duration::from_secs(30));

		let started = tokio::time::Instant::now();
		let err = service
			.fetch_status_within("o1", Duration::from_secs(5))
			.await
			.unwrap_err();
		assert!(matches!(err, LedgerError::Unreachable(_)));
		assert_eq!(started.elapsed(), Duration::from_secs(5));
		assert_eq!(calls.load(Ordering::SeqCst), 1);

		// Within the service timeout the slow answer still arrives
		let status = service.fetch_status("o1").await.unwrap();
		assert_eq!(status, LedgerStatus::Pending);
	}

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["http", "memory"]);
	}
}

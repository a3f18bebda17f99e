//! In-process sandbox ledger.
//!
//! Keeps orders in a map so the coordinator can run without a remote
//! ledger during development and tests. It follows the remote service's
//! observable behavior: amounts come back in minor units, verification
//! succeeds only for a well-formed payload naming the order, and failure
//! reports mark the order failed.
//!
//! At most `max_records` orders are kept; creating one more evicts the
//! oldest.

use crate::{LedgerError, LedgerInterface};
use async_trait::async_trait;
use checkout_types::{
	Buyer, ConfigSchema, CreatedOrder, Field, FieldType, LedgerStatus, Schema, SignaturePayload,
	ValidationError, Verification,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One order as the sandbox ledger records it.
#[derive(Debug, Clone)]
pub struct LedgerRecord {
	pub amount: u64,
	pub currency: String,
	pub buyer: Buyer,
	pub status: LedgerStatus,
	/// Failure reports received, as (code, description).
	pub failures: Vec<(String, String)>,
}

const DEFAULT_MAX_RECORDS: usize = 10_000;

#[derive(Default)]
struct Records {
	by_id: HashMap<String, LedgerRecord>,
	/// Order ids, oldest first.
	created: VecDeque<String>,
}

impl Records {
	fn get_mut(&mut self, order_id: &str) -> Result<&mut LedgerRecord, LedgerError> {
		self.by_id
			.get_mut(order_id)
			.ok_or_else(|| unknown_order(order_id))
	}
}

/// Sandbox ledger backed by a map.
pub struct MemoryLedger {
	records: Arc<RwLock<Records>>,
	currency: String,
	minor_unit_factor: u64,
	max_records: usize,
}

impl MemoryLedger {
	pub fn new(currency: impl Into<String>, minor_unit_factor: u64) -> Self {
		Self {
			records: Arc::new(RwLock::new(Records::default())),
			currency: currency.into(),
			minor_unit_factor,
			max_records: DEFAULT_MAX_RECORDS,
		}
	}

	/// Caps how many orders are kept.
	pub fn with_max_records(mut self, max_records: usize) -> Self {
		self.max_records = max_records.max(1);
		self
	}

	/// Returns a copy of the record for an order.
	pub async fn record(&self, order_id: &str) -> Option<LedgerRecord> {
		self.records.read().await.by_id.get(order_id).cloned()
	}

	/// Number of orders currently kept.
	pub async fn record_count(&self) -> usize {
		self.records.read().await.by_id.len()
	}
}

impl Default for MemoryLedger {
	fn default() -> Self {
		Self::new("INR", 100)
	}
}

fn unknown_order(order_id: &str) -> LedgerError {
	LedgerError::Rejected(format!("Unknown order {}", order_id))
}

#[async_trait]
impl LedgerInterface for MemoryLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryLedgerSchema)
	}

	async fn create_order(&self, amount: u64, buyer: &Buyer) -> Result<CreatedOrder, LedgerError> {
		if amount == 0 {
			return Err(LedgerError::Rejected("Amount must be positive".to_string()));
		}
		let amount = amount
			.checked_mul(self.minor_unit_factor)
			.ok_or_else(|| LedgerError::Rejected("Amount too large".to_string()))?;

		let order_id = format!("order_{}", Uuid::new_v4().simple());
		let mut records = self.records.write().await;
		while records.created.len() >= self.max_records {
			let Some(oldest) = records.created.pop_front() else {
				break;
			};
			records.by_id.remove(&oldest);
			tracing::debug!(order_id = %oldest, "Evicted oldest sandbox order");
		}
		records.created.push_back(order_id.clone());
		records.by_id.insert(
			order_id.clone(),
			LedgerRecord {
				amount,
				currency: self.currency.clone(),
				buyer: buyer.clone(),
				status: LedgerStatus::Pending,
				failures: Vec::new(),
			},
		);

		Ok(CreatedOrder {
			order_id,
			amount,
			currency: self.currency.clone(),
		})
	}

	async fn verify_payment(
		&self,
		order_id: &str,
		payload: &SignaturePayload,
	) -> Result<Verification, LedgerError> {
		let mut records = self.records.write().await;
		let record = records.get_mut(order_id)?;

		let well_formed = payload.order_id == order_id
			&& !payload.payment_id.is_empty()
			&& !payload.signature.is_empty();
		if !well_formed || record.status == LedgerStatus::Failed {
			return Ok(Verification::declined("Payment verification failed"));
		}

		record.status = LedgerStatus::Success;
		Ok(Verification::accepted())
	}

	async fn report_failure(
		&self,
		order_id: &str,
		code: &str,
		description: &str,
	) -> Result<(), LedgerError> {
		let mut records = self.records.write().await;
		let record = records.get_mut(order_id)?;

		// A verified payment stays verified
		if record.status != LedgerStatus::Success {
			record.status = LedgerStatus::Failed;
		}
		record
			.failures
			.push((code.to_string(), description.to_string()));
		Ok(())
	}

	async fn fetch_status(&self, order_id: &str) -> Result<LedgerStatus, LedgerError> {
		self.records
			.read()
			.await
			.by_id
			.get(order_id)
			.map(|record| record.status)
			.ok_or_else(|| unknown_order(order_id))
	}
}

/// Configuration schema for MemoryLedger.
pub struct MemoryLedgerSchema;

impl ConfigSchema for MemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("currency", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(code) if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) => Ok(()),
						_ => Err("currency must be a three-letter uppercase code".to_string()),
					}
				}),
				Field::new(
					"minor_unit_factor",
					FieldType::Integer {
						min: Some(1),
						max: Some(10_000),
					},
				),
				Field::new(
					"max_records",
					FieldType::Integer {
						min: Some(1),
						max: Some(1_000_000),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a sandbox ledger from configuration.
///
/// Configuration parameters:
/// - `currency`: currency code of created orders (default: "INR")
/// - `minor_unit_factor`: multiplier from submitted to recorded amounts (default: 100)
/// - `max_records`: orders kept before the oldest is evicted (default: 10000)
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	MemoryLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(format!("Invalid configuration: {}", e)))?;

	let currency = config
		.get("currency")
		.and_then(|v| v.as_str())
		.unwrap_or("INR");
	let minor_unit_factor = config
		.get("minor_unit_factor")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(100);
	let max_records = config
		.get("max_records")
		.and_then(|v| v.as_integer())
		.map(|v| v as usize)
		.unwrap_or(DEFAULT_MAX_RECORDS);

	Ok(Box::new(
		MemoryLedger::new(currency, minor_unit_factor).with_max_records(max_records),
	))
}

/// Registry for the sandbox ledger implementation.
pub struct Registry;

impl checkout_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::LedgerFactory;

	fn factory() -> Self::Factory {
		create_ledger
	}
}

impl crate::LedgerRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	fn buyer() -> Buyer {
		Buyer::new("Asha", "asha@example.com", "9999999999")
	}

	fn payload(order_id: &str) -> SignaturePayload {
		SignaturePayload {
			order_id: order_id.to_string(),
			payment_id: "pay_1".to_string(),
			signature: "sig".to_string(),
		}
	}

	#[tokio::test]
	async fn test_create_and_verify() {
		let ledger = MemoryLedger::default();
		let created = ledger.create_order(199, &buyer()).await.unwrap();
		assert!(created.order_id.starts_with("order_"));
		assert_eq!(created.amount, 19900);
		assert_eq!(created.currency, "INR");
		assert_eq!(
			ledger.fetch_status(&created.order_id).await.unwrap(),
			LedgerStatus::Pending
		);

		let verification = ledger
			.verify_payment(&created.order_id, &payload(&created.order_id))
			.await
			.unwrap();
		assert!(verification.verified);
		assert_eq!(
			ledger.fetch_status(&created.order_id).await.unwrap(),
			LedgerStatus::Success
		);
	}

	#[tokio::test]
	async fn test_mismatched_payload_is_declined() {
		let ledger = MemoryLedger::default();
		let created = ledger.create_order(199, &buyer()).await.unwrap();

		let verification = ledger
			.verify_payment(&created.order_id, &payload("order_other"))
			.await
			.unwrap();
		assert!(!verification.verified);
		assert_eq!(
			ledger.fetch_status(&created.order_id).await.unwrap(),
			LedgerStatus::Pending
		);
	}

	#[tokio::test]
	async fn test_report_failure_marks_failed() {
		let ledger = MemoryLedger::default();
		let created = ledger.create_order(199, &buyer()).await.unwrap();

		ledger
			.report_failure(&created.order_id, "PAYMENT_CANCELLED", "Payment cancelled by user")
			.await
			.unwrap();

		let record = ledger.record(&created.order_id).await.unwrap();
		assert_eq!(record.status, LedgerStatus::Failed);
		assert_eq!(
			record.failures,
			vec![(
				"PAYMENT_CANCELLED".to_string(),
				"Payment cancelled by user".to_string()
			)]
		);
	}

	#[tokio::test]
	async fn test_oldest_orders_evicted_beyond_cap() {
		let ledger = MemoryLedger::default().with_max_records(2);
		let first = ledger.create_order(199, &buyer()).await.unwrap();
		let second = ledger.create_order(199, &buyer()).await.unwrap();
		let third = ledger.create_order(199, &buyer()).await.unwrap();

		assert_eq!(ledger.record_count().await, 2);
		assert!(ledger.record(&first.order_id).await.is_none());
		assert!(matches!(
			ledger.fetch_status(&first.order_id).await,
			Err(LedgerError::Rejected(_))
		));
		assert!(ledger.record(&second.order_id).await.is_some());
		assert_eq!(
			ledger.fetch_status(&third.order_id).await.unwrap(),
			LedgerStatus::Pending
		);
	}

	#[tokio::test]
	async fn test_unknown_order_rejected() {
		let ledger = MemoryLedger::default();
		assert!(matches!(
			ledger.fetch_status("missing").await,
			Err(LedgerError::Rejected(_))
		));
	}

	#[test]
	fn test_schema_rejects_bad_currency() {
		let config: toml::Value = toml::from_str("currency = \"rupees\"").unwrap();
		assert!(create_ledger(&config).is_err());

		let config: toml::Value = toml::from_str("currency = \"USD\"\nminor_unit_factor = 100").unwrap();
		let ledger = create_ledger(&config).unwrap();

		// The created ledger reports the same schema it was validated with
		let bad: toml::Value = toml::from_str("minor_unit_factor = 0").unwrap();
		assert!(ledger.config_schema().validate(&config).is_ok());
		assert!(ledger.config_schema().validate(&bad).is_err());
	}
}

//! Scriptable ledger used by the coordinator and poller tests.

use async_trait::async_trait;
use checkout_ledger::{LedgerError, LedgerInterface};
use checkout_types::{
	Buyer, ConfigSchema, CreatedOrder, LedgerStatus, Schema, SignaturePayload, ValidationError,
	Verification,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

struct FakeState {
	created: CreatedOrder,
	reject_create: bool,
	verification: Result<Verification, String>,
	statuses: VecDeque<Result<LedgerStatus, LedgerError>>,
	default_status: LedgerStatus,
	status_delay: Duration,
	create_calls: u32,
	verify_calls: u32,
	status_calls: u32,
	reports: Vec<(String, String, String)>,
}

/// Ledger whose answers are set by the test. Clones share state.
#[derive(Clone)]
pub struct FakeLedger {
	state: Arc<Mutex<FakeState>>,
}

impl FakeLedger {
	/// Creates order `o1` (19900 INR), verifies everything and reports `pending`.
	pub fn new() -> Self {
		Self {
			state: Arc::new(Mutex::new(FakeState {
				created: CreatedOrder {
					order_id: "o1".to_string(),
					amount: 19900,
					currency: "INR".to_string(),
				},
				reject_create: false,
				verification: Ok(Verification::accepted()),
				statuses: VecDeque::new(),
				default_status: LedgerStatus::Pending,
				status_delay: Duration::ZERO,
				create_calls: 0,
				verify_calls: 0,
				status_calls: 0,
				reports: Vec::new(),
			})),
		}
	}

	fn state(&self) -> MutexGuard<'_, FakeState> {
		self.state.lock().unwrap()
	}

	pub fn reject_create(&self) {
		self.state().reject_create = true;
	}

	pub fn set_created_order(&self, order_id: &str) {
		self.state().created.order_id = order_id.to_string();
	}

	pub fn set_verification(&self, verification: Result<Verification, String>) {
		self.state().verification = verification;
	}

	/// Answers for the next status checks, before falling back to the default.
	pub fn script_statuses(&self, statuses: Vec<Result<LedgerStatus, LedgerError>>) {
		self.state().statuses = statuses.into();
	}

	pub fn set_default_status(&self, status: LedgerStatus) {
		self.state().default_status = status;
	}

	pub fn set_status_delay(&self, delay: Duration) {
		self.state().status_delay = delay;
	}

	pub fn create_calls(&self) -> u32 {
		self.state().create_calls
	}

	pub fn verify_calls(&self) -> u32 {
		self.state().verify_calls
	}

	pub fn status_calls(&self) -> u32 {
		self.state().status_calls
	}

	/// Failure reports received, as (order id, code, description).
	pub fn reports(&self) -> Vec<(String, String, String)> {
		self.state().reports.clone()
	}
}

struct NoSchema;

impl ConfigSchema for NoSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

#[async_trait]
impl LedgerInterface for FakeLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoSchema)
	}

	async fn create_order(&self, _amount: u64, _buyer: &Buyer) -> Result<CreatedOrder, LedgerError> {
		let mut state = self.state();
		state.create_calls += 1;
		if state.reject_create {
			return Err(LedgerError::Rejected("ledger reported failure".to_string()));
		}
		Ok(state.created.clone())
	}

	async fn verify_payment(
		&self,
		_order_id: &str,
		_payload: &SignaturePayload,
	) -> Result<Verification, LedgerError> {
		let mut state = self.state();
		state.verify_calls += 1;
		state
			.verification
			.clone()
			.map_err(LedgerError::Unreachable)
	}

	async fn report_failure(
		&self,
		order_id: &str,
		code: &str,
		description: &str,
	) -> Result<(), LedgerError> {
		self.state().reports.push((
			order_id.to_string(),
			code.to_string(),
			description.to_string(),
		));
		Ok(())
	}

	async fn fetch_status(&self, _order_id: &str) -> Result<LedgerStatus, LedgerError> {
		let (answer, delay) = {
			let mut state = self.state();
			state.status_calls += 1;
			let default = state.default_status;
			let answer = state.statuses.pop_front().unwrap_or(Ok(default));
			(answer, state.status_delay)
		};
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		answer
	}
}

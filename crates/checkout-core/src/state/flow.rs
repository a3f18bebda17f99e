//! Payment-flow state machine.
//!
//! The coordinator's state changes only here. [`FlowStateMachine::apply`]
//! takes one signal (a buyer command, a network result, a provider event or
//! a poller update), commits at most one phase change and returns the side
//! effects the engine must carry out. It never performs I/O itself, so the
//! arbitration between provider events and poll results is decided purely
//! by the order in which signals are applied:
//!
//! Idle -> Creating -> AwaitingPayment -> (Verifying) -> Succeeded | Failed -> Idle
//!
//! Signals for another order, or arriving after a terminal phase, are
//! discarded without effect.

use checkout_types::{
	truncate_id, Buyer, CheckoutOptions, CheckoutPhase, CreatedOrder, FailureReason, FlowSnapshot,
	LedgerStatus, Order, ProviderEvent, SignaturePayload, Verification,
};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors returned for signals the current phase refuses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
	#[error("Please fill all the fields (missing: {})", .missing.join(", "))]
	InvalidBuyer { missing: Vec<&'static str> },
	#[error("An order is already in progress (phase: {0})")]
	OrderInProgress(CheckoutPhase),
	#[error("Cannot reset while {0}")]
	ResetNotAllowed(CheckoutPhase),
	#[error("Invalid phase transition from {from} to {to}")]
	InvalidTransition {
		from: CheckoutPhase,
		to: CheckoutPhase,
	},
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
	/// Buyer submitted billing details.
	Submit { buyer: Buyer, amount: u64 },
	/// Presentation layer asks to start over after a terminal phase.
	Reset,
	/// Ledger created the order requested by submit number `attempt`.
	OrderCreated {
		attempt: u64,
		created: CreatedOrder,
		created_at: u64,
	},
	/// Ledger could not create the order requested by submit number `attempt`.
	CreateFailed { attempt: u64, message: String },
	/// Event from the provider session of `order_id`.
	Provider {
		order_id: String,
		event: ProviderEvent,
	},
	/// The poller finished status check number `attempt`.
	PollAttempted { order_id: String, attempt: u32 },
	/// The poller observed a terminal ledger status.
	PollSettled {
		order_id: String,
		status: LedgerStatus,
	},
	/// The poller ran out of attempts.
	PollTimedOut { order_id: String, attempts: u32 },
	/// Ledger answered the verification request.
	Verified {
		order_id: String,
		verification: Verification,
	},
	/// Verification request failed without an answer.
	VerifyFailed { order_id: String, message: String },
}

impl Signal {
	fn name(&self) -> &'static str {
		match self {
			Signal::Submit { .. } => "submit",
			Signal::Reset => "reset",
			Signal::OrderCreated { .. } => "order_created",
			Signal::CreateFailed { .. } => "create_failed",
			Signal::Provider { .. } => "provider",
			Signal::PollAttempted { .. } => "poll_attempted",
			Signal::PollSettled { .. } => "poll_settled",
			Signal::PollTimedOut { .. } => "poll_timed_out",
			Signal::Verified { .. } => "verified",
			Signal::VerifyFailed { .. } => "verify_failed",
		}
	}
}

/// Side effect requested by a transition, executed by the engine in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
	CreateOrder {
		attempt: u64,
		amount: u64,
		buyer: Buyer,
	},
	OpenSession { order: Order },
	StartPoller { order_id: String },
	StopPoller,
	CloseSession,
	VerifyPayment {
		order_id: String,
		payload: SignaturePayload,
	},
	/// Fire-and-forget failure report to the ledger.
	ReportFailure {
		order_id: String,
		reason: FailureReason,
	},
	/// One-time navigation to the confirmation location.
	Navigate { order: Order },
	/// Blocking notice for the buyer.
	SurfaceNotice { message: String },
}

/// The coordinator's own view of the checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowState {
	pub phase: CheckoutPhase,
	/// Buyer of the order being created.
	pub pending_buyer: Option<Buyer>,
	/// Current order once the ledger created it.
	pub active_order: Option<Order>,
	/// Status checks completed since payment began.
	pub poll_attempts: u32,
	pub failure: Option<FailureReason>,
	pub notice: Option<String>,
	pub poller_started: bool,
	pub navigated: bool,
	/// Number of submits accepted so far; tags create results.
	pub attempt: u64,
}

impl FlowState {
	pub fn snapshot(&self, session: Option<CheckoutOptions>) -> FlowSnapshot {
		FlowSnapshot {
			phase: self.phase,
			order: self.active_order.clone(),
			poll_attempts: self.poll_attempts,
			failure: self.failure.clone(),
			notice: self.notice.clone(),
			session,
		}
	}

	fn is_active(&self, order_id: &str) -> bool {
		self.active_order
			.as_ref()
			.is_some_and(|order| order.id == order_id)
	}
}

/// Pure transition function over [`FlowState`].
#[derive(Debug, Default)]
pub struct FlowStateMachine {
	state: FlowState,
}

impl FlowStateMachine {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn state(&self) -> &FlowState {
		&self.state
	}

	pub fn phase(&self) -> CheckoutPhase {
		self.state.phase
	}

	/// Applies one signal and returns the effects to execute.
	///
	/// Commands the current phase refuses return an error and leave the
	/// state untouched. Stale or foreign signals return no effects.
	pub fn apply(&mut self, signal: Signal) -> Result<Vec<Effect>, FlowError> {
		let name = signal.name();
		match signal {
			Signal::Submit { buyer, amount } => self.submit(buyer, amount),
			Signal::Reset => self.reset(),
			Signal::OrderCreated {
				attempt,
				created,
				created_at,
			} => {
				if !self.creating(attempt) {
					return Ok(self.discard(name, None));
				}
				let Some(buyer) = self.state.pending_buyer.take() else {
					return Ok(self.discard(name, None));
				};
				let order = Order::from_created(created, buyer, created_at);
				self.transition(CheckoutPhase::AwaitingPayment)?;
				self.state.active_order = Some(order.clone());
				self.state.poll_attempts = 0;
				Ok(vec![Effect::OpenSession { order }])
			},
			Signal::CreateFailed { attempt, message } => {
				if !self.creating(attempt) {
					return Ok(self.discard(name, None));
				}
				self.transition(CheckoutPhase::Idle)?;
				self.state.pending_buyer = None;
				self.state.notice = Some(message.clone());
				Ok(vec![Effect::SurfaceNotice { message }])
			},
			Signal::Provider { order_id, event } => {
				if !self.awaiting(&order_id) {
					return Ok(self.discard(name, Some(&order_id)));
				}
				match event {
					ProviderEvent::Ready => {
						if self.state.poller_started {
							return Ok(Vec::new());
						}
						self.state.poller_started = true;
						Ok(vec![Effect::StartPoller { order_id }])
					},
					ProviderEvent::Completed { payload } => {
						self.transition(CheckoutPhase::Verifying)?;
						Ok(vec![
							Effect::StopPoller,
							Effect::VerifyPayment { order_id, payload },
						])
					},
					ProviderEvent::Failed { code, description } => {
						self.fail(order_id, FailureReason::provider(code, description))
					},
					ProviderEvent::Dismissed => self.fail(order_id, FailureReason::cancelled()),
				}
			},
			Signal::PollAttempted { order_id, attempt } => {
				if self.awaiting(&order_id) {
					self.state.poll_attempts = self.state.poll_attempts.max(attempt);
				}
				Ok(Vec::new())
			},
			Signal::PollSettled { order_id, status } => {
				if !self.awaiting(&order_id) {
					return Ok(self.discard(name, Some(&order_id)));
				}
				match status {
					LedgerStatus::Success => self.succeed(),
					LedgerStatus::Failed => self.fail(order_id, FailureReason::ledger_reported()),
					LedgerStatus::Pending | LedgerStatus::Unrecognized => Ok(Vec::new()),
				}
			},
			Signal::PollTimedOut { order_id, attempts } => {
				if !self.awaiting(&order_id) {
					return Ok(self.discard(name, Some(&order_id)));
				}
				self.state.poll_attempts = self.state.poll_attempts.max(attempts);
				self.fail(order_id, FailureReason::poll_timeout(attempts))
			},
			Signal::Verified {
				order_id,
				verification,
			} => {
				if !self.verifying(&order_id) {
					return Ok(self.discard(name, Some(&order_id)));
				}
				if verification.verified {
					return self.succeed();
				}
				let message = verification
					.message
					.unwrap_or_else(|| "Payment verification failed".to_string());
				self.fail_verification(order_id, message)
			},
			Signal::VerifyFailed { order_id, message } => {
				if !self.verifying(&order_id) {
					return Ok(self.discard(name, Some(&order_id)));
				}
				self.fail_verification(order_id, message)
			},
		}
	}

	fn submit(&mut self, buyer: Buyer, amount: u64) -> Result<Vec<Effect>, FlowError> {
		if self.state.phase.is_in_flight() {
			return Err(FlowError::OrderInProgress(self.state.phase));
		}
		let missing = buyer.missing_fields();
		if !missing.is_empty() {
			return Err(FlowError::InvalidBuyer { missing });
		}

		// Resubmitting after a terminal phase starts over
		if self.state.phase.is_terminal() {
			self.reset()?;
		}

		self.transition(CheckoutPhase::Creating)?;
		self.state.attempt += 1;
		self.state.notice = None;
		self.state.pending_buyer = Some(buyer.clone());
		Ok(vec![Effect::CreateOrder {
			attempt: self.state.attempt,
			amount,
			buyer,
		}])
	}

	fn reset(&mut self) -> Result<Vec<Effect>, FlowError> {
		match self.state.phase {
			CheckoutPhase::Idle => Ok(Vec::new()),
			phase if phase.is_terminal() => {
				self.transition(CheckoutPhase::Idle)?;
				self.state = FlowState {
					attempt: self.state.attempt,
					..FlowState::default()
				};
				Ok(Vec::new())
			},
			phase => Err(FlowError::ResetNotAllowed(phase)),
		}
	}

	fn succeed(&mut self) -> Result<Vec<Effect>, FlowError> {
		self.transition(CheckoutPhase::Succeeded)?;
		let mut effects = vec![Effect::StopPoller, Effect::CloseSession];
		if let Some(order) = self.state.active_order.as_ref().filter(|_| !self.state.navigated) {
			effects.push(Effect::Navigate {
				order: order.clone(),
			});
			self.state.navigated = true;
		}
		Ok(effects)
	}

	fn fail(&mut self, order_id: String, reason: FailureReason) -> Result<Vec<Effect>, FlowError> {
		self.transition(CheckoutPhase::Failed)?;
		self.state.failure = Some(reason.clone());
		Ok(vec![
			Effect::StopPoller,
			Effect::CloseSession,
			Effect::ReportFailure { order_id, reason },
		])
	}

	fn fail_verification(
		&mut self,
		order_id: String,
		message: String,
	) -> Result<Vec<Effect>, FlowError> {
		let mut effects = self.fail(order_id, FailureReason::verification(message.clone()))?;
		self.state.notice = Some(message.clone());
		effects.push(Effect::SurfaceNotice { message });
		Ok(effects)
	}

	fn creating(&self, attempt: u64) -> bool {
		self.state.phase == CheckoutPhase::Creating && self.state.attempt == attempt
	}

	fn awaiting(&self, order_id: &str) -> bool {
		self.state.phase == CheckoutPhase::AwaitingPayment && self.state.is_active(order_id)
	}

	fn verifying(&self, order_id: &str) -> bool {
		self.state.phase == CheckoutPhase::Verifying && self.state.is_active(order_id)
	}

	fn discard(&self, signal: &str, order_id: Option<&str>) -> Vec<Effect> {
		tracing::debug!(
			signal,
			phase = %self.state.phase,
			order_id = %order_id.map(truncate_id).unwrap_or_default(),
			"Discarding signal"
		);
		Vec::new()
	}

	fn transition(&mut self, to: CheckoutPhase) -> Result<(), FlowError> {
		let from = self.state.phase;
		if !Self::is_valid_transition(from, to) {
			return Err(FlowError::InvalidTransition { from, to });
		}
		self.state.phase = to;
		Ok(())
	}

	/// Checks if a phase transition is valid
	fn is_valid_transition(from: CheckoutPhase, to: CheckoutPhase) -> bool {
		use CheckoutPhase::*;

		// Static transition table - each phase maps to allowed next phases
		static TRANSITIONS: Lazy<HashMap<CheckoutPhase, HashSet<CheckoutPhase>>> =
			Lazy::new(|| {
				let mut m = HashMap::new();
				m.insert(Idle, HashSet::from([Creating]));
				m.insert(Creating, HashSet::from([AwaitingPayment, Idle]));
				m.insert(
					AwaitingPayment,
					HashSet::from([Verifying, Succeeded, Failed]),
				);
				m.insert(Verifying, HashSet::from([Succeeded, Failed]));
				m.insert(Succeeded, HashSet::from([Idle]));
				m.insert(Failed, HashSet::from([Idle]));
				m
			});

		TRANSITIONS
			.get(&from)
			.is_some_and(|allowed| allowed.contains(&to))
	}
}

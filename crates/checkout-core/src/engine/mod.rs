//! Checkout engine that coordinates one payment flow at a time.
//!
//! The engine owns the [`FlowStateMachine`], the open provider session and
//! the running status poller. It runs a single receive loop over buyer
//! commands, network results, provider events and poller updates, applying
//! each one to the state machine before looking at the next. Network calls
//! are spawned and report back into the loop, so transitions never
//! interleave and never wait on I/O.

pub mod event_bus;

use crate::monitoring::{PollUpdate, PollerHandle, StatusPoller};
use crate::state::{Effect, FlowError, FlowStateMachine, Signal};
use checkout_config::Config;
use checkout_ledger::LedgerService;
use checkout_provider::{ProviderError, ProviderService, SessionHandle};
use checkout_types::{
	current_timestamp, truncate_id, Buyer, CheckoutEvent, FlowSnapshot, ProviderEvent,
	SessionEvent, SESSION_OPEN_FAILED,
};
use event_bus::EventBus;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinSet;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error(transparent)]
	Flow(#[from] FlowError),
	#[error("Checkout engine is not running")]
	Stopped,
}

/// Settings the engine takes from the configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
	/// Amount submitted with every order, in major units.
	pub amount: u64,
	/// Navigation target after a successful payment.
	pub confirmation_url: String,
	pub poll_interval: Duration,
	pub poll_max_attempts: u32,
}

impl EngineSettings {
	pub fn from_config(config: &Config) -> Self {
		Self {
			amount: config.checkout.amount,
			confirmation_url: config.checkout.confirmation_url.clone(),
			poll_interval: config.polling.interval(),
			poll_max_attempts: config.polling.max_attempts,
		}
	}
}

type Reply = oneshot::Sender<Result<FlowSnapshot, EngineError>>;

enum Command {
	Submit { buyer: Buyer, reply: Reply },
	Reset { reply: Reply },
	Shutdown,
}

/// Coordinator runtime. Consumed by [`CheckoutEngine::run`].
pub struct CheckoutEngine {
	settings: EngineSettings,
	ledger: Arc<LedgerService>,
	provider: Arc<ProviderService>,
	poller: StatusPoller,
	event_bus: EventBus,
	machine: FlowStateMachine,
	/// Session of the active order while it is open.
	session: Option<SessionHandle>,
	/// Poller of the active order while it runs.
	poller_handle: Option<PollerHandle>,
	commands_tx: mpsc::Sender<Command>,
	commands: mpsc::Receiver<Command>,
	signals_tx: mpsc::UnboundedSender<Signal>,
	signals: mpsc::UnboundedReceiver<Signal>,
	session_tx: mpsc::UnboundedSender<SessionEvent>,
	session_events: mpsc::UnboundedReceiver<SessionEvent>,
	snapshot: watch::Sender<FlowSnapshot>,
	/// In-flight ledger calls.
	tasks: JoinSet<()>,
}

impl CheckoutEngine {
	pub fn new(
		settings: EngineSettings,
		ledger: Arc<LedgerService>,
		provider: Arc<ProviderService>,
		event_bus: EventBus,
	) -> Self {
		let poller = StatusPoller::new(
			ledger.clone(),
			settings.poll_interval,
			settings.poll_max_attempts,
		);
		let (commands_tx, commands) = mpsc::channel(64);
		let (signals_tx, signals) = mpsc::unbounded_channel();
		let (session_tx, session_events) = mpsc::unbounded_channel();
		let (snapshot, _) = watch::channel(FlowSnapshot::default());

		Self {
			settings,
			ledger,
			provider,
			poller,
			event_bus,
			machine: FlowStateMachine::new(),
			session: None,
			poller_handle: None,
			commands_tx,
			commands,
			signals_tx,
			signals,
			session_tx,
			session_events,
			snapshot,
			tasks: JoinSet::new(),
		}
	}

	/// Returns a handle for driving the engine once it runs.
	pub fn handle(&self) -> CheckoutHandle {
		CheckoutHandle {
			commands: self.commands_tx.clone(),
			snapshot: self.snapshot.subscribe(),
			event_bus: self.event_bus.clone(),
			provider: self.provider.clone(),
		}
	}

	/// Main loop. Runs until a handle requests shutdown.
	pub async fn run(mut self) -> Result<(), EngineError> {
		tracing::info!(
			amount = self.settings.amount,
			poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
			poll_max_attempts = self.settings.poll_max_attempts,
			"Checkout engine started"
		);

		loop {
			tokio::select! {
				command = self.commands.recv() => match command {
					Some(Command::Submit { buyer, reply }) => {
						let amount = self.settings.amount;
						let result = self.process(Signal::Submit { buyer, amount });
						reply.send(result.map(|()| self.current_snapshot()).map_err(EngineError::from)).ok();
					}
					Some(Command::Reset { reply }) => {
						let result = self.process(Signal::Reset);
						reply.send(result.map(|()| self.current_snapshot()).map_err(EngineError::from)).ok();
					}
					Some(Command::Shutdown) | None => break,
				},

				Some(signal) = self.signals.recv() => {
					if let Err(e) = self.process(signal) {
						tracing::error!(error = %e, "Failed to apply internal signal");
					}
				}

				Some(SessionEvent { order_id, event }) = self.session_events.recv() => {
					if let Err(e) = self.process(Signal::Provider { order_id, event }) {
						tracing::error!(error = %e, "Failed to apply provider event");
					}
				}

				Some(result) = self.tasks.join_next() => {
					if let Err(e) = result {
						tracing::error!(error = %e, "Ledger task failed");
					}
				}
			}
		}

		// Cleanup
		self.stop_poller();
		self.close_session();
		self.tasks.shutdown().await;
		tracing::info!("Checkout engine stopped");

		Ok(())
	}

	/// Applies a signal plus any follow-up signals its effects produce,
	/// then publishes the resulting snapshot.
	fn process(&mut self, signal: Signal) -> Result<(), FlowError> {
		let mut pending = VecDeque::from([signal]);
		let mut result = Ok(());

		while let Some(signal) = pending.pop_front() {
			let from = self.machine.phase();
			let effects = match self.machine.apply(signal) {
				Ok(effects) => effects,
				Err(e) => {
					result = Err(e);
					break;
				},
			};
			let to = self.machine.phase();

			if from != to {
				let order_id = self
					.machine
					.state()
					.active_order
					.as_ref()
					.map(|order| order.id.clone());
				tracing::info!(
					from = %from,
					to = %to,
					order_id = %order_id.as_deref().map(truncate_id).unwrap_or_default(),
					"Checkout phase changed"
				);
				self.event_bus
					.publish(CheckoutEvent::PhaseChanged { from, to, order_id });
			}

			for effect in effects {
				if let Some(follow_up) = self.execute(effect) {
					pending.push_back(follow_up);
				}
			}
		}

		self.snapshot.send_replace(self.current_snapshot());
		result
	}

	/// Carries out one effect. Returns a signal when the effect fails
	/// synchronously and the failure must be fed back into the flow.
	fn execute(&mut self, effect: Effect) -> Option<Signal> {
		match effect {
			Effect::CreateOrder {
				attempt,
				amount,
				buyer,
			} => {
				let ledger = self.ledger.clone();
				let signals = self.signals_tx.clone();
				self.tasks.spawn(async move {
					let signal = match ledger.create_order(amount, &buyer).await {
						Ok(created) => Signal::OrderCreated {
							attempt,
							created,
							created_at: current_timestamp(),
						},
						Err(e) => {
							tracing::warn!(error = %e, "Order creation failed");
							Signal::CreateFailed {
								attempt,
								message: format!("Failed to create order: {}", e),
							}
						},
					};
					signals.send(signal).ok();
				});
				None
			},
			Effect::OpenSession { order } => match self.provider.open(&order, self.session_tx.clone())
			{
				Ok(session) => {
					self.event_bus.publish(CheckoutEvent::SessionOpened {
						options: session.options().clone(),
					});
					self.session = Some(session);
					None
				},
				Err(e) => {
					tracing::warn!(
						order_id = %truncate_id(&order.id),
						error = %e,
						"Failed to open provider session"
					);
					Some(Signal::Provider {
						order_id: order.id,
						event: ProviderEvent::Failed {
							code: SESSION_OPEN_FAILED.to_string(),
							description: e.to_string(),
						},
					})
				},
			},
			Effect::StartPoller { order_id } => {
				self.stop_poller();
				let signals = self.signals_tx.clone();
				let id = order_id.clone();
				let handle = self.poller.start(order_id, move |update| {
					let order_id = id.clone();
					let signal = match update {
						PollUpdate::Attempted { attempt } => Signal::PollAttempted { order_id, attempt },
						PollUpdate::Settled { status } => Signal::PollSettled { order_id, status },
						PollUpdate::TimedOut { attempts } => {
							Signal::PollTimedOut { order_id, attempts }
						},
					};
					signals.send(signal).ok();
				});
				self.poller_handle = Some(handle);
				None
			},
			Effect::StopPoller => {
				self.stop_poller();
				None
			},
			Effect::CloseSession => {
				self.close_session();
				None
			},
			Effect::VerifyPayment { order_id, payload } => {
				let ledger = self.ledger.clone();
				let signals = self.signals_tx.clone();
				self.tasks.spawn(async move {
					let signal = match ledger.verify_payment(&order_id, &payload).await {
						Ok(verification) => Signal::Verified {
							order_id,
							verification,
						},
						Err(e) => {
							tracing::warn!(error = %e, "Payment verification failed");
							Signal::VerifyFailed {
								order_id,
								message: format!("Payment verification failed: {}", e),
							}
						},
					};
					signals.send(signal).ok();
				});
				None
			},
			Effect::ReportFailure { order_id, reason } => {
				tracing::warn!(
					order_id = %truncate_id(&order_id),
					code = %reason.code,
					"Checkout failed: {}",
					reason.description
				);
				self.event_bus.publish(CheckoutEvent::Failed {
					order_id: order_id.clone(),
					reason: reason.clone(),
				});

				let ledger = self.ledger.clone();
				self.tasks.spawn(async move {
					if let Err(e) = ledger
						.report_failure(&order_id, &reason.code, &reason.description)
						.await
					{
						tracing::warn!(
							order_id = %truncate_id(&order_id),
							error = %e,
							"Failed to report payment failure"
						);
					}
				});
				None
			},
			Effect::Navigate { order } => {
				tracing::info!(
					order_id = %truncate_id(&order.id),
					redirect_to = %self.settings.confirmation_url,
					"Payment succeeded"
				);
				self.event_bus.publish(CheckoutEvent::Succeeded {
					order,
					redirect_to: self.settings.confirmation_url.clone(),
				});
				None
			},
			Effect::SurfaceNotice { message } => {
				self.event_bus.publish(CheckoutEvent::Notice { message });
				None
			},
		}
	}

	fn stop_poller(&mut self) {
		if let Some(mut poller) = self.poller_handle.take() {
			poller.stop();
		}
	}

	fn close_session(&mut self) {
		if let Some(mut session) = self.session.take() {
			session.close();
		}
	}

	fn current_snapshot(&self) -> FlowSnapshot {
		let session = self
			.session
			.as_ref()
			.map(|session| session.options().clone());
		self.machine.state().snapshot(session)
	}
}

/// Cloneable front end of a running [`CheckoutEngine`].
#[derive(Clone)]
pub struct CheckoutHandle {
	commands: mpsc::Sender<Command>,
	snapshot: watch::Receiver<FlowSnapshot>,
	event_bus: EventBus,
	provider: Arc<ProviderService>,
}

impl CheckoutHandle {
	/// Submits billing details and starts a new order.
	pub async fn submit(&self, buyer: Buyer) -> Result<FlowSnapshot, EngineError> {
		self.request(|reply| Command::Submit { buyer, reply }).await
	}

	/// Returns to the idle phase after a terminal outcome.
	pub async fn reset(&self) -> Result<FlowSnapshot, EngineError> {
		self.request(|reply| Command::Reset { reply }).await
	}

	/// Current coordinator state.
	pub fn snapshot(&self) -> FlowSnapshot {
		self.snapshot.borrow().clone()
	}

	/// Receiver notified on every snapshot change.
	pub fn watch(&self) -> watch::Receiver<FlowSnapshot> {
		self.snapshot.clone()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<CheckoutEvent> {
		self.event_bus.subscribe()
	}

	/// Forwards a widget callback reported by the presentation layer.
	pub fn relay(&self, order_id: &str, event: ProviderEvent) -> Result<(), ProviderError> {
		self.provider.relay(order_id, event)
	}

	/// Asks the engine to stop.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		self.commands
			.send(Command::Shutdown)
			.await
			.map_err(|_| EngineError::Stopped)
	}

	pub fn is_running(&self) -> bool {
		!self.commands.is_closed()
	}

	async fn request<F>(&self, command: F) -> Result<FlowSnapshot, EngineError>
	where
		F: FnOnce(Reply) -> Command,
	{
		let (reply, response) = oneshot::channel();
		self.commands
			.send(command(reply))
			.await
			.map_err(|_| EngineError::Stopped)?;
		response.await.map_err(|_| EngineError::Stopped)?
	}
}

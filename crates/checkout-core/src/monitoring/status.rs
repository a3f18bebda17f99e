//! Status polling for orders awaiting payment.
//!
//! Polls the ledger at a fixed interval until it reports a terminal status
//! or the attempt budget runs out. Ledger errors are logged and retried on
//! the next tick; they never end the polling on their own.

use checkout_ledger::LedgerService;
use checkout_types::{truncate_id, LedgerStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Progress reported by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollUpdate {
	/// Status check number `attempt` completed, whatever its result.
	Attempted { attempt: u32 },
	/// The ledger reported a terminal status; polling stopped.
	Settled { status: LedgerStatus },
	/// No terminal status within `attempts` checks; polling stopped.
	TimedOut { attempts: u32 },
}

pub struct StatusPoller {
	ledger: Arc<LedgerService>,
	interval: Duration,
	max_attempts: u32,
}

impl StatusPoller {
	pub fn new(ledger: Arc<LedgerService>, interval: Duration, max_attempts: u32) -> Self {
		Self {
			ledger,
			interval,
			max_attempts,
		}
	}

	/// Starts polling `order_id` and returns the handle that owns the task.
	///
	/// Checks run at `k * interval` for `k = 0..max_attempts`, each bounded by
	/// the interval, so polling ends within `interval * max_attempts`. The
	/// first check runs immediately instead of one interval after start, so
	/// a payment the ledger already settled is picked up without delay.
	pub fn start<F>(&self, order_id: String, on_update: F) -> PollerHandle
	where
		F: Fn(PollUpdate) + Send + 'static,
	{
		let task = tokio::spawn(poll(
			self.ledger.clone(),
			order_id,
			self.interval,
			self.max_attempts,
			on_update,
		));
		PollerHandle { task: Some(task) }
	}
}

#[instrument(skip_all, fields(order_id = %truncate_id(&order_id)))]
async fn poll<F>(
	ledger: Arc<LedgerService>,
	order_id: String,
	interval: Duration,
	max_attempts: u32,
	on_update: F,
) where
	F: Fn(PollUpdate) + Send + 'static,
{
	let mut ticker = tokio::time::interval(interval);

	for attempt in 1..=max_attempts {
		ticker.tick().await;

		match ledger.fetch_status_within(&order_id, interval).await {
			Ok(status) if status.is_terminal() => {
				tracing::info!(attempt, status = %status, "Ledger reported terminal status");
				on_update(PollUpdate::Attempted { attempt });
				on_update(PollUpdate::Settled { status });
				return;
			},
			Ok(status) => {
				tracing::debug!(attempt, status = %status, "Payment still open");
			},
			Err(e) => {
				tracing::warn!(attempt, error = %e, "Status check failed, retrying on next tick");
			},
		}
		on_update(PollUpdate::Attempted { attempt });
	}

	tracing::warn!(
		attempts = max_attempts,
		"Payment status inconclusive, giving up"
	);
	on_update(PollUpdate::TimedOut {
		attempts: max_attempts,
	});
}

/// Ownership of a running poller. Stops the task on drop.
#[derive(Debug)]
pub struct PollerHandle {
	task: Option<JoinHandle<()>>,
}

impl PollerHandle {
	/// Stops polling. Safe to call any number of times, including after the
	/// poller stopped itself.
	pub fn stop(&mut self) {
		if let Some(task) = self.task.take() {
			task.abort();
		}
	}

	/// True once the poller was stopped or finished on its own.
	pub fn is_stopped(&self) -> bool {
		self.task.as_ref().is_none_or(|task| task.is_finished())
	}
}

impl Drop for PollerHandle {
	fn drop(&mut self) {
		self.stop();
	}
}

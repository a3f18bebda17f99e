//! Simulated provider for local development.
//!
//! Each session runs a timer task that reports `Ready` and then a
//! configured outcome, standing in for a buyer working through the real
//! widget. Closing a session aborts its task.

use crate::{ProviderError, ProviderInterface, SessionChannel};
use checkout_types::{
	CheckoutOptions, ConfigSchema, Field, FieldType, ProviderEvent, Schema, SessionEvent,
	SignaturePayload, ValidationError,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// What the simulated buyer does once the UI is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedOutcome {
	Completed,
	Failed,
	Dismissed,
	/// Never reports an outcome; only status polling can settle the order.
	None,
}

impl SimulatedOutcome {
	fn parse(value: &str) -> Option<Self> {
		match value {
			"completed" => Some(Self::Completed),
			"failed" => Some(Self::Failed),
			"dismissed" => Some(Self::Dismissed),
			"none" => Some(Self::None),
			_ => None,
		}
	}

	fn event(&self, order_id: &str) -> Option<ProviderEvent> {
		match self {
			Self::Completed => Some(ProviderEvent::Completed {
				payload: SignaturePayload {
					order_id: order_id.to_string(),
					payment_id: format!("pay_sim_{}", Uuid::new_v4().simple()),
					signature: "simulated".to_string(),
				},
			}),
			Self::Failed => Some(ProviderEvent::Failed {
				code: "BAD_REQUEST_ERROR".to_string(),
				description: "Payment declined by simulated provider".to_string(),
			}),
			Self::Dismissed => Some(ProviderEvent::Dismissed),
			Self::None => None,
		}
	}
}

/// Provider that scripts the widget's callbacks with timers.
pub struct SimulatedProvider {
	ready_delay: Duration,
	outcome_delay: Duration,
	outcome: SimulatedOutcome,
	tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SimulatedProvider {
	pub fn new(ready_delay: Duration, outcome_delay: Duration, outcome: SimulatedOutcome) -> Self {
		Self {
			ready_delay,
			outcome_delay,
			outcome,
			tasks: Mutex::new(HashMap::new()),
		}
	}

	fn tasks(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
		self.tasks.lock().unwrap_or_else(|e| e.into_inner())
	}
}

impl ProviderInterface for SimulatedProvider {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedProviderSchema)
	}

	fn open(
		&self,
		options: &CheckoutOptions,
		events: mpsc::UnboundedSender<SessionEvent>,
	) -> Result<(), ProviderError> {
		let mut tasks = self.tasks();
		if tasks
			.get(&options.order_id)
			.is_some_and(|task| !task.is_finished())
		{
			return Err(ProviderError::SessionExists(options.order_id.clone()));
		}

		let runtime = tokio::runtime::Handle::try_current()
			.map_err(|e| ProviderError::OpenFailed(e.to_string()))?;

		let order_id = options.order_id.clone();
		let mut channel = SessionChannel::new(order_id.clone(), events);
		let (ready_delay, outcome_delay, outcome) =
			(self.ready_delay, self.outcome_delay, self.outcome);

		let task = runtime.spawn(async move {
			tokio::time::sleep(ready_delay).await;
			channel.emit(ProviderEvent::Ready);

			if let Some(event) = outcome.event(&order_id) {
				tokio::time::sleep(outcome_delay).await;
				channel.emit(event);
			}
		});
		tasks.insert(options.order_id.clone(), task);
		Ok(())
	}

	fn close(&self, order_id: &str) {
		if let Some(task) = self.tasks().remove(order_id) {
			task.abort();
		}
	}
}

impl Drop for SimulatedProvider {
	fn drop(&mut self) {
		for (_, task) in self.tasks().drain() {
			task.abort();
		}
	}
}

/// Configuration schema for SimulatedProvider.
pub struct SimulatedProviderSchema;

impl ConfigSchema for SimulatedProviderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let delay = || FieldType::Integer {
			min: Some(0),
			max: Some(600_000),
		};
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("ready_delay_ms", delay()),
				Field::new("outcome_delay_ms", delay()),
				Field::new(
					"outcome",
					FieldType::OneOf(&["completed", "failed", "dismissed", "none"]),
				),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create the simulated provider from configuration.
///
/// Configuration parameters:
/// - `ready_delay_ms`: delay before `Ready` (default: 500)
/// - `outcome_delay_ms`: delay between `Ready` and the outcome (default: 3000)
/// - `outcome`: one of completed, failed, dismissed, none (default: completed)
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn ProviderInterface>, ProviderError> {
	SimulatedProviderSchema
		.validate(config)
		.map_err(|e| ProviderError::Configuration(format!("Invalid configuration: {}", e)))?;

	let millis = |key: &str, default: u64| {
		config
			.get(key)
			.and_then(|v| v.as_integer())
			.map(|v| v as u64)
			.unwrap_or(default)
	};
	let outcome = config
		.get("outcome")
		.and_then(|v| v.as_str())
		.and_then(SimulatedOutcome::parse)
		.unwrap_or(SimulatedOutcome::Completed);

	Ok(Box::new(SimulatedProvider::new(
		Duration::from_millis(millis("ready_delay_ms", 500)),
		Duration::from_millis(millis("outcome_delay_ms", 3000)),
		outcome,
	)))
}

/// Registry for the simulated provider implementation.
pub struct Registry;

impl checkout_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "simulated";
	type Factory = crate::ProviderFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::ProviderRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use checkout_types::Prefill;

	fn options(order_id: &str) -> CheckoutOptions {
		CheckoutOptions {
			key: "rzp_test_key".to_string(),
			amount: 19900,
			currency: "INR".to_string(),
			name: "Shop".to_string(),
			description: "Product Purchase".to_string(),
			order_id: order_id.to_string(),
			prefill: Prefill {
				name: "Asha".to_string(),
				email: "asha@example.com".to_string(),
				contact: "9999999999".to_string(),
			},
			theme_color: "#4C5FD5".to_string(),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_scripted_events() {
		let provider = SimulatedProvider::new(
			Duration::from_millis(500),
			Duration::from_secs(3),
			SimulatedOutcome::Completed,
		);
		let (tx, mut rx) = mpsc::unbounded_channel();
		provider.open(&options("o1"), tx).unwrap();

		let started = tokio::time::Instant::now();
		let ready = rx.recv().await.unwrap();
		assert_eq!(ready.event, ProviderEvent::Ready);
		assert_eq!(started.elapsed(), Duration::from_millis(500));

		let completed = rx.recv().await.unwrap();
		match completed.event {
			ProviderEvent::Completed { payload } => assert_eq!(payload.order_id, "o1"),
			other => panic!("unexpected event {:?}", other),
		}
		assert_eq!(started.elapsed(), Duration::from_millis(3500));
	}

	#[tokio::test(start_paused = true)]
	async fn test_close_cancels_timers() {
		let provider = SimulatedProvider::new(
			Duration::from_millis(500),
			Duration::from_secs(3),
			SimulatedOutcome::Dismissed,
		);
		let (tx, mut rx) = mpsc::unbounded_channel();
		provider.open(&options("o1"), tx).unwrap();

		assert_eq!(rx.recv().await.unwrap().event, ProviderEvent::Ready);
		provider.close("o1");

		// The aborted task drops its sender, so the channel ends without an outcome
		assert!(rx.recv().await.is_none());
	}

	#[tokio::test]
	async fn test_second_open_for_live_session_fails() {
		let provider = SimulatedProvider::new(
			Duration::from_secs(60),
			Duration::from_secs(60),
			SimulatedOutcome::None,
		);
		let (tx, _rx) = mpsc::unbounded_channel();
		provider.open(&options("o1"), tx.clone()).unwrap();
		assert!(matches!(
			provider.open(&options("o1"), tx),
			Err(ProviderError::SessionExists(_))
		));
	}

	#[test]
	fn test_factory_rejects_unknown_outcome() {
		let config: toml::Value = toml::from_str("outcome = \"exploded\"").unwrap();
		assert!(create_provider(&config).is_err());

		let config: toml::Value =
			toml::from_str("outcome = \"dismissed\"\nready_delay_ms = 10").unwrap();
		let provider = create_provider(&config).unwrap();
		assert!(provider.config_schema().validate(&config).is_ok());

		let negative: toml::Value = toml::from_str("outcome_delay_ms = -1").unwrap();
		assert!(provider.config_schema().validate(&negative).is_err());
	}
}

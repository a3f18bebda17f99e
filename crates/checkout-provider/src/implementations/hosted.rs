//! Hosted checkout widget provider.
//!
//! The widget runs in the buyer's browser. Opening a session registers it
//! and hands the checkout options to the presentation layer (through the
//! coordinator snapshot); the widget's callbacks come back through the
//! service API and are relayed into the session here.

use crate::{ProviderError, ProviderInterface, SessionChannel};
use checkout_types::{
	truncate_id, CheckoutOptions, ConfigSchema, ProviderEvent, Schema, SessionEvent,
	ValidationError,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Provider whose UI is rendered by the presentation layer.
#[derive(Default)]
pub struct HostedProvider {
	sessions: Mutex<HashMap<String, SessionChannel>>,
}

impl HostedProvider {
	pub fn new() -> Self {
		Self::default()
	}

	fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionChannel>> {
		self.sessions.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Number of sessions currently open.
	pub fn open_sessions(&self) -> usize {
		self.sessions().len()
	}
}

impl ProviderInterface for HostedProvider {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HostedProviderSchema)
	}

	fn open(
		&self,
		options: &CheckoutOptions,
		events: mpsc::UnboundedSender<SessionEvent>,
	) -> Result<(), ProviderError> {
		let mut sessions = self.sessions();
		if sessions.contains_key(&options.order_id) {
			return Err(ProviderError::SessionExists(options.order_id.clone()));
		}
		sessions.insert(
			options.order_id.clone(),
			SessionChannel::new(options.order_id.clone(), events),
		);
		Ok(())
	}

	fn close(&self, order_id: &str) {
		self.sessions().remove(order_id);
	}

	fn relay(&self, order_id: &str, event: ProviderEvent) -> Result<(), ProviderError> {
		let mut sessions = self.sessions();
		let channel = sessions
			.get_mut(order_id)
			.ok_or_else(|| ProviderError::UnknownSession(order_id.to_string()))?;

		if !channel.emit(event) {
			tracing::debug!(order_id = %truncate_id(order_id), "Relayed event not forwarded");
		}
		Ok(())
	}
}

/// Configuration schema for HostedProvider.
pub struct HostedProviderSchema;

impl ConfigSchema for HostedProviderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// The widget needs no server-side settings
		let schema = Schema::new(vec![], vec![]);
		schema.validate(config)
	}
}

/// Factory function to create the hosted provider from configuration.
///
/// Configuration parameters:
/// - None required for the hosted provider
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn ProviderInterface>, ProviderError> {
	HostedProviderSchema
		.validate(config)
		.map_err(|e| ProviderError::Configuration(format!("Invalid configuration: {}", e)))?;
	Ok(Box::new(HostedProvider::new()))
}

/// Registry for the hosted provider implementation.
pub struct Registry;

impl checkout_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "hosted";
	type Factory = crate::ProviderFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::ProviderRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use checkout_types::{Prefill, SignaturePayload};

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

	#[test]
	fn test_relay_routes_to_session() {
		let provider = HostedProvider::new();
		let (tx, mut rx) = mpsc::unbounded_channel();
		provider.open(&options("o1"), tx.clone()).unwrap();
		provider.open(&options("o2"), tx).unwrap();
		assert_eq!(provider.open_sessions(), 2);

		let payload = SignaturePayload {
			order_id: "o2".to_string(),
			payment_id: "pay_1".to_string(),
			signature: "sig".to_string(),
		};
		provider
			.relay("o2", ProviderEvent::Completed { payload: payload.clone() })
			.unwrap();
		// Duplicates are accepted but not forwarded
		provider
			.relay("o2", ProviderEvent::Completed { payload })
			.unwrap();

		let received = rx.try_recv().unwrap();
		assert_eq!(received.order_id, "o2");
		assert_eq!(received.event.kind(), "completed");
		assert!(rx.try_recv().is_err());
	}

	#[test]
	fn test_closed_session_rejects_events() {
		let provider = HostedProvider::new();
		let (tx, _rx) = mpsc::unbounded_channel();
		provider.open(&options("o1"), tx).unwrap();

		provider.close("o1");
		provider.close("o1");
		assert_eq!(provider.open_sessions(), 0);
		assert!(matches!(
			provider.relay("o1", ProviderEvent::Dismissed),
			Err(ProviderError::UnknownSession(_))
		));
	}

	#[test]
	fn test_factory_requires_table() {
		assert!(create_provider(&toml::Value::String("hosted".into())).is_err());
		assert!(create_provider(&toml::Value::Table(Default::default())).is_ok());
	}
}

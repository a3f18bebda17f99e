//! Builder for constructing checkout engines.
//!
//! Composes a [`CheckoutEngine`] from the configured ledger and provider
//! implementations using factory functions keyed by implementation name.

use crate::engine::{event_bus::EventBus, CheckoutEngine, EngineSettings};
use checkout_config::Config;
use checkout_ledger::{LedgerError, LedgerInterface, LedgerService};
use checkout_provider::{ProviderError, ProviderInterface, ProviderService};
use checkout_types::ProviderBranding;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component.
pub struct CheckoutFactories<LF, PF> {
	pub ledger_factories: HashMap<String, LF>,
	pub provider_factories: HashMap<String, PF>,
}

/// Builder for constructing a CheckoutEngine with pluggable implementations.
pub struct CheckoutBuilder {
	config: Config,
}

impl CheckoutBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine. Every configured implementation with a known
	/// factory is created so its configuration gets validated; the primary
	/// one of each component is used.
	pub fn build<LF, PF>(self, factories: CheckoutFactories<LF, PF>) -> Result<CheckoutEngine, BuilderError>
	where
		LF: Fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError>,
		PF: Fn(&toml::Value) -> Result<Box<dyn ProviderInterface>, ProviderError>,
	{
		let ledger_backend = load_primary(
			"ledger",
			&self.config.ledger.primary,
			&self.config.ledger.implementations,
			&factories.ledger_factories,
		)?;
		let ledger = Arc::new(LedgerService::new(
			ledger_backend,
			self.config.ledger.request_timeout(),
		));

		let provider_backend = load_primary(
			"provider",
			&self.config.provider.primary,
			&self.config.provider.implementations,
			&factories.provider_factories,
		)?;
		let branding = ProviderBranding {
			key_id: self.config.provider.key_id.clone(),
			merchant_name: self.config.provider.merchant_name.clone(),
			description: self.config.provider.description.clone(),
			theme_color: self.config.provider.theme_color.clone(),
		};
		let provider = Arc::new(ProviderService::new(provider_backend, branding));

		Ok(CheckoutEngine::new(
			EngineSettings::from_config(&self.config),
			ledger,
			provider,
			EventBus::new(1000),
		))
	}
}

/// Creates every implementation of one component and returns the primary.
fn load_primary<T, E, F>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	E: Display,
	F: Fn(&toml::Value) -> Result<T, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use checkout_ledger::LedgerFactory;
	use checkout_provider::ProviderFactory;
	use checkout_types::{Buyer, CheckoutPhase, ProviderEvent};
	use std::str::FromStr;

	const CONFIG: &str = r##"
[checkout]
amount = 199
confirmation_url = "https://shop.example.com/orderconfirm"

[ledger]
primary = "memory"
[ledger.implementations.memory]
currency = "INR"
minor_unit_factor = 100

[provider]
primary = "hosted"
key_id = "rzp_test_key"
merchant_name = "Smart Business Bookkeeping Sheet"
[provider.implementations.hosted]
"##;

	fn factories() -> CheckoutFactories<LedgerFactory, ProviderFactory> {
		CheckoutFactories {
			ledger_factories: checkout_ledger::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			provider_factories: checkout_provider::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	#[tokio::test]
	async fn test_builds_working_engine() {
		let config = Config::from_str(CONFIG).unwrap();
		let engine = CheckoutBuilder::new(config).build(factories()).unwrap();
		let handle = engine.handle();
		tokio::spawn(engine.run());

		handle
			.submit(Buyer::new("Asha", "asha@example.com", "9999999999"))
			.await
			.unwrap();
		let snapshot = handle
			.watch()
			.wait_for(|s| s.phase == CheckoutPhase::AwaitingPayment)
			.await
			.unwrap()
			.clone();

		let order = snapshot.order.unwrap();
		assert_eq!(order.amount, 19900);
		let session = snapshot.session.unwrap();
		assert_eq!(session.key, "rzp_test_key");
		assert_eq!(session.theme_color, "#4C5FD5");
		assert_eq!(session.description, "Product Purchase");

		handle.relay(&order.id, ProviderEvent::Dismissed).unwrap();
		handle
			.watch()
			.wait_for(|s| s.phase == CheckoutPhase::Failed)
			.await
			.unwrap();
		handle.shutdown().await.unwrap();
	}

	#[test]
	fn test_invalid_implementation_config() {
		let config = Config::from_str(&CONFIG.replace("minor_unit_factor = 100", "minor_unit_factor = 0"))
			.unwrap();
		let err = CheckoutBuilder::new(config).build(factories()).err().unwrap();
		assert!(matches!(err, BuilderError::Config(msg) if msg.contains("memory")));
	}

	#[test]
	fn test_unknown_implementation() {
		let config = Config::from_str(
			&CONFIG
				.replace("primary = \"memory\"", "primary = \"grpc\"")
				.replace("[ledger.implementations.memory]", "[ledger.implementations.grpc]"),
		)
		.unwrap();
		let err = CheckoutBuilder::new(config).build(factories()).err().unwrap();
		assert!(matches!(err, BuilderError::MissingComponent(_)));
	}
}

//! Payment provider sessions for the checkout coordinator.
//!
//! A session is the hosted payment UI opened for one order. Whatever the
//! concrete provider, its callbacks reach the coordinator as
//! [`SessionEvent`]s on a channel, each event kind at most once per session.
//! Sessions are released through [`SessionHandle`], which closes the session
//! on every exit path including drop.

use checkout_types::{
	truncate_id, CheckoutOptions, ConfigSchema, ImplementationRegistry, Order, ProviderBranding,
	ProviderEvent, SessionEvent,
};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Re-export implementations
pub mod implementations {
	pub mod hosted;
	pub mod simulated;
}

/// Errors that can occur during provider session operations.
#[derive(Debug, Error)]
pub enum ProviderError {
	/// A session is already open for the order.
	#[error("Session already open for order {0}")]
	SessionExists(String),
	/// No open session exists for the order.
	#[error("No open session for order {0}")]
	UnknownSession(String),
	/// The implementation cannot accept relayed callbacks.
	#[error("Operation not supported: {0}")]
	Unsupported(String),
	/// The provider UI could not be opened.
	#[error("Failed to open session: {0}")]
	OpenFailed(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface to a payment provider.
///
/// `open` and `close` are synchronous: opening only registers the session
/// and hands the UI options out, while the buyer interacts with the UI
/// asynchronously and the outcome arrives through the event channel.
pub trait ProviderInterface: Send + Sync {
	/// Returns the configuration schema for this provider implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Opens the provider UI for one order.
	///
	/// Must fail with [`ProviderError::SessionExists`] if a session for the
	/// same order is still open.
	fn open(
		&self,
		options: &CheckoutOptions,
		events: mpsc::UnboundedSender<SessionEvent>,
	) -> Result<(), ProviderError>;

	/// Tears down the session and any timers it owns. Idempotent.
	fn close(&self, order_id: &str);

	/// Delivers a callback reported by the presentation layer's widget.
	fn relay(&self, order_id: &str, _event: ProviderEvent) -> Result<(), ProviderError> {
		Err(ProviderError::Unsupported(format!(
			"provider does not accept relayed events (order {})",
			order_id
		)))
	}
}

/// Type alias for provider factory functions.
pub type ProviderFactory = fn(&toml::Value) -> Result<Box<dyn ProviderInterface>, ProviderError>;

/// Registry trait for provider implementations.
pub trait ProviderRegistry: ImplementationRegistry<Factory = ProviderFactory> {}

/// Get all registered provider implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ProviderFactory)> {
	use implementations::{hosted, simulated};

	vec![
		(hosted::Registry::NAME, hosted::Registry::factory()),
		(simulated::Registry::NAME, simulated::Registry::factory()),
	]
}

/// Event sink of one open session.
///
/// Delivers every event kind at most once; repeats are dropped.
#[derive(Debug)]
pub struct SessionChannel {
	order_id: String,
	sender: mpsc::UnboundedSender<SessionEvent>,
	delivered: HashSet<&'static str>,
}

impl SessionChannel {
	pub fn new(order_id: impl Into<String>, sender: mpsc::UnboundedSender<SessionEvent>) -> Self {
		Self {
			order_id: order_id.into(),
			sender,
			delivered: HashSet::new(),
		}
	}

	/// Sends the event unless its kind was already delivered.
	///
	/// Returns whether the event was forwarded.
	pub fn emit(&mut self, event: ProviderEvent) -> bool {
		if !self.delivered.insert(event.kind()) {
			tracing::warn!(
				order_id = %truncate_id(&self.order_id),
				kind = event.kind(),
				"Dropping duplicate provider event"
			);
			return false;
		}
		self.sender
			.send(SessionEvent {
				order_id: self.order_id.clone(),
				event,
			})
			.is_ok()
	}
}

/// Service opening provider sessions for orders.
pub struct ProviderService {
	implementation: Arc<dyn ProviderInterface>,
	branding: ProviderBranding,
}

impl ProviderService {
	pub fn new(implementation: Box<dyn ProviderInterface>, branding: ProviderBranding) -> Self {
		Self {
			implementation: Arc::from(implementation),
			branding,
		}
	}

	/// Opens the provider UI for an order, pre-filled with the buyer's details.
	pub fn open(
		&self,
		order: &Order,
		events: mpsc::UnboundedSender<SessionEvent>,
	) -> Result<SessionHandle, ProviderError> {
		let options = CheckoutOptions::for_order(order, &self.branding);
		self.implementation.open(&options, events)?;
		tracing::info!(order_id = %truncate_id(&order.id), "Opened provider session");

		Ok(SessionHandle {
			options,
			provider: self.implementation.clone(),
			closed: false,
		})
	}

	/// Forwards a widget callback to the session of `order_id`.
	pub fn relay(&self, order_id: &str, event: ProviderEvent) -> Result<(), ProviderError> {
		tracing::debug!(
			order_id = %truncate_id(order_id),
			kind = event.kind(),
			"Relaying provider event"
		);
		self.implementation.relay(order_id, event)
	}
}

/// Ownership of one open session.
///
/// Closing is idempotent and also happens on drop, so a session cannot
/// outlive the coordinator state that opened it.
pub struct SessionHandle {
	options: CheckoutOptions,
	provider: Arc<dyn ProviderInterface>,
	closed: bool,
}

impl SessionHandle {
	pub fn order_id(&self) -> &str {
		&self.options.order_id
	}

	/// Options the provider UI was opened with.
	pub fn options(&self) -> &CheckoutOptions {
		&self.options
	}

	pub fn is_closed(&self) -> bool {
		self.closed
	}

	pub fn close(&mut self) {
		if self.closed {
			return;
		}
		self.closed = true;
		self.provider.close(&self.options.order_id);
		tracing::debug!(
			order_id = %truncate_id(&self.options.order_id),
			"Closed provider session"
		);
	}
}

impl Drop for SessionHandle {
	fn drop(&mut self) {
		self.close();
	}
}

impl std::fmt::Debug for SessionHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionHandle")
			.field("order_id", &self.options.order_id)
			.field("closed", &self.closed)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use checkout_types::Buyer;
	use implementations::hosted::HostedProvider;

	fn order(id: &str) -> Order {
		Order {
			id: id.to_string(),
			amount: 19900,
			currency: "INR".to_string(),
			buyer: Buyer::new("Asha", "asha@example.com", "9999999999"),
			created_at: 0,
		}
	}

	fn branding() -> ProviderBranding {
		ProviderBranding {
			key_id: "rzp_test_key".to_string(),
			merchant_name: "Shop".to_string(),
			description: "Product Purchase".to_string(),
			theme_color: "#4C5FD5".to_string(),
		}
	}

	#[test]
	fn test_session_channel_delivers_each_kind_once() {
		let (tx, mut rx) = mpsc::unbounded_channel();
		let mut channel = SessionChannel::new("o1", tx);

		assert!(channel.emit(ProviderEvent::Ready));
		assert!(!channel.emit(ProviderEvent::Ready));
		assert!(channel.emit(ProviderEvent::Dismissed));

		assert_eq!(rx.try_recv().unwrap().event, ProviderEvent::Ready);
		assert_eq!(rx.try_recv().unwrap().event, ProviderEvent::Dismissed);
		assert!(rx.try_recv().is_err());
	}

	#[test]
	fn test_handle_closes_on_drop() {
		let service = ProviderService::new(Box::new(HostedProvider::new()), branding());
		let (tx, _rx) = mpsc::unbounded_channel();

		let handle = service.open(&order("o1"), tx.clone()).unwrap();
		assert_eq!(handle.order_id(), "o1");
		assert_eq!(handle.options().prefill.name, "Asha");
		assert!(matches!(
			service.open(&order("o1"), tx.clone()),
			Err(ProviderError::SessionExists(_))
		));

		drop(handle);
		assert!(matches!(
			service.relay("o1", ProviderEvent::Ready),
			Err(ProviderError::UnknownSession(_))
		));
		// The order id is free again once the previous session is gone
		assert!(service.open(&order("o1"), tx).is_ok());
	}

	#[test]
	fn test_close_is_idempotent() {
		let service = ProviderService::new(Box::new(HostedProvider::new()), branding());
		let (tx, _rx) = mpsc::unbounded_channel();

		let mut handle = service.open(&order("o1"), tx).unwrap();
		handle.close();
		handle.close();
		assert!(handle.is_closed());
	}
}

//! Broadcast channel for checkout lifecycle events.
//!
//! The engine publishes every phase change and outcome here; the service
//! layer and tests subscribe. Publishing never blocks and succeeds even
//! without subscribers.

use checkout_types::CheckoutEvent;
use tokio::sync::broadcast;

/// Event bus for publishing checkout events to any number of subscribers.
#[derive(Clone, Debug)]
pub struct EventBus {
	sender: broadcast::Sender<CheckoutEvent>,
}

impl EventBus {
	/// Creates a new event bus holding up to `capacity` undelivered events
	/// per subscriber; slower subscribers miss the oldest ones.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<CheckoutEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event, returning how many subscribers received it.
	pub fn publish(&self, event: CheckoutEvent) -> usize {
		self.sender.send(event).unwrap_or(0)
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(256)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_publish_reaches_subscribers() {
		let bus = EventBus::new(8);
		assert_eq!(
			bus.publish(CheckoutEvent::Notice {
				message: "nobody listens".into()
			}),
			0
		);

		let mut rx = bus.subscribe();
		let event = CheckoutEvent::Notice {
			message: "Failed to create order".into(),
		};
		assert_eq!(bus.publish(event.clone()), 1);
		assert_eq!(rx.recv().await.unwrap(), event);
	}
}

//! Registry trait for named implementations.
//!
//! Every pluggable ledger or provider implementation exposes a `Registry`
//! struct declaring the name it is configured under and its factory.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// Key used in the configuration, e.g. `"http"` for
	/// `[ledger.implementations.http]`.
	const NAME: &'static str;

	/// Factory function type of the component this implementation belongs to.
	type Factory;

	/// Returns the factory that builds this implementation from configuration.
	fn factory() -> Self::Factory;
}

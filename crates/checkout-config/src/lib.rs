//! Configuration module for the checkout coordinator.
//!
//! Configuration is read from a TOML file. `${VAR}` and `${VAR:-default}`
//! references are resolved from the environment before parsing, so secrets
//! such as the provider key id and the ledger URL never need to be committed.
//! After parsing, cross-field rules are validated; implementation-specific
//! tables are validated later by the implementations themselves.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only; the default rendering dumps the whole input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the checkout service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Checkout-wide settings.
	pub checkout: CheckoutConfig,
	/// Ledger client selection and timeouts.
	pub ledger: LedgerConfig,
	/// Payment provider selection and branding.
	pub provider: ProviderConfig,
	/// Status polling policy.
	#[serde(default)]
	pub polling: PollingConfig,
	/// HTTP API for the presentation layer.
	pub api: Option<ApiConfig>,
}

/// Checkout-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutConfig {
	/// Price submitted to the ledger when an order is created, in major units.
	pub amount: u64,
	/// Location the presentation layer navigates to after a successful payment.
	pub confirmation_url: String,
}

/// Configuration for the order ledger client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of ledger implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Upper bound for every ledger request.
	#[serde(default = "default_request_timeout_seconds")]
	pub request_timeout_seconds: u64,
}

impl LedgerConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_seconds)
	}
}

/// Returns the default ledger request timeout in seconds.
fn default_request_timeout_seconds() -> u64 {
	30
}

/// Configuration for the payment provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Public key identifying the merchant to the provider.
	pub key_id: String,
	/// Merchant name shown in the provider UI.
	pub merchant_name: String,
	/// Purchase description shown in the provider UI.
	#[serde(default = "default_description")]
	pub description: String,
	/// Accent color of the provider UI.
	#[serde(default = "default_theme_color")]
	pub theme_color: String,
	/// Map of provider implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

fn default_description() -> String {
	"Product Purchase".to_string()
}

fn default_theme_color() -> String {
	"#4C5FD5".to_string()
}

/// Status polling policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
	/// Delay between two status checks.
	#[serde(default = "default_poll_interval_ms")]
	pub interval_ms: u64,
	/// Status checks before the payment is declared inconclusive.
	#[serde(default = "default_poll_max_attempts")]
	pub max_attempts: u32,
}

impl PollingConfig {
	pub fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}
}

impl Default for PollingConfig {
	fn default() -> Self {
		Self {
			interval_ms: default_poll_interval_ms(),
			max_attempts: default_poll_max_attempts(),
		}
	}
}

/// 5 seconds between checks.
fn default_poll_interval_ms() -> u64 {
	5000
}

/// 60 checks, roughly five minutes at the default interval.
fn default_poll_max_attempts() -> u32 {
	60
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Origins allowed by CORS; empty allows any origin.
	#[serde(default)]
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |cap: &regex::Captures<'_>| {
		let var_name = &cap[1];
		match (std::env::var(var_name), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| var_name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(var_name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot read {}: {}", path.display(), e),
			))
		})?;
		content.parse()
	}

	/// Validates cross-field rules.
	///
	/// - the checkout amount is positive and a confirmation URL is set
	/// - the primary ledger and provider implementations are configured
	/// - the ledger timeout is between 1 second and 5 minutes
	/// - the polling interval and attempt cap are within sane bounds
	fn validate(&self) -> Result<(), ConfigError> {
		if self.checkout.amount == 0 {
			return Err(ConfigError::Validation(
				"Checkout amount must be greater than 0".into(),
			));
		}
		if self.checkout.confirmation_url.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Checkout confirmation_url cannot be empty".into(),
			));
		}

		if self.ledger.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Ledger primary implementation cannot be empty".into(),
			));
		}
		if !self.ledger.implementations.contains_key(&self.ledger.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary ledger '{}' not found in implementations",
				self.ledger.primary
			)));
		}
		if self.ledger.request_timeout_seconds == 0 || self.ledger.request_timeout_seconds > 300 {
			return Err(ConfigError::Validation(
				"Ledger request_timeout_seconds must be between 1 and 300".into(),
			));
		}

		if self.provider.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Provider primary implementation cannot be empty".into(),
			));
		}
		if !self
			.provider
			.implementations
			.contains_key(&self.provider.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary provider '{}' not found in implementations",
				self.provider.primary
			)));
		}
		if self.provider.key_id.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Provider key_id cannot be empty".into(),
			));
		}

		if self.polling.interval_ms < 100 {
			return Err(ConfigError::Validation(
				"Polling interval_ms must be at least 100".into(),
			));
		}
		if self.polling.max_attempts == 0 || self.polling.max_attempts > 10_000 {
			return Err(ConfigError::Validation(
				"Polling max_attempts must be between 1 and 10000".into(),
			));
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const BASE_CONFIG: &str = r#"
[checkout]
amount = 199
confirmation_url = "https://shop.example.com/orderconfirm"

[ledger]
primary = "http"
[ledger.implementations.http]
base_url = "http://localhost:5000"

[provider]
primary = "hosted"
key_id = "rzp_test_key"
merchant_name = "Smart Business Bookkeeping Sheet"
[provider.implementations.hosted]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("CHECKOUT_TEST_HOST", "localhost");
		std::env::set_var("CHECKOUT_TEST_PORT", "5432");

		let input = "host = \"${CHECKOUT_TEST_HOST}:${CHECKOUT_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("CHECKOUT_TEST_HOST");
		std::env::remove_var("CHECKOUT_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${CHECKOUT_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${CHECKOUT_ABSENT_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("CHECKOUT_ABSENT_VAR"));
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = BASE_CONFIG.parse().unwrap();
		assert_eq!(config.polling.interval_ms, 5000);
		assert_eq!(config.polling.max_attempts, 60);
		assert_eq!(config.polling.interval(), Duration::from_secs(5));
		assert_eq!(config.ledger.request_timeout(), Duration::from_secs(30));
		assert_eq!(config.provider.theme_color, "#4C5FD5");
		assert_eq!(config.provider.description, "Product Purchase");
		assert!(config.api.is_none());
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("CHECKOUT_TEST_KEY_ID", "rzp_live_abc");
		let config_str = BASE_CONFIG.replace("rzp_test_key", "${CHECKOUT_TEST_KEY_ID}");

		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.provider.key_id, "rzp_live_abc");

		std::env::remove_var("CHECKOUT_TEST_KEY_ID");
	}

	#[test]
	fn test_unknown_primary_ledger_rejected() {
		let config_str = BASE_CONFIG.replace("primary = \"http\"", "primary = \"grpc\"");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary ledger 'grpc' not found in implementations"));
	}

	#[test]
	fn test_zero_amount_rejected() {
		let config_str = BASE_CONFIG.replace("amount = 199", "amount = 0");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("amount must be greater than 0"));
	}

	#[test]
	fn test_polling_bounds_rejected() {
		let config_str = format!("{}\n[polling]\nmax_attempts = 0\n", BASE_CONFIG);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("max_attempts"));

		let config_str = format!("{}\n[polling]\ninterval_ms = 10\n", BASE_CONFIG);
		assert!(Config::from_str(&config_str).is_err());
	}

	#[tokio::test]
	async fn test_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			"{}\n[polling]\ninterval_ms = 1000\nmax_attempts = 3\n\n[api]\nenabled = true\nport = 8080\n",
			BASE_CONFIG
		)
		.unwrap();

		let config = Config::from_file(file.path()).await.unwrap();
		assert_eq!(config.polling.max_attempts, 3);
		let api = config.api.unwrap();
		assert!(api.enabled);
		assert_eq!(api.port, 8080);
		assert_eq!(api.host, "127.0.0.1");
	}

	#[tokio::test]
	async fn test_from_missing_file() {
		let err = Config::from_file("/nonexistent/checkout.toml")
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::Io(_)));
	}
}

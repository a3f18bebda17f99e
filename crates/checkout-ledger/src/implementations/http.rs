//! HTTP ledger client.
//!
//! Talks JSON to the remote order service:
//!
//! | Call | Request | Success body |
//! |---|---|---|
//! | `POST /api/create-order` | `{amount, name, email, phone}` | `{success, orderId, amount, currency}` |
//! | `POST /api/verify-payment` | signature payload | `{success}` or `{success: false, message}` |
//! | `POST /api/payment-failed` | `{orderId, error: {code, description}}` | `{success}` |
//! | `GET /api/payments?orderId=` | - | `{success, payment: {status}}` |
//!
//! Transport errors and 5xx answers map to [`LedgerError::Unreachable`];
//! `success: false`, other non-2xx answers and undecodable bodies map to
//! [`LedgerError::Rejected`].

use crate::{LedgerError, LedgerInterface};
use async_trait::async_trait;
use checkout_types::{
	Buyer, ConfigSchema, CreatedOrder, Field, FieldType, LedgerStatus, Schema, SignaturePayload,
	ValidationError, Verification,
};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
	amount: u64,
	name: &'a str,
	email: &'a str,
	phone: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
	success: bool,
	#[serde(rename = "orderId")]
	order_id: Option<String>,
	amount: Option<u64>,
	currency: Option<String>,
	message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
	success: bool,
	message: Option<String>,
}

#[derive(Debug, Serialize)]
struct FailureDetail<'a> {
	code: &'a str,
	description: &'a str,
}

#[derive(Debug, Serialize)]
struct PaymentFailedRequest<'a> {
	#[serde(rename = "orderId")]
	order_id: &'a str,
	error: FailureDetail<'a>,
}

#[derive(Debug, Deserialize)]
struct PaymentRecord {
	status: LedgerStatus,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
	success: bool,
	payment: Option<PaymentRecord>,
	message: Option<String>,
}

/// Ledger client speaking JSON over HTTP.
pub struct HttpLedger {
	client: reqwest::Client,
	/// Base URL without a trailing slash.
	base_url: String,
}

impl HttpLedger {
	pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LedgerError> {
		let client = reqwest::Client::builder()
			.pool_idle_timeout(Duration::from_secs(90))
			.pool_max_idle_per_host(10)
			.timeout(timeout)
			.build()
			.map_err(|e| LedgerError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}/api/{}", self.base_url, path)
	}
}

/// Reads the response body, keeping the HTTP status alongside whatever
/// could be decoded.
async fn decode<T: DeserializeOwned>(
	response: reqwest::Response,
) -> Result<(StatusCode, Option<T>), LedgerError> {
	let status = response.status();
	let body = response
		.bytes()
		.await
		.map_err(|e| LedgerError::Unreachable(e.to_string()))?;
	Ok((status, serde_json::from_slice(&body).ok()))
}

fn unsuccessful(status: StatusCode, message: Option<String>) -> LedgerError {
	if status.is_server_error() {
		LedgerError::Unreachable(format!("ledger answered HTTP {}", status.as_u16()))
	} else {
		LedgerError::Rejected(
			message.unwrap_or_else(|| format!("ledger reported failure (HTTP {})", status.as_u16())),
		)
	}
}

fn transport(e: reqwest::Error) -> LedgerError {
	LedgerError::Unreachable(e.to_string())
}

#[async_trait]
impl LedgerInterface for HttpLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpLedgerSchema)
	}

	async fn create_order(&self, amount: u64, buyer: &Buyer) -> Result<CreatedOrder, LedgerError> {
		let request = CreateOrderRequest {
			amount,
			name: &buyer.name,
			email: &buyer.email,
			phone: &buyer.phone,
		};
		let response = self
			.client
			.post(self.url("create-order"))
			.json(&request)
			.send()
			.await
			.map_err(transport)?;

		match decode::<CreateOrderResponse>(response).await? {
			(status, Some(body)) if status.is_success() && body.success => {
				match (body.order_id, body.amount, body.currency) {
					(Some(order_id), Some(amount), Some(currency)) => Ok(CreatedOrder {
						order_id,
						amount,
						currency,
					}),
					_ => Err(LedgerError::Rejected(
						"create-order response is missing order details".to_string(),
					)),
				}
			},
			(status, body) => Err(unsuccessful(status, body.and_then(|b| b.message))),
		}
	}

	async fn verify_payment(
		&self,
		_order_id: &str,
		payload: &SignaturePayload,
	) -> Result<Verification, LedgerError> {
		let response = self
			.client
			.post(self.url("verify-payment"))
			.json(payload)
			.send()
			.await
			.map_err(transport)?;

		match decode::<AckResponse>(response).await? {
			(status, Some(body)) if body.success && status.is_success() => {
				Ok(Verification::accepted())
			},
			(_, Some(body)) if !body.success => Ok(Verification::declined(
				body.message
					.unwrap_or_else(|| "Payment verification failed".to_string()),
			)),
			(status, _) => Err(unsuccessful(status, None)),
		}
	}

	async fn report_failure(
		&self,
		order_id: &str,
		code: &str,
		description: &str,
	) -> Result<(), LedgerError> {
		let request = PaymentFailedRequest {
			order_id,
			error: FailureDetail { code, description },
		};
		let response = self
			.client
			.post(self.url("payment-failed"))
			.json(&request)
			.send()
			.await
			.map_err(transport)?;

		match decode::<AckResponse>(response).await? {
			(status, Some(body)) if status.is_success() && body.success => Ok(()),
			(status, body) => Err(unsuccessful(status, body.and_then(|b| b.message))),
		}
	}

	async fn fetch_status(&self, order_id: &str) -> Result<LedgerStatus, LedgerError> {
		let response = self
			.client
			.get(self.url("payments"))
			.query(&[("orderId", order_id)])
			.send()
			.await
			.map_err(transport)?;

		match decode::<StatusResponse>(response).await? {
			(status, Some(body)) if status.is_success() && body.success => body
				.payment
				.map(|payment| payment.status)
				.ok_or_else(|| LedgerError::Rejected("status response has no payment".to_string())),
			(status, body) => Err(unsuccessful(status, body.and_then(|b| b.message))),
		}
	}
}

/// Configuration schema for HttpLedger.
pub struct HttpLedgerSchema;

impl ConfigSchema for HttpLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("base_url", FieldType::Url)],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create an HTTP ledger client from configuration.
///
/// Configuration parameters:
/// - `base_url`: root of the ledger service, e.g. `https://ledger.example.com`
/// - `timeout_seconds`: transport timeout (default: 30)
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	HttpLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(format!("Invalid configuration: {}", e)))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| LedgerError::Configuration("base_url is required".to_string()))?;
	let timeout_seconds = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(HttpLedger::new(
		base_url,
		Duration::from_secs(timeout_seconds),
	)?))
}

/// Registry for the HTTP ledger implementation.
pub struct Registry;

impl checkout_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = crate::LedgerFactory;

	fn factory() -> Self::Factory {
		create_ledger
	}
}

impl crate::LedgerRegistry for Registry {}

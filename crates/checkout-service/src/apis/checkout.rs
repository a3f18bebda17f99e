//! Checkout API implementation.
//!
//! Translates presentation-layer requests into coordinator commands and maps
//! coordinator errors onto API errors.

use checkout_core::{CheckoutHandle, EngineError, FlowError};
use checkout_provider::ProviderError;
use checkout_types::{
	truncate_id, APIError, Buyer, FlowSnapshot, RelayEventRequest, SubmitCheckoutRequest,
};
use tracing::{info, warn};

/// Starts a checkout for the submitted billing details.
pub async fn submit(
	checkout: &CheckoutHandle,
	request: SubmitCheckoutRequest,
) -> Result<FlowSnapshot, APIError> {
	let buyer = Buyer::new(request.name, request.email, request.phone);
	let snapshot = checkout.submit(buyer).await.map_err(engine_error)?;
	info!(phase = %snapshot.phase, "Checkout submitted");
	Ok(snapshot)
}

pub async fn reset(checkout: &CheckoutHandle) -> Result<FlowSnapshot, APIError> {
	checkout.reset().await.map_err(engine_error)
}

/// Relays a provider widget callback to the open session.
pub fn relay(checkout: &CheckoutHandle, request: RelayEventRequest) -> Result<(), APIError> {
	let kind = request.event.kind();
	checkout
		.relay(&request.order_id, request.event)
		.map_err(|e| {
			warn!(
				order_id = %truncate_id(&request.order_id),
				kind,
				error = %e,
				"Provider event rejected"
			);
			provider_error(e)
		})
}

fn engine_error(err: EngineError) -> APIError {
	match err {
		EngineError::Flow(FlowError::InvalidBuyer { ref missing }) => APIError::BadRequest {
			error_type: "INVALID_BUYER".to_string(),
			message: err.to_string(),
			details: Some(serde_json::json!({ "missing": missing })),
		},
		EngineError::Flow(FlowError::OrderInProgress(_)) => APIError::Conflict {
			error_type: "ORDER_IN_PROGRESS".to_string(),
			message: err.to_string(),
		},
		EngineError::Flow(FlowError::ResetNotAllowed(_)) => APIError::Conflict {
			error_type: "RESET_NOT_ALLOWED".to_string(),
			message: err.to_string(),
		},
		EngineError::Stopped => APIError::ServiceUnavailable {
			error_type: "COORDINATOR_STOPPED".to_string(),
			message: err.to_string(),
			retry_after: None,
		},
		EngineError::Flow(FlowError::InvalidTransition { .. }) => {
			APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message: err.to_string(),
			}
		},
	}
}

fn provider_error(err: ProviderError) -> APIError {
	let error_type = match err {
		ProviderError::UnknownSession(_) => "UNKNOWN_SESSION",
		ProviderError::Unsupported(_) => "RELAY_UNSUPPORTED",
		ProviderError::SessionExists(_) => "SESSION_EXISTS",
		ProviderError::OpenFailed(_) | ProviderError::Configuration(_) => {
			return APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message: err.to_string(),
			};
		},
	};
	APIError::UnprocessableEntity {
		error_type: error_type.to_string(),
		message: err.to_string(),
		details: None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use checkout_types::CheckoutPhase;

	#[test]
	fn test_engine_error_statuses() {
		let invalid = engine_error(EngineError::Flow(FlowError::InvalidBuyer {
			missing: vec!["name", "phone"],
		}));
		assert_eq!(invalid.status_code(), 400);
		let body = invalid.to_error_response();
		assert!(body.message.starts_with("Please fill all the fields"));
		assert_eq!(body.details.unwrap()["missing"][1], "phone");

		let busy = engine_error(EngineError::Flow(FlowError::OrderInProgress(
			CheckoutPhase::Verifying,
		)));
		assert_eq!(busy.status_code(), 409);
		assert_eq!(engine_error(EngineError::Stopped).status_code(), 503);
	}

	#[test]
	fn test_provider_error_statuses() {
		let unknown = provider_error(ProviderError::UnknownSession("o1".into()));
		assert_eq!(unknown.status_code(), 422);
		assert_eq!(unknown.to_error_response().error, "UNKNOWN_SESSION");
		assert_eq!(
			provider_error(ProviderError::Unsupported("relay".into())).status_code(),
			422
		);
	}
}

//! HTTP server for the checkout API.
//!
//! The presentation layer submits billing details, reads the coordinator
//! snapshot and relays provider widget callbacks through these routes.

use axum::{
	extract::State,
	http::{header, HeaderValue, Method, StatusCode},
	response::Json,
	routing::{get, post},
	Router,
};
use checkout_config::ApiConfig;
use checkout_core::CheckoutHandle;
use checkout_types::{
	APIError, FlowSnapshot, HealthResponse, RelayEventRequest, SubmitCheckoutRequest,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Handle of the running coordinator.
	pub checkout: CheckoutHandle,
}

/// Builds the API router under the `/api` base path.
pub fn router(checkout: CheckoutHandle, allowed_origins: &[String]) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/checkout", post(handle_submit).get(handle_snapshot))
				.route("/checkout/reset", post(handle_reset))
				.route("/provider/events", post(handle_provider_event))
				.route("/health", get(handle_health)),
		)
		.layer(ServiceBuilder::new().layer(cors_layer(allowed_origins)))
		.with_state(AppState { checkout })
}

/// Starts the HTTP server and serves until it fails.
pub async fn start_server(
	api_config: ApiConfig,
	checkout: CheckoutHandle,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(checkout, &api_config.allowed_origins);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Checkout API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Any origin when none are configured, otherwise exactly the listed ones.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
	if allowed_origins.is_empty() {
		return CorsLayer::permissive();
	}

	let origins: Vec<HeaderValue> = allowed_origins
		.iter()
		.filter_map(|origin| match origin.parse() {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
				None
			},
		})
		.collect();

	CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods([Method::GET, Method::POST])
		.allow_headers([header::CONTENT_TYPE])
}

/// Handles POST /api/checkout requests.
async fn handle_submit(
	State(state): State<AppState>,
	Json(request): Json<SubmitCheckoutRequest>,
) -> Result<(StatusCode, Json<FlowSnapshot>), APIError> {
	match crate::apis::checkout::submit(&state.checkout, request).await {
		Ok(snapshot) => Ok((StatusCode::ACCEPTED, Json(snapshot))),
		Err(e) => {
			tracing::warn!("Checkout submission failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/checkout requests.
async fn handle_snapshot(State(state): State<AppState>) -> Json<FlowSnapshot> {
	Json(state.checkout.snapshot())
}

/// Handles POST /api/checkout/reset requests.
async fn handle_reset(State(state): State<AppState>) -> Result<Json<FlowSnapshot>, APIError> {
	crate::apis::checkout::reset(&state.checkout).await.map(Json)
}

/// Handles POST /api/provider/events requests.
async fn handle_provider_event(
	State(state): State<AppState>,
	Json(request): Json<RelayEventRequest>,
) -> Result<StatusCode, APIError> {
	crate::apis::checkout::relay(&state.checkout, request)?;
	Ok(StatusCode::NO_CONTENT)
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, APIError> {
	if !state.checkout.is_running() {
		return Err(APIError::ServiceUnavailable {
			error_type: "COORDINATOR_STOPPED".to_string(),
			message: "Checkout engine is not running".to_string(),
			retry_after: Some(5),
		});
	}
	Ok(Json(HealthResponse {
		status: "ok".to_string(),
	}))
}

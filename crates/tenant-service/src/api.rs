//! HTTP API exposing orchestrator state to operational tooling.

use crate::service::Manager;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use serde_json::json;
use std::sync::Arc;
use tenant_core::{ControlPlaneClient, InMemoryControlPlane, UnavailableReason};
use tenant_lifecycle::LifecycleComponent;
use tenant_types::TenantToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument};

/// Status API server
pub struct ApiServer {
	port: u16,
	state: AppState,
}

impl ApiServer {
	pub fn new(
		port: u16,
		service_name: String,
		manager: Manager,
		control_plane: Arc<InMemoryControlPlane>,
	) -> Self {
		Self {
			port,
			state: AppState {
				service_name: Arc::from(service_name),
				manager,
				control_plane,
			},
		}
	}

	pub fn router(&self) -> Router {
		router(self.state.clone())
	}

	#[instrument(skip(self))]
	pub async fn run(self) -> anyhow::Result<()> {
		let app = self.router();
		let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", self.port)).await?;

		info!("API server listening on port {}", self.port);

		axum::serve(listener, app).await?;

		Ok(())
	}
}

#[derive(Clone)]
struct AppState {
	service_name: Arc<str>,
	manager: Manager,
	control_plane: Arc<InMemoryControlPlane>,
}

fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health_check))
		.route("/tenants", get(list_tenants))
		.route("/tenants/{token}", get(get_tenant))
		.route("/tenants/{token}/restart", post(restart_tenant))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

/// Returns 200 while the service runs, with engine counts
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
	let snapshot = state.manager.snapshot();
	Json(json!({
		"status": "running",
		"service": &*state.service_name,
		"engines": {
			"initializing": snapshot.initializing.len(),
			"ready": snapshot.ready.len(),
			"failed": snapshot.failed.len(),
			"stopping": snapshot.stopping.len(),
		},
	}))
}

async fn list_tenants(State(state): State<AppState>) -> Response {
	Json(state.manager.snapshot()).into_response()
}

/// Availability of one tenant's engine: 200 when started, 503 with the
/// reason when it exists but cannot serve, 404 when unknown.
async fn get_tenant(State(state): State<AppState>, Path(token): Path<String>) -> Response {
	let token = match TenantToken::new(token) {
		Ok(token) => token,
		Err(e) => return bad_request(e.to_string()),
	};

	let resource = state
		.control_plane
		.get_tenant_engine(&token)
		.await
		.ok()
		.flatten();

	match state.manager.assure_available(&token) {
		Ok(engine) => (
			StatusCode::OK,
			Json(json!({
				"token": token,
				"available": true,
				"status": engine.lifecycle_status(),
				"resource": resource,
			})),
		)
			.into_response(),
		Err(unavailable) => {
			let code = match unavailable.reason {
				UnavailableReason::NotFound if resource.is_none() => StatusCode::NOT_FOUND,
				_ => StatusCode::SERVICE_UNAVAILABLE,
			};
			let error = state
				.manager
				.lookup(&token)
				.and_then(|engine| engine.lifecycle_error())
				.map(|e| e.to_string());
			(
				code,
				Json(json!({
					"token": token,
					"available": false,
					"reason": unavailable.reason,
					"status": unavailable.status,
					"error": error,
					"message": unavailable.to_string(),
				})),
			)
				.into_response()
		}
	}
}

async fn restart_tenant(State(state): State<AppState>, Path(token): Path<String>) -> Response {
	let token = match TenantToken::new(token) {
		Ok(token) => token,
		Err(e) => return bad_request(e.to_string()),
	};

	match state.manager.restart(&token).await {
		Ok(()) => (
			StatusCode::ACCEPTED,
			Json(json!({ "token": token, "restart": "scheduled" })),
		)
			.into_response(),
		Err(e) => (
			StatusCode::NOT_FOUND,
			Json(json!({ "token": token, "error": e.to_string() })),
		)
			.into_response(),
	}
}

fn bad_request(message: String) -> Response {
	(StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::factory::ConfiguredEngineFactory;
	use axum::body::Body;
	use axum::http::Request;
	use std::time::Duration;
	use tenant_config::OrchestratorConfig;
	use tenant_core::TenantEngineManager;
	use tenant_types::TenantEngineResource;
	use tower::ServiceExt;

	async fn state() -> AppState {
		let control_plane = Arc::new(InMemoryControlPlane::new("event-sources"));
		let config = OrchestratorConfig {
			bootstrap_existing: false,
			requeue_delay_ms: 10,
			..OrchestratorConfig::default()
		};
		let manager = TenantEngineManager::new(config, ConfiguredEngineFactory, control_plane.clone());
		manager.start().await.unwrap();
		AppState {
			service_name: Arc::from("event-sources"),
			manager,
			control_plane,
		}
	}

	async fn call(state: &AppState, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
		let response = router(state.clone())
			.oneshot(
				Request::builder()
					.method(method)
					.uri(uri)
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		let status = response.status();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		(status, serde_json::from_slice(&bytes).unwrap())
	}

	fn register(state: &AppState, token: &str, configuration: serde_json::Value) {
		let token = TenantToken::new(token).unwrap();
		let resource =
			TenantEngineResource::new(format!("{}-event-sources", token), "iot", &token, configuration);
		let stored = state.control_plane.upsert(resource).unwrap();
		state.manager.enqueue_initialization(stored.resource().clone());
	}

	async fn wait_for_engines(state: &AppState, tokens: &[&str]) {
		for _ in 0..300 {
			if tokens
				.iter()
				.all(|t| state.manager.lookup(&TenantToken::new(*t).unwrap()).is_some())
			{
				return;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("engines {:?} never settled", tokens);
	}

	#[tokio::test]
	async fn test_unknown_tenant_is_not_found() {
		let state = state().await;
		let (status, body) = call(&state, "GET", "/tenants/ghost").await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["reason"], "not_found");

		let (status, _) = call(&state, "POST", "/tenants/ghost/restart").await;
		assert_eq!(status, StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn test_started_and_failed_tenants() {
		let state = state().await;
		register(&state, "acme", json!({ "components": [{ "name": "store" }] }));
		register(
			&state,
			"globex",
			json!({ "components": [{ "name": "inbound", "fail_on": "start" }] }),
		);
		wait_for_engines(&state, &["acme", "globex"]).await;

		let (status, body) = call(&state, "GET", "/tenants/acme").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["available"], true);
		assert_eq!(body["status"], "Started");

		let (status, body) = call(&state, "GET", "/tenants/globex").await;
		assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(body["reason"], "start_failed");
		assert!(body["error"].as_str().unwrap().contains("configured to fail on Start"));

		let (status, body) = call(&state, "GET", "/tenants").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["ready"], json!(["acme"]));
		assert_eq!(body["failed"], json!(["globex"]));

		let (status, body) = call(&state, "GET", "/health").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["engines"]["ready"], 1);
	}

	#[tokio::test]
	async fn test_restart_is_accepted_for_tracked_tenant() {
		let state = state().await;
		register(&state, "acme", json!({}));
		wait_for_engines(&state, &["acme"]).await;

		let (status, body) = call(&state, "POST", "/tenants/acme/restart").await;
		assert_eq!(status, StatusCode::ACCEPTED);
		assert_eq!(body["restart"], "scheduled");
	}
}

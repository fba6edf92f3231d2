//! Configuration types for the tenant engine service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete service configuration.
///
/// Every section has defaults so a minimal file only needs `[service]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
	/// Identity, logging and ports of this service instance
	#[serde(default)]
	pub service: ServiceSettings,
	/// Tenant engine orchestrator tuning
	#[serde(default)]
	pub orchestrator: OrchestratorConfig,
	/// Tenant engines registered with the in-process control plane at startup
	#[serde(default)]
	pub tenants: Vec<TenantSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
	/// Microservice function name; tenant engines are labelled with it
	pub name: String,
	/// Namespace tenant engine resources live in
	#[serde(default = "default_namespace")]
	pub namespace: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Port of the status API
	#[serde(default = "default_http_port")]
	pub http_port: u16,
}

impl Default for ServiceSettings {
	fn default() -> Self {
		Self {
			name: "tenant-engine".to_string(),
			namespace: default_namespace(),
			log_level: default_log_level(),
			http_port: default_http_port(),
		}
	}
}

/// Worker pool and queue behaviour of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
	/// Upper bound on tenant engine start/stop operations running at once
	#[serde(default = "default_max_concurrent_operations")]
	pub max_concurrent_operations: usize,
	/// Delay before retrying a request that collided with an in-flight
	/// operation on the same tenant
	#[serde(default = "default_requeue_delay_ms")]
	pub requeue_delay_ms: u64,
	#[serde(default = "default_shutdown_timeout_secs")]
	pub shutdown_timeout_secs: u64,
	/// Enqueue every engine already known to the control plane on start
	#[serde(default = "default_bootstrap_existing")]
	pub bootstrap_existing: bool,
}

impl OrchestratorConfig {
	pub fn requeue_delay(&self) -> Duration {
		Duration::from_millis(self.requeue_delay_ms)
	}

	pub fn shutdown_timeout(&self) -> Duration {
		Duration::from_secs(self.shutdown_timeout_secs)
	}
}

impl Default for OrchestratorConfig {
	fn default() -> Self {
		Self {
			max_concurrent_operations: default_max_concurrent_operations(),
			requeue_delay_ms: default_requeue_delay_ms(),
			shutdown_timeout_secs: default_shutdown_timeout_secs(),
			bootstrap_existing: default_bootstrap_existing(),
		}
	}
}

/// A tenant engine declared in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSeed {
	pub token: String,
	/// Resource name; defaults to `<token>-<service name>`
	#[serde(default)]
	pub name: Option<String>,
	#[serde(flatten)]
	pub engine: EngineConfiguration,
}

/// Runtime configuration of one tenant engine, carried in the resource spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfiguration {
	/// Nested components in start order
	#[serde(default)]
	pub components: Vec<ComponentConfig>,
}

impl EngineConfiguration {
	/// Reads the engine configuration out of a resource spec.
	pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
		if value.is_null() {
			return Ok(Self::default());
		}
		serde_json::from_value(value.clone())
	}

	pub fn to_value(&self) -> serde_json::Value {
		serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
	}
}

/// One nested component of a tenant engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
	pub name: String,
	/// A required component aborts the engine's initialize/start on failure
	#[serde(default = "default_required")]
	pub required: bool,
	#[serde(default)]
	pub initialize_delay_ms: u64,
	#[serde(default)]
	pub start_delay_ms: u64,
	/// Operation that reports a failure, for exercising error handling
	#[serde(default)]
	pub fail_on: Option<FailurePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePoint {
	Initialize,
	Start,
	Stop,
	Terminate,
}

fn default_namespace() -> String {
	"default".to_string()
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_http_port() -> u16 {
	8080
}

fn default_max_concurrent_operations() -> usize {
	5
}

fn default_requeue_delay_ms() -> u64 {
	250
}

fn default_shutdown_timeout_secs() -> u64 {
	30
}

fn default_bootstrap_existing() -> bool {
	true
}

fn default_required() -> bool {
	true
}

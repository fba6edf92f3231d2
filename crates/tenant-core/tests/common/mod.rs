//! Test doubles shared by the orchestrator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenant_config::OrchestratorConfig;
use tenant_core::{
	ComposedTenantEngine, CoreError, InMemoryControlPlane, TenantEngineFactory, TenantEngineManager,
};
use tenant_lifecycle::{LifecycleError, LifecycleHooks, LifecycleProgressMonitor, ManagedComponent};
use tenant_types::{TenantEngineResource, TenantToken};

/// Behaviour of a scripted engine, read from the resource configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Script {
	pub init_delay_ms: u64,
	pub fail_initialize: bool,
	pub fail_start: bool,
	pub stop_delay_ms: u64,
	pub fail_stop: bool,
}

/// Observations shared by every engine a factory creates.
#[derive(Default)]
pub struct Stats {
	pub created: AtomicUsize,
	pub active: AtomicUsize,
	pub max_active: AtomicUsize,
	pub log: Mutex<Vec<String>>,
}

impl Stats {
	pub fn created(&self) -> usize {
		self.created.load(Ordering::SeqCst)
	}

	pub fn max_active(&self) -> usize {
		self.max_active.load(Ordering::SeqCst)
	}

	pub fn log(&self) -> Vec<String> {
		self.log.lock().unwrap().clone()
	}

	pub fn position(&self, entry: &str) -> Option<usize> {
		self.log().iter().position(|e| e == entry)
	}

	fn record(&self, entry: String) {
		self.log.lock().unwrap().push(entry);
	}
}

struct Scripted {
	label: String,
	script: Script,
	stats: Arc<Stats>,
}

#[async_trait]
impl LifecycleHooks for Scripted {
	async fn initialize(&self, _monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
		self.stats.max_active.fetch_max(active, Ordering::SeqCst);
		self.stats.record(format!("initialize:{}", self.label));

		if self.script.init_delay_ms > 0 {
			tokio::time::sleep(Duration::from_millis(self.script.init_delay_ms)).await;
		}
		self.stats.active.fetch_sub(1, Ordering::SeqCst);

		if self.script.fail_initialize {
			return Err(LifecycleError::failed("simulated initialize failure"));
		}
		Ok(())
	}

	async fn start(&self, _monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		self.stats.record(format!("start:{}", self.label));
		if self.script.fail_start {
			return Err(LifecycleError::failed("simulated start failure"));
		}
		Ok(())
	}

	async fn stop(&self, _monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		self.stats.record(format!("stop:{}", self.label));
		if self.script.stop_delay_ms > 0 {
			tokio::time::sleep(Duration::from_millis(self.script.stop_delay_ms)).await;
		}
		if self.script.fail_stop {
			return Err(LifecycleError::failed("simulated stop failure"));
		}
		Ok(())
	}

	async fn terminate(&self, _monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		self.stats.record(format!("terminate:{}", self.label));
		Ok(())
	}
}

/// Builds single-component engines whose behaviour follows [`Script`].
/// Engines are labelled `<token>#<n>` with `n` counting creations.
pub struct ScriptedFactory {
	pub stats: Arc<Stats>,
}

#[async_trait]
impl TenantEngineFactory for ScriptedFactory {
	type Engine = ComposedTenantEngine;

	async fn create_tenant_engine(
		&self,
		resource: &TenantEngineResource,
	) -> Result<Arc<ComposedTenantEngine>, CoreError> {
		let script: Script =
			serde_json::from_value(resource.spec.configuration.clone()).unwrap_or_default();
		let token = resource.tenant_token()?;
		let n = self.stats.created.fetch_add(1, Ordering::SeqCst) + 1;
		let hooks = Scripted {
			label: format!("{}#{}", token, n),
			script,
			stats: self.stats.clone(),
		};

		let engine = ComposedTenantEngine::builder(resource.clone())?
			.with_component(ManagedComponent::new("scripted", hooks), true)
			.build();
		Ok(Arc::new(engine))
	}
}

pub struct Harness {
	pub control_plane: Arc<InMemoryControlPlane>,
	pub manager: TenantEngineManager<ScriptedFactory>,
	pub stats: Arc<Stats>,
}

impl Harness {
	pub async fn start(pool: usize) -> Self {
		let control_plane = Arc::new(InMemoryControlPlane::new("scripted-service"));
		let stats = Arc::new(Stats::default());
		let config = OrchestratorConfig {
			max_concurrent_operations: pool,
			requeue_delay_ms: 20,
			shutdown_timeout_secs: 5,
			bootstrap_existing: false,
		};
		let manager = TenantEngineManager::new(
			config,
			ScriptedFactory {
				stats: stats.clone(),
			},
			control_plane.clone(),
		);
		manager.start().await.unwrap();

		Self {
			control_plane,
			manager,
			stats,
		}
	}

	/// Stores a resource in the control plane and returns the stored copy.
	pub fn publish(&self, token: &str, script: serde_json::Value) -> TenantEngineResource {
		let resource =
			TenantEngineResource::new(format!("{}-engine", token), "test", &token_of(token), script);
		self.control_plane
			.upsert(resource)
			.unwrap()
			.resource()
			.clone()
	}

	pub fn is_ready(&self, token: &str) -> bool {
		self.manager.snapshot().ready.contains(&token_of(token))
	}

	pub fn is_failed(&self, token: &str) -> bool {
		self.manager.snapshot().failed.contains(&token_of(token))
	}
}

pub fn token_of(token: &str) -> TenantToken {
	TenantToken::new(token).unwrap()
}

/// Polls `condition` for up to five seconds.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
	for _ in 0..500 {
		if condition() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	condition()
}

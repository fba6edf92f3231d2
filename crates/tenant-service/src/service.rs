//! Wiring of configuration, control plane, orchestrator and HTTP API.

use crate::api::ApiServer;
use crate::factory::ConfiguredEngineFactory;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tenant_config::{ServiceConfig, TenantSeed};
use tenant_core::{InMemoryControlPlane, ResourceWatcher, TenantEngineManager};
use tenant_types::{TenantEngineResource, TenantToken};
use tracing::{error, info, instrument, warn};

pub type Manager = TenantEngineManager<ConfiguredEngineFactory>;

/// A running tenant engine service.
pub struct TenantService {
	config: ServiceConfig,
	control_plane: Arc<InMemoryControlPlane>,
	manager: Manager,
	watcher: Option<ResourceWatcher>,
}

impl TenantService {
	/// Seeds the control plane from the configured tenants and starts the
	/// orchestrator.
	///
	/// Seeded tenants are started through bootstrapping; later changes to the
	/// control plane reach the orchestrator through the resource watcher.
	#[instrument(skip(config), fields(service = %config.service.name))]
	pub async fn start(config: ServiceConfig) -> Result<Self> {
		let control_plane = Arc::new(InMemoryControlPlane::new(config.service.name.clone()));
		for seed in &config.tenants {
			let resource = seed_resource(&config, seed)?;
			control_plane
				.upsert(resource)
				.with_context(|| format!("Failed to register tenant '{}'", seed.token))?;
		}
		info!("Registered {} tenant engine resources", control_plane.len());

		let manager = TenantEngineManager::new(
			config.orchestrator.clone(),
			ConfiguredEngineFactory,
			control_plane.clone(),
		);
		manager
			.start()
			.await
			.context("Failed to start tenant engine manager")?;

		let watcher = ResourceWatcher::spawn_with_resync(
			control_plane.subscribe(),
			Arc::new(manager.clone()),
			control_plane.clone(),
		);

		Ok(Self {
			config,
			control_plane,
			manager,
			watcher: Some(watcher),
		})
	}

	pub fn manager(&self) -> &Manager {
		&self.manager
	}

	pub fn control_plane(&self) -> &Arc<InMemoryControlPlane> {
		&self.control_plane
	}

	/// Serves the HTTP API until `signal` resolves, then shuts down.
	pub async fn run(mut self, signal: impl Future<Output = ()>) -> Result<()> {
		let server = ApiServer::new(
			self.config.service.http_port,
			self.config.service.name.clone(),
			self.manager.clone(),
			self.control_plane.clone(),
		);
		let http_handle = tokio::spawn(async move {
			if let Err(e) = server.run().await {
				error!("API server failed: {}", e);
			}
		});

		info!("Tenant engine service started successfully");
		signal.await;
		info!("Shutdown signal received, stopping tenant engines...");

		let result = self.shutdown().await;
		http_handle.abort();
		result
	}

	/// Stops the watcher and every engine, giving up after the configured
	/// shutdown timeout.
	pub async fn shutdown(&mut self) -> Result<()> {
		if let Some(watcher) = self.watcher.take() {
			watcher.stop();
		}

		let timeout = self.config.orchestrator.shutdown_timeout();
		match tokio::time::timeout(timeout, self.manager.shutdown()).await {
			Ok(result) => result.context("Failed to shutdown tenant engine manager")?,
			Err(_) => {
				let snapshot = self.manager.snapshot();
				warn!(
					"Shutdown did not complete within {:?}; {} initializing, {} stopping",
					timeout,
					snapshot.initializing.len(),
					snapshot.stopping.len()
				);
			}
		}
		info!("Tenant engine service stopped");
		Ok(())
	}
}

fn seed_resource(config: &ServiceConfig, seed: &TenantSeed) -> Result<TenantEngineResource> {
	let token = TenantToken::new(seed.token.clone())
		.with_context(|| format!("Invalid tenant token '{}'", seed.token))?;
	let name = seed
		.name
		.clone()
		.unwrap_or_else(|| format!("{}-{}", seed.token, config.service.name));
	Ok(TenantEngineResource::new(
		name,
		config.service.namespace.clone(),
		&token,
		seed.engine.to_value(),
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;
	use tenant_config::from_toml;
	use tenant_lifecycle::LifecycleComponent;
	use tenant_types::LifecycleStatus;

	const CONFIG: &str = r#"
[service]
name = "event-sources"
namespace = "iot"
http_port = 0

[orchestrator]
max_concurrent_operations = 2
requeue_delay_ms = 10
shutdown_timeout_secs = 5

[[tenants]]
token = "acme"
components = [{ name = "store" }, { name = "inbound", start_delay_ms = 20 }]

[[tenants]]
token = "globex"
name = "globex-sources"
components = [{ name = "inbound", fail_on = "start" }]
"#;

	async fn wait_for(condition: impl Fn() -> bool) -> bool {
		for _ in 0..300 {
			if condition() {
				return true;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		false
	}

	#[tokio::test]
	async fn test_seeded_tenants_are_bootstrapped() {
		let config = from_toml(CONFIG).unwrap();
		let mut service = TenantService::start(config).await.unwrap();
		let acme = TenantToken::new("acme").unwrap();
		let globex = TenantToken::new("globex").unwrap();

		assert!(wait_for(|| service.manager().assure_available(&acme).is_ok()).await);
		assert!(wait_for(|| service.manager().lookup(&globex).is_some()).await);
		assert_eq!(
			service.manager().lookup(&globex).unwrap().lifecycle_status(),
			LifecycleStatus::LifecycleError
		);

		service.shutdown().await.unwrap();
		assert!(service.manager().lookup(&acme).is_none());
		assert!(service.manager().lookup(&globex).is_none());
	}

	#[tokio::test]
	async fn test_seed_resource_defaults_name_from_service() {
		let config = from_toml(CONFIG).unwrap();
		let acme = seed_resource(&config, &config.tenants[0]).unwrap();
		assert_eq!(acme.name(), "acme-event-sources");
		assert_eq!(acme.metadata.namespace, "iot");
		let globex = seed_resource(&config, &config.tenants[1]).unwrap();
		assert_eq!(globex.name(), "globex-sources");
	}
}

//! Builds tenant engines from the component list carried in each resource.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tenant_config::{ComponentConfig, EngineConfiguration, FailurePoint};
use tenant_core::{ComposedTenantEngine, CoreError, TenantEngineFactory};
use tenant_lifecycle::{LifecycleError, LifecycleHooks, LifecycleProgressMonitor, ManagedComponent};
use tenant_types::TenantEngineResource;
use tracing::debug;

/// Component whose work is simulated from its configuration: optional
/// delays on initialize and start, and an optional injected failure.
pub struct SimulatedComponent {
	config: ComponentConfig,
}

impl SimulatedComponent {
	pub fn new(config: ComponentConfig) -> Self {
		Self { config }
	}

	fn check(&self, point: FailurePoint) -> Result<(), LifecycleError> {
		if self.config.fail_on == Some(point) {
			return Err(LifecycleError::failed(format!(
				"component '{}' configured to fail on {:?}",
				self.config.name, point
			)));
		}
		Ok(())
	}
}

async fn pause(millis: u64) {
	if millis > 0 {
		tokio::time::sleep(Duration::from_millis(millis)).await;
	}
}

#[async_trait]
impl LifecycleHooks for SimulatedComponent {
	async fn initialize(&self, monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		debug!("Initializing '{}' at {}", self.config.name, monitor.path());
		pause(self.config.initialize_delay_ms).await;
		self.check(FailurePoint::Initialize)
	}

	async fn start(&self, _monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		pause(self.config.start_delay_ms).await;
		self.check(FailurePoint::Start)
	}

	async fn stop(&self, _monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		self.check(FailurePoint::Stop)
	}

	async fn terminate(&self, _monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		self.check(FailurePoint::Terminate)
	}
}

/// Creates a [`ComposedTenantEngine`] per resource, one nested
/// [`SimulatedComponent`] per configured component.
#[derive(Debug, Default, Clone)]
pub struct ConfiguredEngineFactory;

#[async_trait]
impl TenantEngineFactory for ConfiguredEngineFactory {
	type Engine = ComposedTenantEngine;

	async fn create_tenant_engine(
		&self,
		resource: &TenantEngineResource,
	) -> Result<Arc<ComposedTenantEngine>, CoreError> {
		let token = resource.tenant_token()?;
		let configuration = EngineConfiguration::from_value(&resource.spec.configuration)
			.map_err(|e| CoreError::EngineConstruction {
				token: token.to_string(),
				message: format!("invalid engine configuration: {}", e),
			})?;

		let mut builder = ComposedTenantEngine::builder(resource.clone())?;
		for component in configuration.components {
			let name = component.name.clone();
			let required = component.required;
			builder = builder.with_component(
				ManagedComponent::new(name, SimulatedComponent::new(component)),
				required,
			);
		}
		Ok(Arc::new(builder.build()))
	}
}

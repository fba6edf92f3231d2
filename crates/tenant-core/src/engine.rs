//! Tenant engines and the factory the orchestrator builds them with.

use crate::error::CoreError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tenant_lifecycle::{
	CompositeLifecycleStep, LifecycleComponent, LifecycleError, LifecycleOperation,
	LifecycleProgressMonitor, LifecycleState, LifecycleStep, TenantScopedComponent,
};
use tenant_types::{LifecycleStatus, TenantEngineResource, TenantToken};

/// One tenant's processing engine inside one microservice.
pub trait TenantEngine: LifecycleComponent {
	fn tenant_token(&self) -> &TenantToken;

	/// Resource the engine was created from.
	fn resource(&self) -> &TenantEngineResource;
}

/// Creates runtime engines from resource descriptors.
///
/// A fresh engine is created for every initialization, including restarts,
/// so implementations should not cache engines.
#[async_trait]
pub trait TenantEngineFactory: Send + Sync + 'static {
	type Engine: TenantEngine + 'static;

	async fn create_tenant_engine(
		&self,
		resource: &TenantEngineResource,
	) -> Result<Arc<Self::Engine>, CoreError>;
}

struct NestedComponent {
	component: Arc<dyn LifecycleComponent>,
	required: bool,
}

/// A tenant engine assembled from an ordered list of nested components.
///
/// Initialize and start visit the components in the order they were added,
/// stop and terminate visit them in reverse.
pub struct ComposedTenantEngine {
	name: String,
	token: TenantToken,
	resource: TenantEngineResource,
	state: LifecycleState,
	components: Vec<NestedComponent>,
}

impl ComposedTenantEngine {
	pub fn builder(resource: TenantEngineResource) -> Result<ComposedTenantEngineBuilder, CoreError> {
		let token = resource.tenant_token()?;
		Ok(ComposedTenantEngineBuilder {
			name: format!("tenant-engine[{}]", token),
			token,
			resource,
			components: Vec::new(),
		})
	}

	pub fn components(&self) -> impl Iterator<Item = &Arc<dyn LifecycleComponent>> {
		self.components.iter().map(|c| &c.component)
	}

	fn sequence(&self, operation: LifecycleOperation) -> CompositeLifecycleStep {
		let mut step = CompositeLifecycleStep::new(format!("{} {}", operation, self.name));
		match operation {
			LifecycleOperation::Initialize => {
				for nested in &self.components {
					step.add_initialize_step(
						&self.name,
						Some(nested.component.clone()),
						nested.required,
					);
				}
			}
			LifecycleOperation::Start => {
				for nested in &self.components {
					step.add_start_step(
						&self.name,
						Some(nested.component.clone()),
						nested.required,
					);
				}
			}
			LifecycleOperation::Stop => {
				for nested in self.components.iter().rev() {
					step.add_stop_step(&self.name, Some(nested.component.clone()));
				}
			}
			LifecycleOperation::Terminate => {
				for nested in self.components.iter().rev() {
					step.add_terminate_step(&self.name, Some(nested.component.clone()));
				}
			}
		}
		step
	}

	async fn run(&self, operation: LifecycleOperation, monitor: &mut LifecycleProgressMonitor) {
		let step = self.sequence(operation);
		self.state
			.drive(&self.name, operation, run_sequence(step, monitor))
			.await
	}
}

async fn run_sequence(
	step: CompositeLifecycleStep,
	monitor: &mut LifecycleProgressMonitor,
) -> Result<(), LifecycleError> {
	step.execute(monitor).await
}

impl fmt::Debug for ComposedTenantEngine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComposedTenantEngine")
			.field("name", &self.name)
			.field("token", &self.token)
			.field("status", &self.state.status())
			.field("components", &self.components.len())
			.finish()
	}
}

#[async_trait]
impl LifecycleComponent for ComposedTenantEngine {
	fn component_name(&self) -> String {
		self.name.clone()
	}

	fn lifecycle_status(&self) -> LifecycleStatus {
		self.state.status()
	}

	fn lifecycle_error(&self) -> Option<Arc<LifecycleError>> {
		self.state.error()
	}

	async fn lifecycle_initialize(&self, monitor: &mut LifecycleProgressMonitor) {
		self.run(LifecycleOperation::Initialize, monitor).await
	}

	async fn lifecycle_start(&self, monitor: &mut LifecycleProgressMonitor) {
		self.run(LifecycleOperation::Start, monitor).await
	}

	async fn lifecycle_stop(&self, monitor: &mut LifecycleProgressMonitor) {
		self.run(LifecycleOperation::Stop, monitor).await
	}

	async fn lifecycle_terminate(&self, monitor: &mut LifecycleProgressMonitor) {
		self.run(LifecycleOperation::Terminate, monitor).await
	}
}

impl TenantEngine for ComposedTenantEngine {
	fn tenant_token(&self) -> &TenantToken {
		&self.token
	}

	fn resource(&self) -> &TenantEngineResource {
		&self.resource
	}
}

/// Wires the nested components of a [`ComposedTenantEngine`].
pub struct ComposedTenantEngineBuilder {
	name: String,
	token: TenantToken,
	resource: TenantEngineResource,
	components: Vec<NestedComponent>,
}

impl ComposedTenantEngineBuilder {
	/// Adds a component; its operations run in a span carrying the tenant.
	pub fn with_component<C>(mut self, component: C, required: bool) -> Self
	where
		C: LifecycleComponent + 'static,
	{
		let scoped = TenantScopedComponent::new(self.token.clone(), component);
		self.components.push(NestedComponent {
			component: Arc::new(scoped),
			required,
		});
		self
	}

	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = name.into();
		self
	}

	pub fn build(self) -> ComposedTenantEngine {
		ComposedTenantEngine {
			name: self.name,
			token: self.token,
			resource: self.resource,
			state: LifecycleState::new(),
			components: self.components,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;
	use tenant_lifecycle::{LifecycleHooks, ManagedComponent};

	struct Journal {
		name: &'static str,
		log: Arc<Mutex<Vec<String>>>,
		fail_start: bool,
	}

	impl Journal {
		fn note(&self, operation: &str) {
			self.log
				.lock()
				.unwrap()
				.push(format!("{}:{}", operation, self.name));
		}
	}

	#[async_trait]
	impl LifecycleHooks for Journal {
		async fn initialize(
			&self,
			_monitor: &mut LifecycleProgressMonitor,
		) -> Result<(), LifecycleError> {
			self.note("initialize");
			Ok(())
		}

		async fn start(
			&self,
			_monitor: &mut LifecycleProgressMonitor,
		) -> Result<(), LifecycleError> {
			self.note("start");
			if self.fail_start {
				return Err(LifecycleError::failed(format!("{} refused to start", self.name)));
			}
			Ok(())
		}

		async fn stop(&self, _monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
			self.note("stop");
			Ok(())
		}

		async fn terminate(
			&self,
			_monitor: &mut LifecycleProgressMonitor,
		) -> Result<(), LifecycleError> {
			self.note("terminate");
			Ok(())
		}
	}

	fn journal(
		name: &'static str,
		log: &Arc<Mutex<Vec<String>>>,
		fail_start: bool,
	) -> ManagedComponent<Journal> {
		ManagedComponent::new(
			name,
			Journal {
				name,
				log: log.clone(),
				fail_start,
			},
		)
	}

	fn resource() -> TenantEngineResource {
		TenantEngineResource::new(
			"acme-event-sources",
			"iot",
			&TenantToken::new("acme").unwrap(),
			serde_json::Value::Null,
		)
	}

	#[tokio::test]
	async fn test_nested_components_run_in_order_and_reverse() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let engine = ComposedTenantEngine::builder(resource())
			.unwrap()
			.with_component(journal("store", &log, false), true)
			.with_component(journal("inbound", &log, false), true)
			.build();
		let mut monitor = LifecycleProgressMonitor::new("acme");

		engine.lifecycle_initialize(&mut monitor).await;
		engine.lifecycle_start(&mut monitor).await;
		assert_eq!(engine.lifecycle_status(), LifecycleStatus::Started);
		assert_eq!(engine.tenant_token().as_str(), "acme");

		engine.lifecycle_stop(&mut monitor).await;
		engine.lifecycle_terminate(&mut monitor).await;
		assert_eq!(engine.lifecycle_status(), LifecycleStatus::Terminated);

		assert_eq!(
			*log.lock().unwrap(),
			vec![
				"initialize:store",
				"initialize:inbound",
				"start:store",
				"start:inbound",
				"stop:inbound",
				"stop:store",
				"terminate:inbound",
				"terminate:store",
			]
		);
		assert!(engine
			.components()
			.all(|c| c.lifecycle_status() == LifecycleStatus::Terminated));
	}

	#[tokio::test]
	async fn test_required_start_failure_fails_engine() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let engine = ComposedTenantEngine::builder(resource())
			.unwrap()
			.with_component(journal("inbound", &log, true), true)
			.with_component(journal("outbound", &log, false), true)
			.build();
		let mut monitor = LifecycleProgressMonitor::new("acme");

		engine.lifecycle_initialize(&mut monitor).await;
		engine.lifecycle_start(&mut monitor).await;

		assert_eq!(engine.lifecycle_status(), LifecycleStatus::LifecycleError);
		let error = engine.lifecycle_error().unwrap();
		assert!(error.to_string().contains("inbound refused to start"));
		assert!(!log.lock().unwrap().contains(&"start:outbound".to_string()));
	}

	#[tokio::test]
	async fn test_optional_start_failure_keeps_engine_running() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let engine = ComposedTenantEngine::builder(resource())
			.unwrap()
			.with_component(journal("metrics", &log, true), false)
			.with_component(journal("inbound", &log, false), true)
			.build();
		let mut monitor = LifecycleProgressMonitor::new("acme");

		engine.lifecycle_initialize(&mut monitor).await;
		engine.lifecycle_start(&mut monitor).await;
		assert_eq!(engine.lifecycle_status(), LifecycleStatus::Started);
	}

	#[test]
	fn test_builder_requires_tenant_label() {
		let mut unlabelled = resource();
		unlabelled.metadata.labels.clear();
		assert!(matches!(
			ComposedTenantEngine::builder(unlabelled),
			Err(CoreError::Resource(_))
		));
	}
}

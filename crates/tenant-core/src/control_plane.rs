//! Access to tenant engine resources held by the cluster control plane.

use crate::error::CoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use tenant_types::{
	EventBus, TenantEngineEvent, TenantEngineResource, TenantEngineSpecUpdates, TenantEngineStatus,
	TenantToken, LABEL_FUNCTION,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Reads tenant engine resources and writes their status back.
///
/// Reads always return the latest stored version: a resource may change
/// between being queued and being processed.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
	/// Every tenant engine resource of this service.
	async fn list_tenant_engines(&self) -> Result<Vec<TenantEngineResource>, CoreError>;

	async fn get_tenant_engine(
		&self,
		token: &TenantToken,
	) -> Result<Option<TenantEngineResource>, CoreError>;

	async fn update_tenant_engine_status(
		&self,
		token: &TenantToken,
		status: TenantEngineStatus,
	) -> Result<(), CoreError>;
}

/// Process-local control plane used by the service binary and tests.
///
/// Spec changes are published as [`TenantEngineEvent`]s; status writes are
/// stored silently, like a status subresource.
pub struct InMemoryControlPlane {
	function: String,
	resources: DashMap<TenantToken, TenantEngineResource>,
	events: EventBus,
}

impl InMemoryControlPlane {
	pub fn new(function: impl Into<String>) -> Self {
		Self {
			function: function.into(),
			resources: DashMap::new(),
			events: EventBus::new(1024),
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<TenantEngineEvent> {
		self.events.subscribe()
	}

	/// Creates or replaces a resource and publishes the matching event.
	///
	/// Replacing bumps the generation when the spec or labels changed and
	/// keeps the last written status.
	pub fn upsert(&self, resource: TenantEngineResource) -> Result<TenantEngineEvent, CoreError> {
		let token = resource.tenant_token()?;
		let mut resource = resource.with_label(LABEL_FUNCTION, self.function.clone());

		let event = match self.resources.get(&token).map(|r| r.value().clone()) {
			Some(previous) => {
				let updates = TenantEngineSpecUpdates::between(&previous, &resource);
				resource.metadata.generation = if updates.is_empty() {
					previous.metadata.generation
				} else {
					previous.metadata.generation + 1
				};
				resource.status = previous.status.clone();
				TenantEngineEvent::Updated {
					resource: resource.clone(),
					updates,
				}
			}
			None => TenantEngineEvent::Created {
				resource: resource.clone(),
			},
		};

		self.resources.insert(token.clone(), resource);
		let receivers = self.events.publish(event.clone());
		debug!("Published change of tenant engine '{}' to {} watchers", token, receivers);
		Ok(event)
	}

	/// Removes a resource, publishing a deletion when it existed.
	pub fn delete(&self, token: &TenantToken) -> Option<TenantEngineResource> {
		let (_, resource) = self.resources.remove(token)?;
		info!("Deleted tenant engine resource '{}'", resource.name());
		self.events.publish(TenantEngineEvent::Deleted {
			resource: resource.clone(),
		});
		Some(resource)
	}

	pub fn len(&self) -> usize {
		self.resources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.resources.is_empty()
	}
}

#[async_trait]
impl ControlPlaneClient for InMemoryControlPlane {
	async fn list_tenant_engines(&self) -> Result<Vec<TenantEngineResource>, CoreError> {
		let mut resources: Vec<_> = self.resources.iter().map(|r| r.value().clone()).collect();
		resources.sort_by(|a, b| a.name().cmp(b.name()));
		Ok(resources)
	}

	async fn get_tenant_engine(
		&self,
		token: &TenantToken,
	) -> Result<Option<TenantEngineResource>, CoreError> {
		Ok(self.resources.get(token).map(|r| r.value().clone()))
	}

	async fn update_tenant_engine_status(
		&self,
		token: &TenantToken,
		status: TenantEngineStatus,
	) -> Result<(), CoreError> {
		let mut resource = self.resources.get_mut(token).ok_or_else(|| {
			CoreError::ControlPlane(format!("No tenant engine resource for '{}'", token))
		})?;
		resource.status = Some(status);
		Ok(())
	}
}

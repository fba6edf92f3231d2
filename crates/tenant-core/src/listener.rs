//! Translation of control-plane watch events into orchestrator calls.

use crate::control_plane::ControlPlaneClient;
use async_trait::async_trait;
use std::sync::Arc;
use tenant_types::{TenantEngineEvent, TenantEngineResource, TenantEngineSpecUpdates};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receives tenant engine resource changes.
#[async_trait]
pub trait TenantEngineConfigurationListener: Send + Sync {
	async fn on_tenant_engine_created(&self, resource: TenantEngineResource);

	async fn on_tenant_engine_updated(
		&self,
		resource: TenantEngineResource,
		updates: TenantEngineSpecUpdates,
	);

	async fn on_tenant_engine_deleted(&self, resource: TenantEngineResource);

	/// Called with the full resource list after events were missed.
	async fn on_tenant_engines_resynced(&self, resources: Vec<TenantEngineResource>) {
		for resource in resources {
			self.on_tenant_engine_created(resource).await;
		}
	}
}

/// Forwards events from a watch channel to a listener until the channel
/// closes or the watcher is stopped.
///
/// A watcher built with [`ResourceWatcher::spawn_with_resync`] lists every
/// resource from the control plane whenever it falls behind the channel.
pub struct ResourceWatcher {
	handle: JoinHandle<()>,
}

impl ResourceWatcher {
	pub fn spawn(
		events: broadcast::Receiver<TenantEngineEvent>,
		listener: Arc<dyn TenantEngineConfigurationListener>,
	) -> Self {
		Self::start(events, listener, None)
	}

	pub fn spawn_with_resync(
		events: broadcast::Receiver<TenantEngineEvent>,
		listener: Arc<dyn TenantEngineConfigurationListener>,
		control_plane: Arc<dyn ControlPlaneClient>,
	) -> Self {
		Self::start(events, listener, Some(control_plane))
	}

	fn start(
		mut events: broadcast::Receiver<TenantEngineEvent>,
		listener: Arc<dyn TenantEngineConfigurationListener>,
		control_plane: Option<Arc<dyn ControlPlaneClient>>,
	) -> Self {
		let handle = tokio::spawn(async move {
			loop {
				match events.recv().await {
					Ok(event) => dispatch(listener.as_ref(), event).await,
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!("Resource watcher lagged, {} events skipped", skipped);
						if let Some(control_plane) = &control_plane {
							resync(control_plane.as_ref(), listener.as_ref()).await;
						}
					}
					Err(broadcast::error::RecvError::Closed) => {
						info!("Resource watch channel closed");
						break;
					}
				}
			}
		});
		Self { handle }
	}

	pub fn stop(&self) {
		self.handle.abort();
	}

	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}
}

impl Drop for ResourceWatcher {
	fn drop(&mut self) {
		self.handle.abort();
	}
}

async fn dispatch(listener: &dyn TenantEngineConfigurationListener, event: TenantEngineEvent) {
	debug!("Dispatching {} event for '{}'", kind(&event), event.resource().name());
	match event {
		TenantEngineEvent::Created { resource } => listener.on_tenant_engine_created(resource).await,
		TenantEngineEvent::Updated { resource, updates } => {
			listener.on_tenant_engine_updated(resource, updates).await
		}
		TenantEngineEvent::Deleted { resource } => listener.on_tenant_engine_deleted(resource).await,
	}
}

async fn resync(
	control_plane: &dyn ControlPlaneClient,
	listener: &dyn TenantEngineConfigurationListener,
) {
	match control_plane.list_tenant_engines().await {
		Ok(resources) => {
			info!("Resyncing {} tenant engine resources", resources.len());
			listener.on_tenant_engines_resynced(resources).await;
		}
		Err(e) => error!("Unable to resync tenant engine resources: {}", e),
	}
}

fn kind(event: &TenantEngineEvent) -> &'static str {
	match event {
		TenantEngineEvent::Created { .. } => "created",
		TenantEngineEvent::Updated { .. } => "updated",
		TenantEngineEvent::Deleted { .. } => "deleted",
	}
}

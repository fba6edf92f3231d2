use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{TenantEngineResource, TenantEngineSpecUpdates};

/// Change notification for a tenant engine resource, as observed by a
/// control-plane watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TenantEngineEvent {
	Created {
		resource: TenantEngineResource,
	},
	Updated {
		resource: TenantEngineResource,
		updates: TenantEngineSpecUpdates,
	},
	Deleted {
		resource: TenantEngineResource,
	},
}

impl TenantEngineEvent {
	pub fn resource(&self) -> &TenantEngineResource {
		match self {
			Self::Created { resource }
			| Self::Updated { resource, .. }
			| Self::Deleted { resource } => resource,
		}
	}
}

/// Broadcast bus carrying [`TenantEngineEvent`]s to every watcher.
pub struct EventBus {
	sender: broadcast::Sender<TenantEngineEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<TenantEngineEvent> {
		self.sender.subscribe()
	}

	/// Publishes to current subscribers. Having none is not an error for the
	/// publisher, so the number of receivers is returned instead.
	pub fn publish(&self, event: TenantEngineEvent) -> usize {
		self.sender.send(event).unwrap_or(0)
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::TenantToken;

	#[tokio::test]
	async fn test_publish_reaches_subscribers() {
		let bus = EventBus::new(8);
		assert_eq!(
			bus.publish(TenantEngineEvent::Created {
				resource: TenantEngineResource::new(
					"acme",
					"iot",
					&TenantToken::new("acme").unwrap(),
					serde_json::Value::Null,
				),
			}),
			0
		);

		let mut rx = bus.subscribe();
		let resource =
			TenantEngineResource::new("beta", "iot", &TenantToken::new("beta").unwrap(), serde_json::Value::Null);
		assert_eq!(
			bus.clone().publish(TenantEngineEvent::Deleted {
				resource: resource.clone()
			}),
			1
		);

		let event = rx.recv().await.unwrap();
		assert!(matches!(event, TenantEngineEvent::Deleted { .. }));
		assert_eq!(event.resource(), &resource);
	}
}

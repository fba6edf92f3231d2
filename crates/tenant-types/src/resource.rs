//! Tenant and tenant engine resource descriptors.
//!
//! A [`TenantEngineResource`] is the declarative record the control plane
//! keeps for one tenant's engine inside one microservice. The orchestrator
//! never owns these; it reads them, keys them by [`TenantToken`] and writes
//! back a [`TenantEngineStatus`].

use crate::errors::{ResourceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Label carrying the owning tenant's token on every tenant engine resource.
pub const LABEL_TENANT: &str = "iot.platform/tenant";

/// Label carrying the microservice function a tenant engine belongs to.
pub const LABEL_FUNCTION: &str = "iot.platform/function";

/// Stable identity of a tenant. Used as the key of every tracking map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantToken(String);

impl TenantToken {
	pub fn new(token: impl Into<String>) -> Result<Self> {
		let token = token.into();
		if token.trim().is_empty() {
			return Err(ResourceError::EmptyToken);
		}
		Ok(Self(token))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for TenantToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl Borrow<str> for TenantToken {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl AsRef<str> for TenantToken {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// Lifecycle status shared by every lifecycle component.
///
/// `Stopped` is the initial status. Error statuses are reachable from the
/// operation that failed and are left only by re-running an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleStatus {
	Stopped,
	Initializing,
	InitializationError,
	Starting,
	Started,
	Stopping,
	LifecycleError,
	Terminating,
	Terminated,
}

impl LifecycleStatus {
	pub fn is_error(&self) -> bool {
		matches!(self, Self::InitializationError | Self::LifecycleError)
	}
}

impl fmt::Display for LifecycleStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Stopped => "Stopped",
			Self::Initializing => "Initializing",
			Self::InitializationError => "InitializationError",
			Self::Starting => "Starting",
			Self::Started => "Started",
			Self::Stopping => "Stopping",
			Self::LifecycleError => "LifecycleError",
			Self::Terminating => "Terminating",
			Self::Terminated => "Terminated",
		};
		f.write_str(s)
	}
}

/// Control-plane metadata of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceMetadata {
	/// Resource name, unique within its namespace.
	pub name: String,
	/// Namespace the resource lives in.
	pub namespace: String,
	/// Free-form labels. [`LABEL_TENANT`] identifies the owning tenant.
	#[serde(default)]
	pub labels: BTreeMap<String, String>,
	/// Incremented by the control plane on every spec change.
	#[serde(default)]
	pub generation: u64,
}

/// Desired state of a tenant engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TenantEngineSpec {
	/// Tenant-scoped configuration consumed by the engine factory.
	#[serde(default)]
	pub configuration: serde_json::Value,
}

/// Observed state written back by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantEngineStatus {
	pub lifecycle_status: LifecycleStatus,
	/// Message of the error that moved the engine into a failed state.
	pub error: Option<String>,
	pub updated_at: DateTime<Utc>,
}

impl TenantEngineStatus {
	pub fn new(lifecycle_status: LifecycleStatus, error: Option<String>) -> Self {
		Self {
			lifecycle_status,
			error,
			updated_at: Utc::now(),
		}
	}
}

/// Versioned descriptor of one tenant's engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantEngineResource {
	pub metadata: ResourceMetadata,
	#[serde(default)]
	pub spec: TenantEngineSpec,
	#[serde(default)]
	pub status: Option<TenantEngineStatus>,
}

impl TenantEngineResource {
	/// Creates a descriptor labelled for `token`.
	pub fn new(
		name: impl Into<String>,
		namespace: impl Into<String>,
		token: &TenantToken,
		configuration: serde_json::Value,
	) -> Self {
		let mut labels = BTreeMap::new();
		labels.insert(LABEL_TENANT.to_string(), token.to_string());
		Self {
			metadata: ResourceMetadata {
				name: name.into(),
				namespace: namespace.into(),
				labels,
				generation: 1,
			},
			spec: TenantEngineSpec { configuration },
			status: None,
		}
	}

	pub fn name(&self) -> &str {
		&self.metadata.name
	}

	/// Resolves the owning tenant from the [`LABEL_TENANT`] label.
	pub fn tenant_token(&self) -> Result<TenantToken> {
		let label = self
			.metadata
			.labels
			.get(LABEL_TENANT)
			.ok_or_else(|| ResourceError::MissingTenantLabel(self.metadata.name.clone()))?;
		TenantToken::new(label.clone())
	}

	pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata.labels.insert(key.into(), value.into());
		self
	}
}

/// Describes which parts of a tenant engine resource changed in an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TenantEngineSpecUpdates {
	/// Engine configuration changed; the running engine must be restarted.
	pub configuration_updated: bool,
	/// Only labels changed.
	pub labels_updated: bool,
}

impl TenantEngineSpecUpdates {
	pub fn between(previous: &TenantEngineResource, current: &TenantEngineResource) -> Self {
		Self {
			configuration_updated: previous.spec != current.spec,
			labels_updated: previous.metadata.labels != current.metadata.labels,
		}
	}

	pub fn is_empty(&self) -> bool {
		!self.configuration_updated && !self.labels_updated
	}
}

// tenant-core/src/error.rs

use crate::availability::TenantEngineNotAvailable;
use tenant_lifecycle::LifecycleError;
use tenant_types::ResourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error("Resource error: {0}")]
	Resource(#[from] ResourceError),

	#[error("Failed to create tenant engine for '{token}': {message}")]
	EngineConstruction { token: String, message: String },

	#[error("Lifecycle error: {0}")]
	Lifecycle(#[from] LifecycleError),

	#[error(transparent)]
	Unavailable(#[from] TenantEngineNotAvailable),

	#[error("Control plane error: {0}")]
	ControlPlane(String),

	#[error("Channel error: {0}")]
	Channel(String),

	#[error("Shutdown error: {0}")]
	Shutdown(String),
}

//! Error types for resource descriptors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResourceError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
	/// The descriptor carries no tenant label, so it cannot be keyed.
	#[error("Tenant engine '{0}' does not have a tenant label")]
	MissingTenantLabel(String),

	#[error("Tenant token must not be empty")]
	EmptyToken,

	#[error("No tenant engine resource found for tenant '{0}'")]
	NotFound(String),

	#[error("Invalid tenant engine configuration: {0}")]
	InvalidConfiguration(String),

	#[error("Control plane error: {0}")]
	ControlPlane(String),
}

//! Typed answers to "can this tenant's engine serve a request right now?".

use serde::Serialize;
use std::fmt;
use tenant_types::{LifecycleStatus, TenantToken};
use thiserror::Error;

/// Why a tenant engine cannot serve requests.
///
/// Lets callers tell a permanent condition from one worth retrying:
/// `NotStarted` usually resolves itself, the failure reasons need a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
	NotFound,
	InitializationFailed,
	StartFailed,
	NotStarted,
}

impl UnavailableReason {
	/// Maps an engine status to a reason, or `None` when it is `Started`.
	pub fn from_status(status: LifecycleStatus) -> Option<Self> {
		match status {
			LifecycleStatus::Started => None,
			LifecycleStatus::InitializationError => Some(Self::InitializationFailed),
			LifecycleStatus::LifecycleError => Some(Self::StartFailed),
			_ => Some(Self::NotStarted),
		}
	}

	/// Whether the condition may clear without operator action.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::NotStarted)
	}
}

impl fmt::Display for UnavailableReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NotFound => write!(f, "not found"),
			Self::InitializationFailed => write!(f, "initialization failed"),
			Self::StartFailed => write!(f, "start failed"),
			Self::NotStarted => write!(f, "not yet started"),
		}
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Tenant engine for '{token}' is not available: {reason}")]
pub struct TenantEngineNotAvailable {
	pub token: TenantToken,
	pub reason: UnavailableReason,
	/// Status of the engine when one exists
	pub status: Option<LifecycleStatus>,
}

impl TenantEngineNotAvailable {
	pub fn not_found(token: TenantToken) -> Self {
		Self {
			token,
			reason: UnavailableReason::NotFound,
			status: None,
		}
	}
}

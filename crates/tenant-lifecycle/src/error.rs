// tenant-lifecycle/src/error.rs

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tenant_types::LifecycleStatus;
use thiserror::Error;

/// The four operations that drive a lifecycle component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOperation {
	Initialize,
	Start,
	Stop,
	Terminate,
}

impl fmt::Display for LifecycleOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Initialize => write!(f, "initialize"),
			Self::Start => write!(f, "start"),
			Self::Stop => write!(f, "stop"),
			Self::Terminate => write!(f, "terminate"),
		}
	}
}

#[derive(Error, Debug)]
pub enum LifecycleError {
	#[error("{0}")]
	Failed(String),

	#[error("Cannot {operation} component '{component}' while it is {status}")]
	InvalidTransition {
		component: String,
		operation: LifecycleOperation,
		status: LifecycleStatus,
	},

	#[error("Component '{component}' entered {status} during {operation}: {source}")]
	Component {
		component: String,
		operation: LifecycleOperation,
		status: LifecycleStatus,
		#[source]
		source: Arc<LifecycleError>,
	},

	#[error("Unhandled panic in '{context}': {message}")]
	Panicked { context: String, message: String },

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl LifecycleError {
	pub fn failed(message: impl Into<String>) -> Self {
		Self::Failed(message.into())
	}

	pub(crate) fn from_panic(context: &str, payload: Box<dyn Any + Send>) -> Self {
		let message = if let Some(s) = payload.downcast_ref::<&str>() {
			(*s).to_string()
		} else if let Some(s) = payload.downcast_ref::<String>() {
			s.clone()
		} else {
			"non-string panic payload".to_string()
		};
		Self::Panicked {
			context: context.to_string(),
			message,
		}
	}
}

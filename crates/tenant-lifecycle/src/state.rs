// tenant-lifecycle/src/state.rs

use crate::error::{LifecycleError, LifecycleOperation};
use arc_swap::ArcSwap;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tenant_types::LifecycleStatus;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
struct Snapshot {
	status: LifecycleStatus,
	initialized: bool,
	error: Option<Arc<LifecycleError>>,
}

/// What a requested operation may do given the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
	Proceed(LifecycleStatus),
	Skip,
	Reject,
}

/// Lock-free holder of a component's lifecycle status and last error.
///
/// Readers on arbitrary threads see a consistent `(status, error)` pair
/// without blocking; writers only come from the operation being driven.
pub struct LifecycleState {
	inner: ArcSwap<Snapshot>,
}

impl LifecycleState {
	pub fn new() -> Self {
		Self {
			inner: ArcSwap::from_pointee(Snapshot {
				status: LifecycleStatus::Stopped,
				initialized: false,
				error: None,
			}),
		}
	}

	pub fn status(&self) -> LifecycleStatus {
		self.inner.load().status
	}

	/// Error recorded by the last failed operation, cleared on success.
	pub fn error(&self) -> Option<Arc<LifecycleError>> {
		self.inner.load().error.clone()
	}

	pub fn is_initialized(&self) -> bool {
		self.inner.load().initialized
	}

	/// Runs `work` as `operation` on the component named `component`.
	///
	/// The status moves to the transitional state first, then to the success
	/// or error state depending on the outcome. Failures (including panics in
	/// `work`) are recorded rather than returned; callers inspect
	/// [`status`](Self::status) afterwards.
	pub async fn drive<F>(&self, component: &str, operation: LifecycleOperation, work: F)
	where
		F: Future<Output = Result<(), LifecycleError>> + Send,
	{
		let previous = match self.begin(component, operation) {
			Ok(Some(previous)) => previous,
			Ok(None) => {
				debug!("Nothing to {} for component '{}'", operation, component);
				return;
			}
			Err(e) => {
				warn!("{}", e);
				return;
			}
		};

		let started = Instant::now();
		let result = match AssertUnwindSafe(work).catch_unwind().await {
			Ok(result) => result,
			Err(payload) => Err(LifecycleError::from_panic(component, payload)),
		};

		match result {
			Ok(()) => {
				let status = success_status(operation);
				let initialized =
					previous.initialized || operation == LifecycleOperation::Initialize;
				self.set(status, initialized, None);
				info!(
					"Component '{}' {} completed in {}ms ({})",
					component,
					operation,
					started.elapsed().as_millis(),
					status
				);
			}
			Err(e) => {
				let status = error_status(operation);
				error!("Component '{}' failed to {}: {}", component, operation, e);
				let initialized =
					previous.initialized && operation != LifecycleOperation::Initialize;
				self.set(status, initialized, Some(Arc::new(e)));
			}
		}
	}

	/// Atomically validates the transition and moves to the transitional
	/// status. Returns the snapshot that was replaced.
	fn begin(
		&self,
		component: &str,
		operation: LifecycleOperation,
	) -> Result<Option<Arc<Snapshot>>, LifecycleError> {
		loop {
			let current = self.inner.load_full();
			let transitional = match admit(&current, operation) {
				Admission::Proceed(status) => status,
				Admission::Skip => return Ok(None),
				Admission::Reject => {
					return Err(LifecycleError::InvalidTransition {
						component: component.to_string(),
						operation,
						status: current.status,
					})
				}
			};

			let next = Arc::new(Snapshot {
				status: transitional,
				initialized: current.initialized,
				error: current.error.clone(),
			});
			let swapped = self.inner.compare_and_swap(&current, next);
			if Arc::ptr_eq(&*swapped, &current) {
				return Ok(Some(current));
			}
		}
	}

	fn set(&self, status: LifecycleStatus, initialized: bool, error: Option<Arc<LifecycleError>>) {
		self.inner.store(Arc::new(Snapshot {
			status,
			initialized,
			error,
		}));
	}
}

impl Default for LifecycleState {
	fn default() -> Self {
		Self::new()
	}
}

fn admit(current: &Snapshot, operation: LifecycleOperation) -> Admission {
	use LifecycleOperation::*;
	use LifecycleStatus::*;

	match (operation, current.status) {
		(Initialize, Stopped) if !current.initialized => Admission::Proceed(Initializing),
		(Initialize, InitializationError) => Admission::Proceed(Initializing),

		(Start, Stopped | LifecycleError) if current.initialized => Admission::Proceed(Starting),

		(Stop, Started | LifecycleError) => Admission::Proceed(Stopping),
		(Stop, Stopped | InitializationError) => Admission::Skip,

		(Terminate, Terminated) => Admission::Skip,
		(Terminate, Stopped | Started | InitializationError | LifecycleError) => {
			Admission::Proceed(Terminating)
		}

		_ => Admission::Reject,
	}
}

fn success_status(operation: LifecycleOperation) -> LifecycleStatus {
	match operation {
		LifecycleOperation::Initialize => LifecycleStatus::Stopped,
		LifecycleOperation::Start => LifecycleStatus::Started,
		LifecycleOperation::Stop => LifecycleStatus::Stopped,
		LifecycleOperation::Terminate => LifecycleStatus::Terminated,
	}
}

fn error_status(operation: LifecycleOperation) -> LifecycleStatus {
	match operation {
		LifecycleOperation::Initialize => LifecycleStatus::InitializationError,
		_ => LifecycleStatus::LifecycleError,
	}
}

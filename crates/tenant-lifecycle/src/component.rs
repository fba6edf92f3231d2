//! The lifecycle component capability interface.

use crate::error::{LifecycleError, LifecycleOperation};
use crate::progress::LifecycleProgressMonitor;
use crate::state::LifecycleState;
use async_trait::async_trait;
use std::sync::Arc;
use tenant_types::LifecycleStatus;

/// A unit with an `initialize → start → stop → terminate` state machine.
///
/// Operations never return errors. A failing operation moves the component
/// into `InitializationError` or `LifecycleError` and records the cause,
/// which callers read back through [`lifecycle_error`](Self::lifecycle_error).
#[async_trait]
pub trait LifecycleComponent: Send + Sync {
	fn component_name(&self) -> String;

	fn lifecycle_status(&self) -> LifecycleStatus;

	fn lifecycle_error(&self) -> Option<Arc<LifecycleError>>;

	async fn lifecycle_initialize(&self, monitor: &mut LifecycleProgressMonitor);

	async fn lifecycle_start(&self, monitor: &mut LifecycleProgressMonitor);

	async fn lifecycle_stop(&self, monitor: &mut LifecycleProgressMonitor);

	async fn lifecycle_terminate(&self, monitor: &mut LifecycleProgressMonitor);

	/// Runs `operation` by name. Used by lifecycle steps.
	async fn lifecycle_execute(
		&self,
		operation: LifecycleOperation,
		monitor: &mut LifecycleProgressMonitor,
	) {
		match operation {
			LifecycleOperation::Initialize => self.lifecycle_initialize(monitor).await,
			LifecycleOperation::Start => self.lifecycle_start(monitor).await,
			LifecycleOperation::Stop => self.lifecycle_stop(monitor).await,
			LifecycleOperation::Terminate => self.lifecycle_terminate(monitor).await,
		}
	}
}

#[async_trait]
impl<T: LifecycleComponent + ?Sized> LifecycleComponent for Arc<T> {
	fn component_name(&self) -> String {
		(**self).component_name()
	}

	fn lifecycle_status(&self) -> LifecycleStatus {
		(**self).lifecycle_status()
	}

	fn lifecycle_error(&self) -> Option<Arc<LifecycleError>> {
		(**self).lifecycle_error()
	}

	async fn lifecycle_initialize(&self, monitor: &mut LifecycleProgressMonitor) {
		(**self).lifecycle_initialize(monitor).await
	}

	async fn lifecycle_start(&self, monitor: &mut LifecycleProgressMonitor) {
		(**self).lifecycle_start(monitor).await
	}

	async fn lifecycle_stop(&self, monitor: &mut LifecycleProgressMonitor) {
		(**self).lifecycle_stop(monitor).await
	}

	async fn lifecycle_terminate(&self, monitor: &mut LifecycleProgressMonitor) {
		(**self).lifecycle_terminate(monitor).await
	}
}

/// The work a component does in each lifecycle operation.
///
/// Every hook defaults to a no-op, so implementors only override the
/// operations they care about.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
	async fn initialize(
		&self,
		_monitor: &mut LifecycleProgressMonitor,
	) -> Result<(), LifecycleError> {
		Ok(())
	}

	async fn start(
		&self,
		_monitor: &mut LifecycleProgressMonitor,
	) -> Result<(), LifecycleError> {
		Ok(())
	}

	async fn stop(
		&self,
		_monitor: &mut LifecycleProgressMonitor,
	) -> Result<(), LifecycleError> {
		Ok(())
	}

	async fn terminate(
		&self,
		_monitor: &mut LifecycleProgressMonitor,
	) -> Result<(), LifecycleError> {
		Ok(())
	}
}

/// A [`LifecycleComponent`] whose status is tracked by a [`LifecycleState`]
/// and whose work is delegated to a [`LifecycleHooks`] implementation.
pub struct ManagedComponent<H> {
	name: String,
	state: LifecycleState,
	hooks: H,
}

impl<H: LifecycleHooks> ManagedComponent<H> {
	pub fn new(name: impl Into<String>, hooks: H) -> Self {
		Self {
			name: name.into(),
			state: LifecycleState::new(),
			hooks,
		}
	}

	pub fn hooks(&self) -> &H {
		&self.hooks
	}
}

#[async_trait]
impl<H: LifecycleHooks> LifecycleComponent for ManagedComponent<H> {
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
		self.state
			.drive(
				&self.name,
				LifecycleOperation::Initialize,
				self.hooks.initialize(monitor),
			)
			.await
	}

	async fn lifecycle_start(&self, monitor: &mut LifecycleProgressMonitor) {
		self.state
			.drive(&self.name, LifecycleOperation::Start, self.hooks.start(monitor))
			.await
	}

	async fn lifecycle_stop(&self, monitor: &mut LifecycleProgressMonitor) {
		self.state
			.drive(&self.name, LifecycleOperation::Stop, self.hooks.stop(monitor))
			.await
	}

	async fn lifecycle_terminate(&self, monitor: &mut LifecycleProgressMonitor) {
		self.state
			.drive(
				&self.name,
				LifecycleOperation::Terminate,
				self.hooks.terminate(monitor),
			)
			.await
	}
}

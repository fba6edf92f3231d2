//! Declarative multi-component lifecycle sequences.
//!
//! A [`CompositeLifecycleStep`] is an ordered list of steps, usually one per
//! nested component, executed strictly in insertion order. It is how a
//! component scripts the initialize/start/stop/terminate of everything it
//! owns without writing the sequencing and failure handling by hand.

use crate::component::LifecycleComponent;
use crate::error::{LifecycleError, LifecycleOperation};
use crate::progress::LifecycleProgressMonitor;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tenant_types::LifecycleStatus;
use tracing::{debug, trace, warn};

/// A single unit of lifecycle work.
#[async_trait]
pub trait LifecycleStep: Send + Sync {
	fn name(&self) -> String;

	/// Number of progress operations this step reports.
	fn operation_count(&self) -> usize {
		1
	}

	async fn execute(&self, monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError>;
}

/// Runs one lifecycle operation against one nested component.
pub struct ComponentLifecycleStep {
	owner: String,
	component: Arc<dyn LifecycleComponent>,
	operation: LifecycleOperation,
	required: bool,
}

impl ComponentLifecycleStep {
	pub fn new(
		owner: impl Into<String>,
		component: Arc<dyn LifecycleComponent>,
		operation: LifecycleOperation,
		required: bool,
	) -> Self {
		Self {
			owner: owner.into(),
			component,
			operation,
			required,
		}
	}

	/// Whether `status` is an acceptable outcome of the operation. An
	/// already-running component counts as initialized.
	fn reached(&self, status: LifecycleStatus) -> bool {
		match self.operation {
			LifecycleOperation::Initialize => {
				matches!(status, LifecycleStatus::Stopped | LifecycleStatus::Started)
			}
			LifecycleOperation::Start => status == LifecycleStatus::Started,
			LifecycleOperation::Stop => status == LifecycleStatus::Stopped,
			LifecycleOperation::Terminate => status == LifecycleStatus::Terminated,
		}
	}
}

#[async_trait]
impl LifecycleStep for ComponentLifecycleStep {
	fn name(&self) -> String {
		let verb = match self.operation {
			LifecycleOperation::Initialize => "Initialize",
			LifecycleOperation::Start => "Start",
			LifecycleOperation::Stop => "Stop",
			LifecycleOperation::Terminate => "Terminate",
		};
		format!("{} {}", verb, self.component.component_name())
	}

	async fn execute(&self, monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		self.component.lifecycle_execute(self.operation, monitor).await;

		let status = self.component.lifecycle_status();
		if self.reached(status) {
			return Ok(());
		}

		let source = self
			.component
			.lifecycle_error()
			.unwrap_or_else(|| {
				Arc::new(LifecycleError::failed(format!(
					"did not {} (status {})",
					self.operation, status
				)))
			});
		let error = LifecycleError::Component {
			component: self.component.component_name(),
			operation: self.operation,
			status,
			source,
		};

		let aborts = self.required
			&& matches!(
				self.operation,
				LifecycleOperation::Initialize | LifecycleOperation::Start
			);
		if aborts {
			return Err(error);
		}

		warn!(
			"Ignoring failure of optional step in '{}': {}",
			self.owner, error
		);
		Ok(())
	}
}

/// An ordered, abortable sequence of [`LifecycleStep`]s.
pub struct CompositeLifecycleStep {
	name: String,
	steps: Vec<Box<dyn LifecycleStep>>,
}

impl CompositeLifecycleStep {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			steps: Vec::new(),
		}
	}

	pub fn add_step(&mut self, step: Box<dyn LifecycleStep>) {
		trace!("Adding step '{}' to '{}'", step.name(), self.name);
		self.steps.push(step);
	}

	/// Appends an initialize step. A missing component is skipped with a
	/// warning so optional nested components need no special casing.
	pub fn add_initialize_step(
		&mut self,
		owner: &str,
		component: Option<Arc<dyn LifecycleComponent>>,
		required: bool,
	) {
		match component {
			Some(component) => self.add_step(Box::new(ComponentLifecycleStep::new(
				owner,
				component,
				LifecycleOperation::Initialize,
				required,
			))),
			None => warn!("Skipping 'initialize' step for missing component of '{}'", owner),
		}
	}

	pub fn add_start_step(
		&mut self,
		owner: &str,
		component: Option<Arc<dyn LifecycleComponent>>,
		required: bool,
	) {
		match component {
			Some(component) => self.add_step(Box::new(ComponentLifecycleStep::new(
				owner,
				component,
				LifecycleOperation::Start,
				required,
			))),
			None => warn!("Skipping 'start' step for missing component of '{}'", owner),
		}
	}

	pub fn add_stop_step(&mut self, owner: &str, component: Option<Arc<dyn LifecycleComponent>>) {
		match component {
			Some(component) => self.add_step(Box::new(ComponentLifecycleStep::new(
				owner,
				component,
				LifecycleOperation::Stop,
				false,
			))),
			None => debug!("Skipping 'stop' step for missing component of '{}'", owner),
		}
	}

	pub fn add_terminate_step(
		&mut self,
		owner: &str,
		component: Option<Arc<dyn LifecycleComponent>>,
	) {
		match component {
			Some(component) => self.add_step(Box::new(ComponentLifecycleStep::new(
				owner,
				component,
				LifecycleOperation::Terminate,
				false,
			))),
			None => debug!("Skipping 'terminate' step for missing component of '{}'", owner),
		}
	}

	pub fn steps(&self) -> &[Box<dyn LifecycleStep>] {
		&self.steps
	}

	pub fn len(&self) -> usize {
		self.steps.len()
	}

	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}
}

#[async_trait]
impl LifecycleStep for CompositeLifecycleStep {
	fn name(&self) -> String {
		self.name.clone()
	}

	fn operation_count(&self) -> usize {
		self.steps.len()
	}

	async fn execute(&self, monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		monitor.push_context(self.steps.len(), self.name.clone());
		let result = self.run_steps(monitor).await;
		monitor.pop_context();
		result
	}
}

impl CompositeLifecycleStep {
	async fn run_steps(&self, monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
		for step in &self.steps {
			let step_name = step.name();
			trace!("About to start step '{}'...", step_name);
			monitor.start_progress(step_name.clone());

			match AssertUnwindSafe(step.execute(monitor)).catch_unwind().await {
				Ok(Ok(())) => monitor.finish_progress(),
				Ok(Err(e)) => return Err(e),
				Err(payload) => return Err(LifecycleError::from_panic(&step_name, payload)),
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::component::{LifecycleHooks, ManagedComponent};
	use std::sync::Mutex;

	/// Records the order in which hooks run, optionally failing one operation.
	struct Recording {
		name: &'static str,
		log: Arc<Mutex<Vec<String>>>,
		fail_on: Option<LifecycleOperation>,
	}

	impl Recording {
		fn record(&self, operation: LifecycleOperation) -> Result<(), LifecycleError> {
			self.log
				.lock()
				.unwrap()
				.push(format!("{}:{}", operation, self.name));
			if self.fail_on == Some(operation) {
				return Err(LifecycleError::failed(format!("{} failed", self.name)));
			}
			Ok(())
		}
	}

	#[async_trait]
	impl LifecycleHooks for Recording {
		async fn initialize(
			&self,
			_monitor: &mut LifecycleProgressMonitor,
		) -> Result<(), LifecycleError> {
			self.record(LifecycleOperation::Initialize)
		}

		async fn start(
			&self,
			_monitor: &mut LifecycleProgressMonitor,
		) -> Result<(), LifecycleError> {
			self.record(LifecycleOperation::Start)
		}

		async fn stop(&self, _monitor: &mut LifecycleProgressMonitor) -> Result<(), LifecycleError> {
			self.record(LifecycleOperation::Stop)
		}
	}

	fn component(
		name: &'static str,
		log: &Arc<Mutex<Vec<String>>>,
		fail_on: Option<LifecycleOperation>,
	) -> Arc<dyn LifecycleComponent> {
		Arc::new(ManagedComponent::new(
			name,
			Recording {
				name,
				log: log.clone(),
				fail_on,
			},
		))
	}

	struct Panicking;

	#[async_trait]
	impl LifecycleStep for Panicking {
		fn name(&self) -> String {
			"panicking".to_string()
		}

		async fn execute(
			&self,
			_monitor: &mut LifecycleProgressMonitor,
		) -> Result<(), LifecycleError> {
			panic!("step exploded")
		}
	}

	#[tokio::test]
	async fn test_steps_run_in_insertion_order() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut composite = CompositeLifecycleStep::new("Initialize engine");
		composite.add_initialize_step("engine", Some(component("a", &log, None)), true);
		composite.add_initialize_step("engine", Some(component("b", &log, None)), true);
		composite.add_initialize_step("engine", Some(component("c", &log, None)), true);

		let mut monitor = LifecycleProgressMonitor::new("test");
		composite.execute(&mut monitor).await.unwrap();

		assert_eq!(
			*log.lock().unwrap(),
			vec!["initialize:a", "initialize:b", "initialize:c"]
		);
		assert_eq!(monitor.completed_operations(), 3);
		assert_eq!(monitor.depth(), 0);
	}

	#[test]
	fn test_missing_components_are_skipped() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut composite = CompositeLifecycleStep::new("Start engine");
		composite.add_start_step("engine", None, true);
		composite.add_stop_step("engine", None);
		composite.add_terminate_step("engine", None);
		composite.add_initialize_step("engine", Some(component("a", &log, None)), true);

		assert_eq!(composite.len(), 1);
		assert_eq!(composite.operation_count(), 1);
	}

	#[tokio::test]
	async fn test_required_failure_aborts_remaining_steps() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut composite = CompositeLifecycleStep::new("Initialize engine");
		composite.add_initialize_step(
			"engine",
			Some(component("a", &log, Some(LifecycleOperation::Initialize))),
			true,
		);
		composite.add_initialize_step("engine", Some(component("b", &log, None)), true);

		let mut monitor = LifecycleProgressMonitor::new("test");
		let error = composite.execute(&mut monitor).await.unwrap_err();

		assert!(matches!(
			error,
			LifecycleError::Component {
				status: LifecycleStatus::InitializationError,
				operation: LifecycleOperation::Initialize,
				..
			}
		));
		assert!(error.to_string().contains("a failed"));
		assert_eq!(*log.lock().unwrap(), vec!["initialize:a"]);
		assert_eq!(monitor.depth(), 0);
	}

	#[tokio::test]
	async fn test_optional_failure_is_swallowed() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let optional = component("metrics", &log, Some(LifecycleOperation::Start));
		let mut composite = CompositeLifecycleStep::new("Start engine");
		composite.add_initialize_step("engine", Some(optional.clone()), false);
		composite.add_start_step("engine", Some(optional.clone()), false);
		composite.add_initialize_step("engine", Some(component("b", &log, None)), true);

		let mut monitor = LifecycleProgressMonitor::new("test");
		composite.execute(&mut monitor).await.unwrap();

		assert_eq!(optional.lifecycle_status(), LifecycleStatus::LifecycleError);
		assert_eq!(
			*log.lock().unwrap(),
			vec!["initialize:metrics", "start:metrics", "initialize:b"]
		);
	}

	#[tokio::test]
	async fn test_stop_failure_does_not_abort() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let a = component("a", &log, Some(LifecycleOperation::Stop));
		let b = component("b", &log, None);
		let mut monitor = LifecycleProgressMonitor::new("test");
		for c in [&a, &b] {
			c.lifecycle_initialize(&mut monitor).await;
			c.lifecycle_start(&mut monitor).await;
		}

		let mut composite = CompositeLifecycleStep::new("Stop engine");
		composite.add_stop_step("engine", Some(a.clone()));
		composite.add_stop_step("engine", Some(b.clone()));
		composite.execute(&mut monitor).await.unwrap();

		assert_eq!(a.lifecycle_status(), LifecycleStatus::LifecycleError);
		assert_eq!(b.lifecycle_status(), LifecycleStatus::Stopped);
	}

	#[tokio::test]
	async fn test_panicking_step_is_wrapped() {
		let mut composite = CompositeLifecycleStep::new("Start engine");
		composite.add_step(Box::new(Panicking));

		let mut monitor = LifecycleProgressMonitor::new("test");
		let error = composite.execute(&mut monitor).await.unwrap_err();
		match error {
			LifecycleError::Panicked { context, message } => {
				assert_eq!(context, "panicking");
				assert_eq!(message, "step exploded");
			}
			other => panic!("unexpected error: {other}"),
		}
	}

	#[tokio::test]
	async fn test_composites_nest() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut inner = CompositeLifecycleStep::new("Initialize storage");
		inner.add_initialize_step("storage", Some(component("db", &log, None)), true);

		let mut outer = CompositeLifecycleStep::new("Initialize engine");
		outer.add_step(Box::new(inner));
		outer.add_initialize_step("engine", Some(component("api", &log, None)), true);

		let mut monitor = LifecycleProgressMonitor::new("test");
		outer.execute(&mut monitor).await.unwrap();
		assert_eq!(*log.lock().unwrap(), vec!["initialize:db", "initialize:api"]);
		// One nested component plus the inner composite and the api step.
		assert_eq!(monitor.completed_operations(), 3);
	}
}

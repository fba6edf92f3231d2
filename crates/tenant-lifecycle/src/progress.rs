//! Progress reporting for nested lifecycle operations.

use tracing::debug;

/// One level of nested progress, e.g. "Initialize tenant engine" with three
/// nested component operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressContext {
	pub description: String,
	pub total: usize,
	pub completed: usize,
	/// Operation currently running within this context.
	pub current: Option<String>,
}

/// Tracks a stack of [`ProgressContext`]s while lifecycle steps execute.
///
/// The monitor is owned by whoever drives an operation and is passed down
/// by mutable reference, so no locking is involved.
#[derive(Debug)]
pub struct LifecycleProgressMonitor {
	name: String,
	contexts: Vec<ProgressContext>,
	completed_operations: usize,
}

impl LifecycleProgressMonitor {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			contexts: Vec::new(),
			completed_operations: 0,
		}
	}

	/// Creates a monitor with a single root context of `total` operations.
	pub fn with_context(
		name: impl Into<String>,
		total: usize,
		description: impl Into<String>,
	) -> Self {
		let mut monitor = Self::new(name);
		monitor.push_context(total, description);
		monitor
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn push_context(&mut self, total: usize, description: impl Into<String>) {
		let context = ProgressContext {
			description: description.into(),
			total,
			completed: 0,
			current: None,
		};
		debug!(
			"[{}] {} ({} operations)",
			self.name, context.description, context.total
		);
		self.contexts.push(context);
	}

	pub fn pop_context(&mut self) -> Option<ProgressContext> {
		self.contexts.pop()
	}

	pub fn start_progress(&mut self, operation: impl Into<String>) {
		let operation = operation.into();
		if let Some(context) = self.contexts.last_mut() {
			debug!(
				"[{}] {} {}/{}: {}",
				self.name,
				context.description,
				context.completed + 1,
				context.total,
				operation
			);
			context.current = Some(operation);
		}
	}

	pub fn finish_progress(&mut self) {
		if let Some(context) = self.contexts.last_mut() {
			context.completed += 1;
			context.current = None;
		}
		self.completed_operations += 1;
	}

	/// Closes the innermost context, reporting how far it got. An operation
	/// still in progress is logged as abandoned.
	pub fn finish_context(&mut self) -> Option<ProgressContext> {
		let context = self.contexts.pop()?;
		match &context.current {
			Some(operation) => debug!(
				"[{}] {} abandoned at {}/{}: {}",
				self.name,
				context.description,
				context.completed + 1,
				context.total,
				operation
			),
			None => debug!(
				"[{}] {} finished {}/{}",
				self.name, context.description, context.completed, context.total
			),
		}
		Some(context)
	}

	pub fn current_context(&self) -> Option<&ProgressContext> {
		self.contexts.last()
	}

	pub fn depth(&self) -> usize {
		self.contexts.len()
	}

	/// Operations finished across every context since creation.
	pub fn completed_operations(&self) -> usize {
		self.completed_operations
	}

	/// Descriptions of the open contexts joined outermost first.
	pub fn path(&self) -> String {
		self.contexts
			.iter()
			.map(|c| c.description.as_str())
			.collect::<Vec<_>>()
			.join(" > ")
	}

	/// Percent complete of the innermost context.
	pub fn percent_complete(&self) -> f64 {
		match self.contexts.last() {
			Some(c) if c.total > 0 => (c.completed as f64 / c.total as f64) * 100.0,
			_ => 0.0,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_nested_contexts() {
		let mut monitor = LifecycleProgressMonitor::with_context("acme", 1, "Start tenant engine");
		monitor.start_progress("Start nested components");
		monitor.push_context(2, "Start components");
		assert_eq!(monitor.depth(), 2);
		assert_eq!(monitor.path(), "Start tenant engine > Start components");

		monitor.start_progress("Start cache");
		assert_eq!(
			monitor.current_context().unwrap().current.as_deref(),
			Some("Start cache")
		);
		monitor.finish_progress();
		assert_eq!(monitor.percent_complete(), 50.0);

		let popped = monitor.pop_context().unwrap();
		assert_eq!(popped.completed, 1);
		monitor.finish_progress();

		assert_eq!(monitor.depth(), 1);
		assert_eq!(monitor.percent_complete(), 100.0);
		assert_eq!(monitor.completed_operations(), 2);
	}

	#[test]
	fn test_finish_context_keeps_abandoned_operation() {
		let mut monitor = LifecycleProgressMonitor::with_context("acme", 2, "Start tenant engine");
		monitor.start_progress("Initialize tenant engine");
		monitor.finish_progress();
		monitor.start_progress("Start tenant engine");

		let closed = monitor.finish_context().unwrap();
		assert_eq!(closed.completed, 1);
		assert_eq!(closed.current.as_deref(), Some("Start tenant engine"));
		assert_eq!(monitor.depth(), 0);
		assert!(monitor.finish_context().is_none());
	}

	#[test]
	fn test_progress_without_context_is_counted() {
		let mut monitor = LifecycleProgressMonitor::new("orphan");
		monitor.start_progress("op");
		monitor.finish_progress();
		assert_eq!(monitor.completed_operations(), 1);
		assert_eq!(monitor.percent_complete(), 0.0);
		assert_eq!(monitor.path(), "");
	}
}

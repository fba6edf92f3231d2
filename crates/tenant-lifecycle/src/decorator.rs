//! Tenant-scoped execution of lifecycle operations.

use crate::component::LifecycleComponent;
use crate::error::LifecycleError;
use crate::progress::LifecycleProgressMonitor;
use async_trait::async_trait;
use std::sync::Arc;
use tenant_types::{LifecycleStatus, TenantToken};
use tracing::{info_span, Instrument};

/// Wraps a component so every lifecycle operation runs inside a span that
/// carries the owning tenant's token. Log lines emitted by nested
/// components are attributed to the tenant without threading it through.
pub struct TenantScopedComponent<C> {
	tenant: TenantToken,
	delegate: C,
}

impl<C: LifecycleComponent> TenantScopedComponent<C> {
	pub fn new(tenant: TenantToken, delegate: C) -> Self {
		Self { tenant, delegate }
	}

	pub fn tenant(&self) -> &TenantToken {
		&self.tenant
	}

	pub fn delegate(&self) -> &C {
		&self.delegate
	}

	pub fn into_inner(self) -> C {
		self.delegate
	}
}

#[async_trait]
impl<C: LifecycleComponent> LifecycleComponent for TenantScopedComponent<C> {
	fn component_name(&self) -> String {
		self.delegate.component_name()
	}

	fn lifecycle_status(&self) -> LifecycleStatus {
		self.delegate.lifecycle_status()
	}

	fn lifecycle_error(&self) -> Option<Arc<LifecycleError>> {
		self.delegate.lifecycle_error()
	}

	async fn lifecycle_initialize(&self, monitor: &mut LifecycleProgressMonitor) {
		let span = info_span!("initialize", tenant = %self.tenant);
		self.delegate
			.lifecycle_initialize(monitor)
			.instrument(span)
			.await
	}

	async fn lifecycle_start(&self, monitor: &mut LifecycleProgressMonitor) {
		let span = info_span!("start", tenant = %self.tenant);
		self.delegate.lifecycle_start(monitor).instrument(span).await
	}

	async fn lifecycle_stop(&self, monitor: &mut LifecycleProgressMonitor) {
		let span = info_span!("stop", tenant = %self.tenant);
		self.delegate.lifecycle_stop(monitor).instrument(span).await
	}

	async fn lifecycle_terminate(&self, monitor: &mut LifecycleProgressMonitor) {
		let span = info_span!("terminate", tenant = %self.tenant);
		self.delegate
			.lifecycle_terminate(monitor)
			.instrument(span)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::component::{LifecycleHooks, ManagedComponent};

	struct Noop;

	impl LifecycleHooks for Noop {}

	#[tokio::test]
	async fn test_scoped_component_delegates() {
		let tenant = TenantToken::new("acme").unwrap();
		let scoped = TenantScopedComponent::new(tenant.clone(), ManagedComponent::new("rest", Noop));
		let mut monitor = LifecycleProgressMonitor::new("acme");

		scoped.lifecycle_initialize(&mut monitor).await;
		scoped.lifecycle_start(&mut monitor).await;
		assert_eq!(scoped.lifecycle_status(), LifecycleStatus::Started);
		assert_eq!(scoped.delegate().lifecycle_status(), LifecycleStatus::Started);
		assert_eq!(scoped.component_name(), "rest");
		assert_eq!(scoped.tenant(), &tenant);

		scoped.lifecycle_stop(&mut monitor).await;
		scoped.lifecycle_terminate(&mut monitor).await;
		assert_eq!(scoped.into_inner().lifecycle_status(), LifecycleStatus::Terminated);
	}
}

//! Tenant-scoped access to engines for request-handling code.

use crate::availability::TenantEngineNotAvailable;
use crate::engine::TenantEngineFactory;
use crate::error::CoreError;
use crate::manager::TenantEngineManager;
use std::future::Future;
use std::sync::Arc;
use tenant_types::TenantToken;
use tracing::{info_span, Instrument};

/// Resolves which tenant's engine should serve a call.
///
/// Lookups never wait for an engine to become ready; callers that need one
/// retry on [`UnavailableReason::NotStarted`](crate::UnavailableReason).
pub struct TenantEngineProvider<F: TenantEngineFactory> {
	manager: TenantEngineManager<F>,
}

impl<F: TenantEngineFactory> Clone for TenantEngineProvider<F> {
	fn clone(&self) -> Self {
		Self {
			manager: self.manager.clone(),
		}
	}
}

impl<F: TenantEngineFactory> TenantEngineProvider<F> {
	pub fn new(manager: TenantEngineManager<F>) -> Self {
		Self { manager }
	}

	pub fn get_tenant_engine_by_token(&self, token: &TenantToken) -> Option<Arc<F::Engine>> {
		self.manager.lookup(token)
	}

	pub fn assure_tenant_engine_available(
		&self,
		token: &TenantToken,
	) -> Result<Arc<F::Engine>, TenantEngineNotAvailable> {
		self.manager.assure_available(token)
	}

	/// Runs `callback` against the started engine of `token`, inside a span
	/// carrying the tenant.
	pub async fn execute_in_tenant_engine<C, Fut, R>(
		&self,
		token: &TenantToken,
		callback: C,
	) -> Result<R, CoreError>
	where
		C: FnOnce(Arc<F::Engine>) -> Fut,
		Fut: Future<Output = R>,
	{
		let engine = self.manager.assure_available(token)?;
		let span = info_span!("tenant", tenant = %token);
		Ok(callback(engine).instrument(span).await)
	}
}

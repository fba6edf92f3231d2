//! The tenant engine lifecycle orchestrator.
//!
//! Resource events are turned into requests on two queues, one for
//! initialization and one for shutdown. A dedicated drain loop per queue
//! claims each request and hands the per-engine work to a task holding a
//! permit from a shared semaphore, so at most `max_concurrent_operations`
//! engines start or stop at any instant across both queues.
//!
//! Every tenant token lives in one of four maps while the orchestrator knows
//! about it: `initializing` and `stopping` while a task is working on it,
//! `ready` once its engine is started and `failed` when initialize or start
//! left it in an error status.

use crate::availability::{TenantEngineNotAvailable, UnavailableReason};
use crate::control_plane::ControlPlaneClient;
use crate::engine::{TenantEngine, TenantEngineFactory};
use crate::error::CoreError;
use crate::listener::TenantEngineConfigurationListener;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tenant_config::OrchestratorConfig;
use tenant_lifecycle::{LifecycleComponent, LifecycleOperation, LifecycleProgressMonitor};
use tenant_types::{
	LifecycleStatus, TenantEngineResource, TenantEngineSpecUpdates, TenantEngineStatus, TenantToken,
};
use tokio::sync::{broadcast, mpsc, Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Point-in-time view of the tracking maps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManagerSnapshot {
	pub initializing: Vec<TenantToken>,
	pub ready: Vec<TenantToken>,
	pub failed: Vec<TenantToken>,
	pub stopping: Vec<TenantToken>,
	pub max_concurrent_operations: usize,
	/// Operations that could start right now without waiting
	pub available_permits: usize,
}

enum InitializationClaim {
	Granted,
	/// Another task is already initializing the token
	Duplicate,
	/// The token has an engine in `ready` or `failed`
	Tracked,
	/// The token is being stopped; retry later
	Deferred,
	/// The manager is shutting down
	Closing,
}

enum ShutdownClaim<E> {
	Granted(Arc<E>),
	/// Another task is already stopping the token
	Duplicate,
	/// The token is being initialized; retry later
	Deferred,
	NotTracked,
}

#[derive(Clone, Copy)]
enum Queue {
	Initialization,
	Shutdown,
}

struct Shared<F: TenantEngineFactory> {
	config: OrchestratorConfig,
	factory: F,
	control_plane: Arc<dyn ControlPlaneClient>,

	initializing: DashMap<TenantToken, TenantEngineResource>,
	ready: DashMap<TenantToken, Arc<F::Engine>>,
	failed: DashMap<TenantToken, Arc<F::Engine>>,
	stopping: DashMap<TenantToken, TenantEngineResource>,

	init_tx: mpsc::UnboundedSender<TenantEngineResource>,
	init_rx: Mutex<Option<mpsc::UnboundedReceiver<TenantEngineResource>>>,
	stop_tx: mpsc::UnboundedSender<TenantEngineResource>,
	stop_rx: Mutex<Option<mpsc::UnboundedReceiver<TenantEngineResource>>>,

	/// Bounds start/stop work across both queues
	permits: Arc<Semaphore>,
	/// Held only while checking and claiming a token
	gate: Mutex<()>,
	/// Signalled whenever a per-engine task finishes
	idle: Notify,
	/// Initialization requests taken off the queue but not yet claimed
	pending: AtomicUsize,
	closing: AtomicBool,
	shutdown_tx: broadcast::Sender<()>,
	tasks: Mutex<JoinSet<()>>,
}

/// Orchestrates the lifecycle of one engine per tenant.
///
/// Cloning is cheap and every clone drives the same maps and queues.
pub struct TenantEngineManager<F: TenantEngineFactory> {
	inner: Arc<Shared<F>>,
}

impl<F: TenantEngineFactory> Clone for TenantEngineManager<F> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<F: TenantEngineFactory> TenantEngineManager<F> {
	pub fn new(
		config: OrchestratorConfig,
		factory: F,
		control_plane: Arc<dyn ControlPlaneClient>,
	) -> Self {
		let (init_tx, init_rx) = mpsc::unbounded_channel();
		let (stop_tx, stop_rx) = mpsc::unbounded_channel();
		let (shutdown_tx, _) = broadcast::channel(16);
		let permits = Arc::new(Semaphore::new(config.max_concurrent_operations.max(1)));

		Self {
			inner: Arc::new(Shared {
				config,
				factory,
				control_plane,
				initializing: DashMap::new(),
				ready: DashMap::new(),
				failed: DashMap::new(),
				stopping: DashMap::new(),
				init_tx,
				init_rx: Mutex::new(Some(init_rx)),
				stop_tx,
				stop_rx: Mutex::new(Some(stop_rx)),
				permits,
				gate: Mutex::new(()),
				idle: Notify::new(),
				pending: AtomicUsize::new(0),
				closing: AtomicBool::new(false),
				shutdown_tx,
				tasks: Mutex::new(JoinSet::new()),
			}),
		}
	}

	pub fn config(&self) -> &OrchestratorConfig {
		&self.inner.config
	}

	/// Starts both queue drain loops and, when configured, enqueues every
	/// engine the control plane already knows about.
	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<(), CoreError> {
		let init_rx = self.inner.init_rx.lock().await.take();
		let stop_rx = self.inner.stop_rx.lock().await.take();
		let (Some(init_rx), Some(stop_rx)) = (init_rx, stop_rx) else {
			return Err(CoreError::Channel(
				"Tenant engine manager already started".to_string(),
			));
		};

		let mut tasks = self.inner.tasks.lock().await;
		let manager = self.clone();
		let shutdown_rx = self.inner.shutdown_tx.subscribe();
		tasks.spawn(async move { manager.drain_initialization_queue(init_rx, shutdown_rx).await });

		let manager = self.clone();
		let shutdown_rx = self.inner.shutdown_tx.subscribe();
		tasks.spawn(async move { manager.drain_shutdown_queue(stop_rx, shutdown_rx).await });
		drop(tasks);

		info!(
			"Tenant engine manager started with {} workers",
			self.inner.config.max_concurrent_operations
		);

		if self.inner.config.bootstrap_existing {
			self.bootstrap().await;
		}
		Ok(())
	}

	async fn bootstrap(&self) {
		match self.inner.control_plane.list_tenant_engines().await {
			Ok(resources) => {
				info!("Bootstrapping {} existing tenant engines", resources.len());
				for resource in resources {
					self.enqueue_initialization(resource);
				}
			}
			Err(e) => warn!("Unable to list existing tenant engines: {}", e),
		}
	}

	/// Stops every engine and the drain loops.
	///
	/// New initialization requests are dropped from here on. Operations
	/// already running are allowed to finish; callers bound the wait.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		info!("Shutting down tenant engine manager");
		self.inner.closing.store(true, Ordering::SeqCst);

		let scheduled = self.remove_all();
		let failed: Vec<TenantToken> = self.inner.failed.iter().map(|e| e.key().clone()).collect();
		for token in &failed {
			self.remove(token);
		}
		debug!(
			"Scheduled shutdown of {} ready and {} failed engines",
			scheduled,
			failed.len()
		);

		self.wait_until_idle().await;

		let _ = self.inner.shutdown_tx.send(());
		let mut tasks = self.inner.tasks.lock().await;
		while let Some(result) = tasks.join_next().await {
			if let Err(e) = result {
				error!("Queue drain loop ended abnormally: {}", e);
			}
		}

		info!("Tenant engine manager shutdown complete");
		Ok(())
	}

	async fn wait_until_idle(&self) {
		loop {
			let notified = self.inner.idle.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();
			if self.is_idle() {
				return;
			}
			notified.await;
		}
	}

	fn is_idle(&self) -> bool {
		self.inner.pending.load(Ordering::SeqCst) == 0
			&& self.inner.initializing.is_empty()
			&& self.inner.stopping.is_empty()
			&& self.inner.ready.is_empty()
			&& self.inner.failed.is_empty()
	}

	/// Queues a resource for initialization.
	pub fn enqueue_initialization(&self, resource: TenantEngineResource) {
		if self.inner.init_tx.send(resource).is_err() {
			warn!("Initialization queue is closed");
		}
	}

	/// Queues a resource for shutdown.
	pub fn enqueue_shutdown(&self, resource: TenantEngineResource) {
		if self.inner.stop_tx.send(resource).is_err() {
			warn!("Shutdown queue is closed");
		}
	}

	fn requeue(&self, queue: Queue, resource: TenantEngineResource) {
		let delay = self.inner.config.requeue_delay();
		let manager = self.clone();
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			match queue {
				Queue::Initialization => manager.enqueue_initialization(resource),
				Queue::Shutdown => manager.enqueue_shutdown(resource),
			}
		});
	}

	async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
		match self.inner.permits.clone().acquire_owned().await {
			Ok(permit) => Some(permit),
			Err(e) => {
				error!("Worker pool is closed: {}", e);
				None
			}
		}
	}

	// Initialization

	async fn drain_initialization_queue(
		self,
		mut requests: mpsc::UnboundedReceiver<TenantEngineResource>,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		loop {
			tokio::select! {
				Some(resource) = requests.recv() => {
					self.handle_initialization_request(resource).await;
				}
				_ = shutdown_rx.recv() => {
					info!("Initialization queue received shutdown signal");
					break;
				}
			}
		}
	}

	async fn handle_initialization_request(&self, resource: TenantEngineResource) {
		let token = match resource.tenant_token() {
			Ok(token) => token,
			Err(e) => {
				error!("Dropping initialization request: {}", e);
				return;
			}
		};

		let pending = PendingRequest::enter(&self.inner.pending, &self.inner.idle);
		if self.inner.closing.load(Ordering::SeqCst) {
			warn!("Ignoring initialization of '{}' during shutdown", token);
			return;
		}

		let Some(permit) = self.acquire_permit().await else {
			return;
		};

		let claim = self.claim_initialization(&token, &resource).await;
		drop(pending);
		match claim {
			InitializationClaim::Granted => {}
			InitializationClaim::Closing => {
				warn!("Ignoring initialization of '{}' during shutdown", token);
				return;
			}
			InitializationClaim::Duplicate => {
				debug!("Tenant engine '{}' is already initializing", token);
				return;
			}
			InitializationClaim::Tracked => {
				debug!("Tenant engine '{}' already exists, nothing to do", token);
				return;
			}
			InitializationClaim::Deferred => {
				debug!("Tenant engine '{}' is stopping, requeueing initialization", token);
				self.requeue(Queue::Initialization, resource);
				return;
			}
		}

		let manager = self.clone();
		tokio::spawn(async move {
			let _permit = permit;
			manager.initialize_tenant_engine(token, resource).await;
			manager.inner.idle.notify_waiters();
		});
	}

	async fn claim_initialization(
		&self,
		token: &TenantToken,
		resource: &TenantEngineResource,
	) -> InitializationClaim {
		let _gate = self.inner.gate.lock().await;
		if self.inner.closing.load(Ordering::SeqCst) {
			return InitializationClaim::Closing;
		}
		if self.inner.initializing.contains_key(token) {
			return InitializationClaim::Duplicate;
		}
		if self.inner.stopping.contains_key(token) {
			return InitializationClaim::Deferred;
		}
		if self.inner.ready.contains_key(token) || self.inner.failed.contains_key(token) {
			return InitializationClaim::Tracked;
		}
		self.inner
			.initializing
			.insert(token.clone(), resource.clone());
		InitializationClaim::Granted
	}

	#[instrument(skip(self, token, resource), fields(tenant = %token))]
	async fn initialize_tenant_engine(&self, token: TenantToken, resource: TenantEngineResource) {
		let outcome = AssertUnwindSafe(self.run_start_sequence(&token, resource))
			.catch_unwind()
			.await;
		if outcome.is_err() {
			error!("Start sequence of tenant engine '{}' panicked", token);
		}
		self.inner.initializing.remove(&token);

		if self.inner.closing.load(Ordering::SeqCst) {
			self.remove(&token);
		}
	}

	async fn run_start_sequence(&self, token: &TenantToken, queued: TenantEngineResource) {
		let Some(resource) = self.latest_resource(token, queued).await else {
			info!("Tenant engine '{}' was deleted before it could start", token);
			return;
		};

		let engine = match self.inner.factory.create_tenant_engine(&resource).await {
			Ok(engine) => engine,
			Err(e) => {
				error!("Unable to create tenant engine '{}': {}", token, e);
				self.write_status(
					token,
					LifecycleStatus::InitializationError,
					Some(e.to_string()),
				)
				.await;
				return;
			}
		};

		let mut monitor =
			LifecycleProgressMonitor::with_context(token.as_str(), 2, "Start tenant engine");
		if let Err(operation) = bring_up(engine.as_ref(), &mut monitor).await {
			self.mark_failed(token, engine, operation).await;
			return;
		}

		self.inner.failed.remove(token);
		self.inner.ready.insert(token.clone(), engine.clone());
		info!("Tenant engine '{}' is ready", token);
		self.write_status(token, LifecycleStatus::Started, None).await;
	}

	async fn mark_failed(
		&self,
		token: &TenantToken,
		engine: Arc<F::Engine>,
		operation: LifecycleOperation,
	) {
		let status = engine.lifecycle_status();
		let message = engine.lifecycle_error().map(|e| e.to_string());
		error!(
			"Tenant engine '{}' failed to {} ({}): {}",
			token,
			operation,
			status,
			message.as_deref().unwrap_or("no error recorded")
		);
		self.inner.ready.remove(token);
		self.inner.failed.insert(token.clone(), engine);
		self.write_status(token, status, message).await;
	}

	/// Latest version of the resource, `None` once it has been deleted.
	async fn latest_resource(
		&self,
		token: &TenantToken,
		queued: TenantEngineResource,
	) -> Option<TenantEngineResource> {
		match self.inner.control_plane.get_tenant_engine(token).await {
			Ok(latest) => latest,
			Err(e) => {
				warn!(
					"Unable to refresh tenant engine '{}', using queued version: {}",
					token, e
				);
				Some(queued)
			}
		}
	}

	// Shutdown

	async fn drain_shutdown_queue(
		self,
		mut requests: mpsc::UnboundedReceiver<TenantEngineResource>,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		loop {
			tokio::select! {
				Some(resource) = requests.recv() => {
					self.handle_shutdown_request(resource).await;
				}
				_ = shutdown_rx.recv() => {
					info!("Shutdown queue received shutdown signal");
					break;
				}
			}
		}
	}

	async fn handle_shutdown_request(&self, resource: TenantEngineResource) {
		let token = match resource.tenant_token() {
			Ok(token) => token,
			Err(e) => {
				error!("Dropping shutdown request: {}", e);
				return;
			}
		};

		let Some(permit) = self.acquire_permit().await else {
			return;
		};

		let engine = match self.claim_shutdown(&token, &resource).await {
			ShutdownClaim::Granted(engine) => engine,
			ShutdownClaim::Duplicate => {
				debug!("Tenant engine '{}' is already stopping", token);
				return;
			}
			ShutdownClaim::Deferred => {
				debug!("Tenant engine '{}' is initializing, requeueing shutdown", token);
				self.requeue(Queue::Shutdown, resource);
				return;
			}
			ShutdownClaim::NotTracked => {
				debug!("No tenant engine running for '{}'", token);
				return;
			}
		};

		let manager = self.clone();
		tokio::spawn(async move {
			let _permit = permit;
			manager.stop_tenant_engine(token, engine).await;
			manager.inner.idle.notify_waiters();
		});
	}

	async fn claim_shutdown(
		&self,
		token: &TenantToken,
		resource: &TenantEngineResource,
	) -> ShutdownClaim<F::Engine> {
		let _gate = self.inner.gate.lock().await;
		if self.inner.stopping.contains_key(token) {
			return ShutdownClaim::Duplicate;
		}
		if self.inner.initializing.contains_key(token) {
			return ShutdownClaim::Deferred;
		}
		let engine = match self.inner.ready.remove(token) {
			Some((_, engine)) => engine,
			None => match self.inner.failed.remove(token) {
				Some((_, engine)) => engine,
				None => return ShutdownClaim::NotTracked,
			},
		};
		self.inner.stopping.insert(token.clone(), resource.clone());
		ShutdownClaim::Granted(engine)
	}

	#[instrument(skip(self, token, engine), fields(tenant = %token))]
	async fn stop_tenant_engine(&self, token: TenantToken, engine: Arc<F::Engine>) {
		let outcome = AssertUnwindSafe(self.run_stop_sequence(&token, engine))
			.catch_unwind()
			.await;
		if outcome.is_err() {
			error!("Stop sequence of tenant engine '{}' panicked", token);
		}
		self.inner.stopping.remove(&token);
	}

	async fn run_stop_sequence(&self, token: &TenantToken, engine: Arc<F::Engine>) {
		let mut monitor =
			LifecycleProgressMonitor::with_context(token.as_str(), 2, "Stop tenant engine");

		monitor.start_progress("Stop tenant engine");
		engine.lifecycle_stop(&mut monitor).await;
		if engine.lifecycle_status() == LifecycleStatus::LifecycleError {
			warn!(
				"Tenant engine '{}' failed to stop cleanly: {}",
				token,
				describe_error(engine.as_ref())
			);
		}
		monitor.finish_progress();

		monitor.start_progress("Terminate tenant engine");
		engine.lifecycle_terminate(&mut monitor).await;
		let status = engine.lifecycle_status();
		if status != LifecycleStatus::Terminated {
			warn!(
				"Tenant engine '{}' did not terminate ({}): {}",
				token,
				status,
				describe_error(engine.as_ref())
			);
		}
		monitor.finish_progress();
		monitor.finish_context();

		info!("Tenant engine '{}' stopped", token);
		let message = engine.lifecycle_error().map(|e| e.to_string());
		self.write_status(token, status, message).await;
	}

	async fn write_status(
		&self,
		token: &TenantToken,
		status: LifecycleStatus,
		error: Option<String>,
	) {
		let status = TenantEngineStatus::new(status, error);
		if let Err(e) = self
			.inner
			.control_plane
			.update_tenant_engine_status(token, status)
			.await
		{
			warn!("Unable to write status of tenant engine '{}': {}", token, e);
		}
	}

	// Requests

	/// Stops the engine of `token` and initializes it again from the latest
	/// resource. When no engine exists the resource is simply enqueued.
	///
	/// Returns once the restart is scheduled.
	pub async fn restart(&self, token: &TenantToken) -> Result<(), CoreError> {
		if !self.is_tracked(token) {
			let Some(resource) = self.inner.control_plane.get_tenant_engine(token).await? else {
				return Err(TenantEngineNotAvailable::not_found(token.clone()).into());
			};
			info!("No engine for '{}', enqueueing initialization", token);
			self.enqueue_initialization(resource);
			return Ok(());
		}

		let manager = self.clone();
		let token = token.clone();
		tokio::spawn(async move {
			manager.restart_tenant_engine(token).await;
			manager.inner.idle.notify_waiters();
		});
		Ok(())
	}

	#[instrument(skip(self, token), fields(tenant = %token))]
	async fn restart_tenant_engine(&self, token: TenantToken) {
		let fallback = loop {
			let Some(permit) = self.acquire_permit().await else {
				return;
			};
			let resource = match self.tracked_resource(&token) {
				Some(resource) => resource,
				None => break None,
			};
			match self.claim_shutdown(&token, &resource).await {
				ShutdownClaim::Granted(engine) => {
					info!("Restarting tenant engine '{}'", token);
					self.stop_tenant_engine(token.clone(), engine).await;
					drop(permit);
					break Some(resource);
				}
				ShutdownClaim::NotTracked => break None,
				ShutdownClaim::Duplicate | ShutdownClaim::Deferred => {
					drop(permit);
					debug!("Tenant engine '{}' is busy, delaying restart", token);
					tokio::time::sleep(self.inner.config.requeue_delay()).await;
				}
			}
		};

		let latest = match self.inner.control_plane.get_tenant_engine(&token).await {
			Ok(latest) => latest,
			Err(e) => {
				warn!("Unable to refresh tenant engine '{}': {}", token, e);
				fallback
			}
		};
		match latest {
			Some(resource) => self.enqueue_initialization(resource),
			None => info!("Tenant engine '{}' no longer exists, not restarting", token),
		}
	}

	/// Restarts every ready engine.
	pub async fn restart_all(&self) -> usize {
		let tokens: Vec<TenantToken> = self.inner.ready.iter().map(|e| e.key().clone()).collect();
		let mut restarted = 0;
		for token in &tokens {
			match self.restart(token).await {
				Ok(()) => restarted += 1,
				Err(e) => warn!("Unable to restart tenant engine '{}': {}", token, e),
			}
		}
		restarted
	}

	/// Schedules shutdown of the engine for `token`, whether it is ready,
	/// failed or still initializing. Returns `false` for unknown tokens.
	pub fn remove(&self, token: &TenantToken) -> bool {
		match self.tracked_resource(token) {
			Some(resource) => {
				self.enqueue_shutdown(resource);
				true
			}
			None => {
				debug!("No tenant engine to remove for '{}'", token);
				false
			}
		}
	}

	/// Schedules shutdown of every ready engine. Returns how many were
	/// scheduled.
	pub fn remove_all(&self) -> usize {
		let resources: Vec<TenantEngineResource> = self
			.inner
			.ready
			.iter()
			.map(|e| e.value().resource().clone())
			.collect();
		let count = resources.len();
		for resource in resources {
			self.enqueue_shutdown(resource);
		}
		count
	}

	fn is_tracked(&self, token: &TenantToken) -> bool {
		self.tracked_resource(token).is_some()
	}

	fn tracked_resource(&self, token: &TenantToken) -> Option<TenantEngineResource> {
		if let Some(engine) = self.inner.ready.get(token) {
			return Some(engine.resource().clone());
		}
		if let Some(engine) = self.inner.failed.get(token) {
			return Some(engine.resource().clone());
		}
		if let Some(resource) = self.inner.initializing.get(token) {
			return Some(resource.clone());
		}
		self.inner.stopping.get(token).map(|r| r.clone())
	}

	// Queries

	/// Engine for `token` if it is ready or failed. Never blocks.
	pub fn lookup(&self, token: &TenantToken) -> Option<Arc<F::Engine>> {
		if let Some(engine) = self.inner.ready.get(token) {
			return Some(engine.clone());
		}
		self.inner.failed.get(token).map(|e| e.clone())
	}

	/// Engine for `token` only if it is started.
	pub fn assure_available(
		&self,
		token: &TenantToken,
	) -> Result<Arc<F::Engine>, TenantEngineNotAvailable> {
		let Some(engine) = self.lookup(token) else {
			let status = if self.inner.initializing.contains_key(token) {
				Some(LifecycleStatus::Initializing)
			} else if self.inner.stopping.contains_key(token) {
				Some(LifecycleStatus::Stopping)
			} else {
				None
			};
			return Err(match status {
				Some(status) => TenantEngineNotAvailable {
					token: token.clone(),
					reason: UnavailableReason::NotStarted,
					status: Some(status),
				},
				None => TenantEngineNotAvailable::not_found(token.clone()),
			});
		};

		let status = engine.lifecycle_status();
		match UnavailableReason::from_status(status) {
			None => Ok(engine),
			Some(reason) => Err(TenantEngineNotAvailable {
				token: token.clone(),
				reason,
				status: Some(status),
			}),
		}
	}

	pub fn snapshot(&self) -> ManagerSnapshot {
		ManagerSnapshot {
			initializing: sorted_keys(&self.inner.initializing),
			ready: sorted_keys(&self.inner.ready),
			failed: sorted_keys(&self.inner.failed),
			stopping: sorted_keys(&self.inner.stopping),
			max_concurrent_operations: self.inner.config.max_concurrent_operations,
			available_permits: self.inner.permits.available_permits(),
		}
	}
}

fn sorted_keys<V>(map: &DashMap<TenantToken, V>) -> Vec<TenantToken> {
	let mut keys: Vec<TenantToken> = map.iter().map(|e| e.key().clone()).collect();
	keys.sort();
	keys
}

/// Initializes then starts `engine`, returning the operation that left it
/// in an unexpected status. The root progress context is closed either way.
async fn bring_up<E: LifecycleComponent + ?Sized>(
	engine: &E,
	monitor: &mut LifecycleProgressMonitor,
) -> Result<(), LifecycleOperation> {
	let outcome = async {
		monitor.start_progress("Initialize tenant engine");
		engine.lifecycle_initialize(monitor).await;
		if engine.lifecycle_status() != LifecycleStatus::Stopped {
			return Err(LifecycleOperation::Initialize);
		}
		monitor.finish_progress();

		monitor.start_progress("Start tenant engine");
		engine.lifecycle_start(monitor).await;
		if engine.lifecycle_status() != LifecycleStatus::Started {
			return Err(LifecycleOperation::Start);
		}
		monitor.finish_progress();
		Ok(())
	}
	.await;
	monitor.finish_context();
	outcome
}

/// Marks an initialization request as in flight until dropped.
struct PendingRequest<'a> {
	count: &'a AtomicUsize,
	idle: &'a Notify,
}

impl<'a> PendingRequest<'a> {
	fn enter(count: &'a AtomicUsize, idle: &'a Notify) -> Self {
		count.fetch_add(1, Ordering::SeqCst);
		Self { count, idle }
	}
}

impl Drop for PendingRequest<'_> {
	fn drop(&mut self) {
		self.count.fetch_sub(1, Ordering::SeqCst);
		self.idle.notify_waiters();
	}
}

fn describe_error<E: LifecycleComponent + ?Sized>(engine: &E) -> String {
	engine
		.lifecycle_error()
		.map(|e| e.to_string())
		.unwrap_or_else(|| "no error recorded".to_string())
}

#[async_trait]
impl<F: TenantEngineFactory> TenantEngineConfigurationListener for TenantEngineManager<F> {
	async fn on_tenant_engine_created(&self, resource: TenantEngineResource) {
		debug!("Tenant engine '{}' created", resource.name());
		self.enqueue_initialization(resource);
	}

	async fn on_tenant_engine_updated(
		&self,
		resource: TenantEngineResource,
		updates: TenantEngineSpecUpdates,
	) {
		if !updates.configuration_updated {
			debug!(
				"Tenant engine '{}' updated without configuration changes",
				resource.name()
			);
			return;
		}

		match resource.tenant_token() {
			Ok(token) => {
				if let Err(e) = self.restart(&token).await {
					warn!("Unable to restart tenant engine '{}': {}", token, e);
				}
			}
			Err(e) => error!("Ignoring update: {}", e),
		}
	}

	async fn on_tenant_engine_deleted(&self, resource: TenantEngineResource) {
		debug!("Tenant engine '{}' deleted", resource.name());
		self.enqueue_shutdown(resource);
	}

	/// Starts listed engines that are not tracked, restarts tracked engines
	/// whose spec changed and removes tracked engines that are no longer
	/// listed.
	async fn on_tenant_engines_resynced(&self, resources: Vec<TenantEngineResource>) {
		let mut listed = HashSet::new();
		for resource in resources {
			let token = match resource.tenant_token() {
				Ok(token) => token,
				Err(e) => {
					warn!("Skipping resource during resync: {}", e);
					continue;
				}
			};
			listed.insert(token.clone());

			let changed = match self.lookup(&token) {
				Some(engine) => engine.resource().spec != resource.spec,
				None => {
					if !self.is_tracked(&token) {
						self.enqueue_initialization(resource);
					}
					continue;
				}
			};
			if changed {
				if let Err(e) = self.restart(&token).await {
					warn!("Unable to restart tenant engine '{}': {}", token, e);
				}
			}
		}

		let stale: Vec<TenantToken> = self
			.inner
			.ready
			.iter()
			.chain(self.inner.failed.iter())
			.map(|e| e.key().clone())
			.filter(|token| !listed.contains(token))
			.collect();
		for token in &stale {
			info!("Tenant engine '{}' no longer exists, removing", token);
			self.remove(token);
		}
		debug!("Resynced {} listed and {} stale tenant engines", listed.len(), stale.len());
	}
}

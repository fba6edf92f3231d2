//! Tenant engine lifecycle orchestration.
//!
//! [`TenantEngineManager`] keeps one engine per tenant running inside a
//! microservice. It consumes tenant engine resource changes through
//! [`TenantEngineConfigurationListener`], builds engines with a
//! [`TenantEngineFactory`] and answers availability queries for
//! request-handling code through [`TenantEngineProvider`].

pub mod availability;
pub mod control_plane;
pub mod engine;
pub mod error;
pub mod listener;
pub mod manager;
pub mod provider;

pub use availability::{TenantEngineNotAvailable, UnavailableReason};
pub use control_plane::{ControlPlaneClient, InMemoryControlPlane};
pub use engine::{ComposedTenantEngine, ComposedTenantEngineBuilder, TenantEngine, TenantEngineFactory};
pub use error::CoreError;
pub use listener::{ResourceWatcher, TenantEngineConfigurationListener};
pub use manager::{ManagerSnapshot, TenantEngineManager};
pub use provider::TenantEngineProvider;

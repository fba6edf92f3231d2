//! Lifecycle state machine and declarative lifecycle sequencing.
//!
//! Every long-lived unit in a tenant engine, including the engine itself,
//! implements [`LifecycleComponent`]. Operations record failures in the
//! component's status instead of returning them, and a
//! [`CompositeLifecycleStep`] strings nested component operations together.

pub mod component;
pub mod decorator;
pub mod error;
pub mod progress;
pub mod state;
pub mod step;

pub use component::{LifecycleComponent, LifecycleHooks, ManagedComponent};
pub use decorator::TenantScopedComponent;
pub use error::{LifecycleError, LifecycleOperation};
pub use progress::{LifecycleProgressMonitor, ProgressContext};
pub use state::LifecycleState;
pub use step::{ComponentLifecycleStep, CompositeLifecycleStep, LifecycleStep};

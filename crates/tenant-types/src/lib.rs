//! Shared data model for the tenant engine orchestrator.
//!
//! Resource descriptors are owned by the cluster control plane; the types in
//! this crate are the in-process view of them that every other crate in the
//! workspace passes around.

pub mod errors;
pub mod events;
pub mod resource;

pub use errors::*;
pub use events::*;
pub use resource::*;

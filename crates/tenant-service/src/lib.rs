//! Tenant engine service.
//!
//! Runs one engine per tenant for a microservice: loads the configuration,
//! registers the configured tenants with an in-process control plane, drives
//! their engines through the orchestrator and serves a status API.
//!
//! # Components
//!
//! - `api`: status endpoints for operational tooling
//! - `cli`: command-line interface
//! - `factory`: builds engines from the component list in each resource
//! - `service`: wiring and graceful shutdown

pub mod api;
pub mod cli;
pub mod factory;
pub mod service;

pub use service::TenantService;

//! # ST-02: Convergence Subsystem
//!
//! Drives a cluster's cloud resources toward the declared document:
//! observe what exists, derive what should exist, diff the two, then apply
//! creates and updates in dependency order and deletes in reverse order.
//!
//! ## Architecture
//!
//! - **Domain**: Snapshots, change sets, reports, error taxonomy
//! - **Algorithms**: Differ, retry with backoff, overrides, tag propagation
//! - **Ports**: Inbound (Reconciler) and Outbound (CloudProvider, Resource, RunLease)
//! - **Adapters**: In-memory and file-backed clouds, one adapter per resource kind
//! - **Application**: Engine phases and the bounded-concurrency scheduler
//!
//! Provider outputs only reach the cluster document through the scheduler's
//! commit step, so dependents always read what their dependencies rendered.

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::{AdapterRegistry, FileBackedCloud, InMemoryCloud, ProviderClient, ResourceAdapter};
pub use algorithms::{Overrides, RetryPolicy, TagPropagator};
pub use application::{ConvergenceEngine, RunOutcome};
pub use config::{EngineConfig, TagConfig};
pub use domain::entities::*;
pub use domain::errors::{NodeFailure, ProviderError, ReconcileError, ResourceError, StructuralError};
pub use domain::value_objects::*;
pub use ports::inbound::Reconciler;
pub use ports::outbound::{CloudProvider, Resource, RunLease};

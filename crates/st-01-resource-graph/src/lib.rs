//! # ST-01: Resource Graph Subsystem
//!
//! Dependency DAG over a cluster's declared resources, ordered with Kahn's
//! topological sort. Ties are broken by declaration order so that the same
//! document always produces the same plan.
//!
//! ## Architecture
//!
//! - **Domain**: Core entities (GraphNode, DependencyGraph, Schedule, ResourceGraph)
//! - **Algorithms**: Dependency building, Kahn's sort, cycle extraction
//! - **Ports**: Inbound (ResourceGraphApi)
//! - **Application**: Service orchestration and size limits
//!
//! A `ResourceGraph` can only be obtained from the service, so holding one
//! means the document is acyclic and every reference names a declared
//! resource.

pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::service::{build_resource_graph, ResourceGraphService};
pub use config::GraphConfig;
pub use domain::entities::*;
pub use domain::errors::GraphError;
pub use domain::invariants;
pub use domain::value_objects::*;
pub use ports::inbound::ResourceGraphApi;

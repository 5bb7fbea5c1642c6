//! Integration tests across shared-types, graph, convergence, state store
//! and runtime.

pub mod fixtures;
mod properties;
mod runtime_flow;

//! Ports module for convergence
//!
//! Defines inbound (API) and outbound (SPI) port traits.

pub mod inbound;
pub mod outbound;

pub use inbound::Reconciler;
pub use outbound::{CloudProvider, Resource, RunLease};

//! # Shared Types Crate
//!
//! This crate contains the cluster document model shared by every
//! subsystem: the graph builder reads declarations, the convergence engine
//! renders provider outputs back into them, and the state store persists
//! the whole document between runs.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: the serialized cluster format is defined
//!   here and nowhere else.
//! - **References, not copies**: a resource names its dependencies through
//!   `AttrRef` values; identifiers are substituted only after the
//!   dependency has been rendered.
//! - **Declaration order is significant**: it breaks ties in apply order.

pub mod attributes;
pub mod entities;
pub mod errors;
pub mod tags;

pub use attributes::*;
pub use entities::*;
pub use errors::*;
pub use tags::*;

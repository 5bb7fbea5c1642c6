//! Algorithms module for convergence
//!
//! Contains:
//! - Differ
//! - Retry with bounded exponential backoff
//! - Key-path overrides
//! - Tag propagation

pub mod differ;
pub mod overrides;
pub mod retry;
pub mod tags;

pub use differ::{diff, field_changes};
pub use overrides::{Assignment, Overrides};
pub use retry::{retry_transient, RetryPolicy};
pub use tags::TagPropagator;

//! # Error Types
//!
//! Errors raised while validating or resolving the cluster document.

use crate::entities::ResourceKey;
use thiserror::Error;

/// Errors that can occur while reading or rendering a cluster document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// A required identity field is empty.
    #[error("Missing required identity field: {field}")]
    MissingIdentity { field: &'static str },

    /// Cluster name is not usable as a path component / name prefix.
    #[error("Invalid cluster name {name:?}: use lowercase letters, digits and '-'")]
    InvalidName { name: String },

    /// Two declarations share a key.
    #[error("Duplicate resource key: {key}")]
    DuplicateKey { key: ResourceKey },

    /// Two declarations of one kind would share a provider-side name.
    #[error("Resources {first} and {second} map to the same provider name")]
    NameClash { first: ResourceKey, second: ResourceKey },

    /// A key that is not declared in this cluster.
    #[error("Unknown resource: {key}")]
    UnknownResource { key: ResourceKey },

    /// A reference whose target has not rendered the requested field yet.
    #[error("Unresolved reference: {key}.{field} has not been rendered")]
    UnresolvedReference { key: ResourceKey, field: String },

    /// Tag key or value outside provider limits.
    #[error("Invalid tag {key:?}: {reason}")]
    InvalidTag { key: String, reason: String },
}

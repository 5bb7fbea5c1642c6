//! Domain module for the state store

pub mod errors;

pub use errors::*;

/// Cluster names become directory names, so they are restricted to a
/// portable character set.
pub fn validate_cluster_name(name: &str) -> Result<(), StateError> {
    let invalid = |reason| StateError::InvalidName {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > 63 {
        return Err(invalid("must be at most 63 characters"));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(invalid("must start with a letter or digit"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(invalid("only ASCII letters, digits, '-', '_' and '.' are allowed"));
    }
    Ok(())
}

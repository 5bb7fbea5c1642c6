//! Value objects for the Resource Graph

use serde::{Deserialize, Serialize};

/// Why one resource depends on another.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    /// The dependent reads a rendered output of the dependency
    AttributeRef { field: String },
    /// Declared through `depends_on`
    Explicit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_kind_equality() {
        assert_eq!(
            DependencyKind::AttributeRef { field: "id".into() },
            DependencyKind::AttributeRef { field: "id".into() }
        );
        assert_ne!(
            DependencyKind::AttributeRef { field: "id".into() },
            DependencyKind::Explicit
        );
    }
}

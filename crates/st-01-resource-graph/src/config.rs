//! Configuration for the Resource Graph subsystem

use serde::{Deserialize, Serialize};

/// Graph construction limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Maximum declared resources in one cluster
    pub max_nodes: usize,
    /// Maximum dependency edges (pathological documents are rejected early)
    pub max_edges: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_nodes: 10_000,
            max_edges: 100_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GraphConfig::default();
        assert_eq!(config.max_nodes, 10_000);
        assert_eq!(config.max_edges, 100_000);
    }
}

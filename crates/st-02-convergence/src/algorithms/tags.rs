//! Tag propagation
//!
//! Every resource the engine creates or updates is labelled with who owns
//! it, so that provider-side inventory can be traced back to a cluster.

use crate::config::TagConfig;
use crate::domain::errors::StructuralError;
use shared_types::{Attributes, Cluster, ResourceKey, TagSet};
use std::collections::BTreeSet;

pub const TAG_CLUSTER: &str = "stratos.io/cluster";
pub const TAG_CLOUD_ID: &str = "stratos.io/cloud-id";
pub const TAG_MANAGED_BY: &str = "stratos.io/managed-by";
pub const TAG_PROFILE: &str = "stratos.io/profile";
pub const TAG_RESOURCE: &str = "stratos.io/resource";
/// Comma-separated attribute names the last apply declared.
pub const TAG_MANAGED_ATTRS: &str = "stratos.io/managed-attrs";

pub const MANAGED_BY: &str = "stratos";

/// Builds the tag set for each resource of one cluster.
#[derive(Clone, Debug)]
pub struct TagPropagator {
    base: TagSet,
}

impl TagPropagator {
    /// Ownership tags plus configured extras. Extras cannot shadow the
    /// ownership tags.
    pub fn new(config: &TagConfig, cluster: &Cluster) -> Result<Self, StructuralError> {
        let mut base = TagSet::new();
        for (key, value) in &config.extra {
            base.insert(key.clone(), value.clone())?;
        }

        base.insert(TAG_CLUSTER, cluster.name.clone())?;
        base.insert(TAG_CLOUD_ID, cluster.cloud_id.clone())?;
        base.insert(TAG_MANAGED_BY, MANAGED_BY)?;
        base.insert(TAG_PROFILE, cluster.profile.clone())?;

        Ok(Self { base })
    }

    /// Tags shared by every resource of the cluster.
    pub fn base(&self) -> &TagSet {
        &self.base
    }

    /// Full tag set for one resource declaring `attributes`.
    pub fn for_resource(&self, key: &ResourceKey, attributes: &Attributes) -> Result<TagSet, StructuralError> {
        let mut tags = self.base.clone();
        tags.insert(TAG_RESOURCE, key.as_str())?;
        let managed: Vec<&str> = attributes.keys().map(String::as_str).collect();
        tags.insert(TAG_MANAGED_ATTRS, managed.join(","))?;
        Ok(tags)
    }
}

/// Attribute names recorded in `TAG_MANAGED_ATTRS`; empty when untagged.
pub fn managed_attributes(tags: &TagSet) -> BTreeSet<&str> {
    tags.get(TAG_MANAGED_ATTRS)
        .map(|v| v.split(',').filter(|name| !name.is_empty()).collect())
        .unwrap_or_default()
}

/// Whether `tags` name `key` of `cluster` as their owner.
pub fn is_owned_by(tags: &TagSet, cluster: &Cluster, key: &ResourceKey) -> bool {
    tags.get(TAG_CLUSTER) == Some(cluster.name.as_str()) && tags.get(TAG_RESOURCE) == Some(key.as_str())
}

//! Outbound Ports (Driven Ports / SPI)

use crate::domain::entities::{Observed, ProviderObject, ResourceState};
use crate::domain::errors::{ProviderError, ResourceError, StructuralError};
use crate::domain::value_objects::{DiffMode, RenderPatch};
use async_trait::async_trait;
use shared_types::{Attributes, Cluster, ResourceDecl, ResourceKind, TagSet};

/// Cloud provider API.
///
/// Implementations report `ProviderError::Transient` for anything worth
/// retrying; callers own the retry policy.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Check credentials for `profile` against `cloud_id`.
    async fn authenticate(&self, profile: &str, cloud_id: &str) -> Result<(), ProviderError>;

    async fn describe(&self, kind: ResourceKind, id: &str) -> Result<ProviderObject, ProviderError>;

    /// Look up an object by its provider-side name; `None` when absent.
    async fn find_by_name(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ProviderObject>, ProviderError>;

    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        attributes: &Attributes,
    ) -> Result<ProviderObject, ProviderError>;

    /// Set the attributes in `set` and remove those named in `unset`.
    /// Attributes named in neither are left alone.
    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        set: &Attributes,
        unset: &[String],
    ) -> Result<ProviderObject, ProviderError>;

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ProviderError>;

    /// Replace the tags of an object.
    async fn set_tags(&self, kind: ResourceKind, id: &str, tags: &TagSet) -> Result<(), ProviderError>;
}

/// Exclusive right to run against one cluster, held for the whole run.
pub trait RunLease: Send + Sync {
    fn cluster_name(&self) -> &str;

    fn is_held(&self) -> bool;
}

/// Capability contract of one resource kind.
#[async_trait]
pub trait Resource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Output fields this kind renders into the document.
    fn output_fields(&self) -> &'static [&'static str];

    /// Observed state; `Observed::NotFound` when the object does not exist.
    async fn actual(&self, decl: &ResourceDecl, cluster: &Cluster) -> Result<Observed, ResourceError>;

    /// Desired state, derived from the declaration alone. `None` for absent
    /// declarations. References that cannot be resolved yet are kept.
    fn expected(
        &self,
        decl: &ResourceDecl,
        cluster: &Cluster,
    ) -> Result<Option<ResourceState>, StructuralError>;

    /// Minimal create or update, comparing under `mode`. Returns `actual`
    /// unchanged, without any provider call, when nothing differs.
    async fn apply(
        &self,
        actual: &Observed,
        expected: &ResourceState,
        mode: DiffMode,
    ) -> Result<ResourceState, ResourceError>;

    /// Delete; an object that is already gone counts as deleted.
    async fn delete(&self, actual: &ResourceState) -> Result<(), ResourceError>;

    /// Outputs to write back into the document.
    fn render(&self, state: &ResourceState) -> Result<RenderPatch, StructuralError>;

    async fn tag(&self, state: &ResourceState, tags: &TagSet) -> Result<(), ResourceError>;
}

use crate::algorithms::retry::{retry_transient, RetryPolicy};
use crate::domain::entities::ProviderObject;
use crate::domain::errors::ProviderError;
use crate::ports::outbound::CloudProvider;
use shared_types::{Attributes, ResourceKey, ResourceKind, TagSet};
use std::sync::Arc;

/// Provider handle shared by all adapters; every call goes through the
/// retry policy.
#[derive(Clone)]
pub struct ProviderClient {
    provider: Arc<dyn CloudProvider>,
    retry: RetryPolicy,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn CloudProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn provider(&self) -> &Arc<dyn CloudProvider> {
        &self.provider
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn authenticate(&self, key: &ResourceKey, profile: &str, cloud_id: &str) -> Result<(), ProviderError> {
        retry_transient(&self.retry, "authenticate", key, || {
            self.provider.authenticate(profile, cloud_id)
        })
        .await
    }

    pub async fn describe(
        &self,
        key: &ResourceKey,
        kind: ResourceKind,
        id: &str,
    ) -> Result<ProviderObject, ProviderError> {
        retry_transient(&self.retry, "describe", key, || self.provider.describe(kind, id)).await
    }

    pub async fn find_by_name(
        &self,
        key: &ResourceKey,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ProviderObject>, ProviderError> {
        retry_transient(&self.retry, "find_by_name", key, || {
            self.provider.find_by_name(kind, name)
        })
        .await
    }

    pub async fn create(
        &self,
        key: &ResourceKey,
        kind: ResourceKind,
        name: &str,
        attributes: &Attributes,
    ) -> Result<ProviderObject, ProviderError> {
        retry_transient(&self.retry, "create", key, || {
            self.provider.create(kind, name, attributes)
        })
        .await
    }

    pub async fn update(
        &self,
        key: &ResourceKey,
        kind: ResourceKind,
        id: &str,
        set: &Attributes,
        unset: &[String],
    ) -> Result<ProviderObject, ProviderError> {
        retry_transient(&self.retry, "update", key, || {
            self.provider.update(kind, id, set, unset)
        })
        .await
    }

    pub async fn delete(&self, key: &ResourceKey, kind: ResourceKind, id: &str) -> Result<(), ProviderError> {
        retry_transient(&self.retry, "delete", key, || self.provider.delete(kind, id)).await
    }

    pub async fn set_tags(
        &self,
        key: &ResourceKey,
        kind: ResourceKind,
        id: &str,
        tags: &TagSet,
    ) -> Result<(), ProviderError> {
        retry_transient(&self.retry, "set_tags", key, || {
            self.provider.set_tags(kind, id, tags)
        })
        .await
    }
}

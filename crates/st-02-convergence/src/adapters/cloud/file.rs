use super::memory::{InMemoryCloud, Inventory};
use crate::domain::entities::ProviderObject;
use crate::domain::errors::ProviderError;
use crate::ports::outbound::CloudProvider;
use async_trait::async_trait;
use shared_types::{Attributes, ResourceKind, TagSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// File-backed cloud for the `local` profile.
///
/// The simulated inventory survives between runs, so a second run observes
/// what the first one created. Persisted as pretty JSON after every
/// mutation, written atomically via a temp file.
pub struct FileBackedCloud {
    inner: InMemoryCloud,
    path: PathBuf,
}

impl FileBackedCloud {
    /// Open the inventory at `path`, starting empty when the file is absent.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let inventory = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Inventory>(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Inventory::default(),
            Err(e) => return Err(e),
        };

        info!(
            "[st-02] Local cloud inventory at {} ({} objects)",
            path.display(),
            inventory.objects.len()
        );

        Ok(Self {
            inner: InMemoryCloud::from_inventory(inventory),
            path,
        })
    }

    /// The wrapped simulator, for inspection.
    pub fn inner(&self) -> &InMemoryCloud {
        &self.inner
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let bytes = serde_json::to_vec_pretty(&self.inner.snapshot())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // Write atomically via temp file
        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, &self.path)
    }

    fn persist<T>(&self, operation: &str, result: Result<T, ProviderError>) -> Result<T, ProviderError> {
        let value = result?;
        self.save().map_err(|e| ProviderError::Transient {
            operation: operation.to_string(),
            message: format!("persisting inventory to {}: {}", self.path.display(), e),
        })?;
        Ok(value)
    }
}

#[async_trait]
impl CloudProvider for FileBackedCloud {
    async fn authenticate(&self, profile: &str, cloud_id: &str) -> Result<(), ProviderError> {
        let result = self.inner.authenticate(profile, cloud_id).await;
        self.persist("authenticate", result)
    }

    async fn describe(&self, kind: ResourceKind, id: &str) -> Result<ProviderObject, ProviderError> {
        self.inner.describe(kind, id).await
    }

    async fn find_by_name(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ProviderObject>, ProviderError> {
        self.inner.find_by_name(kind, name).await
    }

    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        attributes: &Attributes,
    ) -> Result<ProviderObject, ProviderError> {
        let result = self.inner.create(kind, name, attributes).await;
        self.persist("create", result)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        set: &Attributes,
        unset: &[String],
    ) -> Result<ProviderObject, ProviderError> {
        let result = self.inner.update(kind, id, set, unset).await;
        self.persist("update", result)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ProviderError> {
        let result = self.inner.delete(kind, id).await;
        self.persist("delete", result)
    }

    async fn set_tags(&self, kind: ResourceKind, id: &str, tags: &TagSet) -> Result<(), ProviderError> {
        let result = self.inner.set_tags(kind, id, tags).await;
        self.persist("set_tags", result)
    }
}

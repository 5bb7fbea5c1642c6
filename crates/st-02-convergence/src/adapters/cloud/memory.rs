//! In-memory cloud provider.
//!
//! Thread-safe simulated provider used by tests and by the `local` profile
//! (through `FileBackedCloud`). Every call is journaled with a begin and an
//! end sequence number so ordering and concurrency can be asserted, and
//! faults can be injected per (operation, object name).

use crate::domain::entities::ProviderObject;
use crate::domain::errors::ProviderError;
use crate::ports::outbound::CloudProvider;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::{AttrValue, Attributes, ResourceKind, TagSet};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Provider API operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudOp {
    Authenticate,
    Describe,
    FindByName,
    Create,
    Update,
    Delete,
    SetTags,
}

impl CloudOp {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            CloudOp::Create | CloudOp::Update | CloudOp::Delete | CloudOp::SetTags
        )
    }
}

impl fmt::Display for CloudOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloudOp::Authenticate => "authenticate",
            CloudOp::Describe => "describe",
            CloudOp::FindByName => "find_by_name",
            CloudOp::Create => "create",
            CloudOp::Update => "update",
            CloudOp::Delete => "delete",
            CloudOp::SetTags => "set_tags",
        };
        f.write_str(name)
    }
}

/// What an injected fault returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    Transient,
    PermissionDenied,
    Rejected,
}

/// Fault injected for calls of `op` on the object named `name`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    pub op: CloudOp,
    pub name: String,
    pub kind: FaultKind,
    /// Calls left to fail; `None` fails until cleared
    pub remaining: Option<u32>,
}

impl Fault {
    pub fn transient(op: CloudOp, name: impl Into<String>, times: u32) -> Self {
        Self {
            op,
            name: name.into(),
            kind: FaultKind::Transient,
            remaining: Some(times),
        }
    }

    pub fn permission_denied(op: CloudOp, name: impl Into<String>) -> Self {
        Self {
            op,
            name: name.into(),
            kind: FaultKind::PermissionDenied,
            remaining: None,
        }
    }

    pub fn rejected(op: CloudOp, name: impl Into<String>) -> Self {
        Self {
            op,
            name: name.into(),
            kind: FaultKind::Rejected,
            remaining: None,
        }
    }

    fn error(&self) -> ProviderError {
        let operation = self.op.to_string();
        let message = format!("injected fault on {}", self.name);
        match self.kind {
            FaultKind::Transient => ProviderError::Transient { operation, message },
            FaultKind::PermissionDenied => ProviderError::PermissionDenied { operation, message },
            FaultKind::Rejected => ProviderError::Rejected { operation, message },
        }
    }
}

/// One provider call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalEntry {
    /// Sequence number taken when the call started
    pub begin: u64,
    /// Sequence number taken when the call returned
    pub end: u64,
    pub op: CloudOp,
    pub kind: Option<ResourceKind>,
    /// Object name when known, otherwise the id or profile
    pub target: String,
    pub ok: bool,
}

/// Objects and id counters; this is what `FileBackedCloud` persists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub cloud_id: String,
    #[serde(default)]
    pub objects: BTreeMap<String, ProviderObject>,
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
}

impl Inventory {
    fn find_by_name(&self, kind: ResourceKind, name: &str) -> Option<&ProviderObject> {
        self.objects
            .values()
            .find(|o| o.kind == kind && o.name == name)
    }

    fn get(&self, kind: ResourceKind, id: &str) -> Option<&ProviderObject> {
        self.objects.get(id).filter(|o| o.kind == kind)
    }

    fn next_id(&mut self, kind: ResourceKind) -> (String, u64) {
        let counter = self.counters.entry(kind.as_str().to_string()).or_insert(0);
        *counter += 1;
        (format!("{}-{:04}", id_prefix(kind), counter), *counter)
    }
}

fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Network => "net",
        ResourceKind::Subnet => "subnet",
        ResourceKind::Firewall => "fw",
        ResourceKind::ComputePool => "pool",
        ResourceKind::LoadBalancer => "lb",
    }
}

fn not_found(kind: ResourceKind, id: &str) -> ProviderError {
    ProviderError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[derive(Default)]
struct CallState {
    seq: u64,
    journal: Vec<JournalEntry>,
    faults: Vec<Fault>,
}

impl CallState {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn take_fault(&mut self, op: CloudOp, target: &str) -> Option<ProviderError> {
        let index = self
            .faults
            .iter()
            .position(|f| f.op == op && f.name == target)?;
        let fault = &mut self.faults[index];
        let error = fault.error();
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.faults.remove(index);
            }
        }
        Some(error)
    }
}

/// Simulated cloud provider.
pub struct InMemoryCloud {
    inventory: Mutex<Inventory>,
    calls: Mutex<CallState>,
    latency: Duration,
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::from_inventory(Inventory::default())
    }

    pub fn from_inventory(inventory: Inventory) -> Self {
        Self {
            inventory: Mutex::new(inventory),
            calls: Mutex::new(CallState::default()),
            latency: Duration::ZERO,
        }
    }

    /// Every call sleeps this long between begin and end.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn inject(&self, fault: Fault) {
        self.calls.lock().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.calls.lock().faults.clear();
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.calls.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.calls.lock().journal.clear();
    }

    /// Successful mutating calls, in completion order.
    pub fn mutations(&self) -> Vec<JournalEntry> {
        self.calls
            .lock()
            .journal
            .iter()
            .filter(|e| e.op.is_mutation() && e.ok)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Inventory {
        self.inventory.lock().clone()
    }

    pub fn objects(&self) -> Vec<ProviderObject> {
        self.inventory.lock().objects.values().cloned().collect()
    }

    pub fn object(&self, kind: ResourceKind, name: &str) -> Option<ProviderObject> {
        self.inventory.lock().find_by_name(kind, name).cloned()
    }

    /// Delete an object behind the engine's back.
    pub fn remove_out_of_band(&self, kind: ResourceKind, name: &str) -> Option<ProviderObject> {
        let mut inventory = self.inventory.lock();
        let id = inventory.find_by_name(kind, name)?.id.clone();
        inventory.objects.remove(&id)
    }

    /// Change an attribute behind the engine's back.
    pub fn set_out_of_band(&self, kind: ResourceKind, name: &str, attribute: &str, value: AttrValue) -> bool {
        let mut inventory = self.inventory.lock();
        let Some(id) = inventory.find_by_name(kind, name).map(|o| o.id.clone()) else {
            return false;
        };
        match inventory.objects.get_mut(&id) {
            Some(object) => {
                object.attributes.insert(attribute.to_string(), value);
                true
            }
            None => false,
        }
    }

    fn name_of(&self, id: &str) -> String {
        self.inventory
            .lock()
            .objects
            .get(id)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    async fn call<T, F>(
        &self,
        op: CloudOp,
        kind: Option<ResourceKind>,
        target: String,
        f: F,
    ) -> Result<T, ProviderError>
    where
        F: FnOnce(&mut Inventory) -> Result<T, ProviderError> + Send,
    {
        let begin = self.calls.lock().next_seq();

        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }

        let fault = self.calls.lock().take_fault(op, &target);
        let result = match fault {
            Some(error) => Err(error),
            None => f(&mut *self.inventory.lock()),
        };

        let mut calls = self.calls.lock();
        let end = calls.next_seq();
        debug!(%op, ?kind, %target, ok = result.is_ok(), "Cloud call");
        calls.journal.push(JournalEntry {
            begin,
            end,
            op,
            kind,
            target,
            ok: result.is_ok(),
        });
        result
    }

    /// Values the provider computes itself.
    fn computed_attributes(inventory: &Inventory, kind: ResourceKind, id: &str, name: &str, serial: u64) -> Attributes {
        let mut computed = Attributes::new();
        match kind {
            ResourceKind::Network => {
                let cloud = if inventory.cloud_id.is_empty() {
                    "local"
                } else {
                    inventory.cloud_id.as_str()
                };
                computed.insert(
                    "self_link".into(),
                    format!("projects/{}/global/networks/{}", cloud, name).into(),
                );
                computed.insert("routing_mode".into(), "regional".into());
            }
            ResourceKind::Subnet => {}
            ResourceKind::ComputePool => {
                computed.insert("instance_group".into(), format!("{}-ig", id).into());
            }
            ResourceKind::LoadBalancer => {
                computed.insert(
                    "address".into(),
                    format!("203.0.113.{}", serial % 250 + 1).into(),
                );
            }
            ResourceKind::Firewall => {}
        }
        computed
    }
}

#[async_trait]
impl CloudProvider for InMemoryCloud {
    async fn authenticate(&self, profile: &str, cloud_id: &str) -> Result<(), ProviderError> {
        let cloud_id = cloud_id.to_string();
        self.call(CloudOp::Authenticate, None, profile.to_string(), move |inv| {
            if inv.cloud_id.is_empty() {
                inv.cloud_id = cloud_id;
            }
            Ok(())
        })
        .await
    }

    async fn describe(&self, kind: ResourceKind, id: &str) -> Result<ProviderObject, ProviderError> {
        let target = self.name_of(id);
        self.call(CloudOp::Describe, Some(kind), target, |inv| {
            inv.get(kind, id).cloned().ok_or_else(|| not_found(kind, id))
        })
        .await
    }

    async fn find_by_name(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ProviderObject>, ProviderError> {
        self.call(CloudOp::FindByName, Some(kind), name.to_string(), |inv| {
            Ok(inv.find_by_name(kind, name).cloned())
        })
        .await
    }

    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        attributes: &Attributes,
    ) -> Result<ProviderObject, ProviderError> {
        self.call(CloudOp::Create, Some(kind), name.to_string(), |inv| {
            if inv.find_by_name(kind, name).is_some() {
                return Err(ProviderError::Rejected {
                    operation: CloudOp::Create.to_string(),
                    message: format!("{} '{}' already exists", kind, name),
                });
            }

            let (id, serial) = inv.next_id(kind);
            let mut stored = Self::computed_attributes(inv, kind, &id, name, serial);
            stored.extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));

            let object = ProviderObject {
                id: id.clone(),
                kind,
                name: name.to_string(),
                attributes: stored,
                tags: TagSet::new(),
                created_at: Utc::now(),
            };
            inv.objects.insert(id, object.clone());
            Ok(object)
        })
        .await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        set: &Attributes,
        unset: &[String],
    ) -> Result<ProviderObject, ProviderError> {
        let target = self.name_of(id);
        self.call(CloudOp::Update, Some(kind), target, |inv| {
            let object = inv
                .objects
                .get_mut(id)
                .filter(|o| o.kind == kind)
                .ok_or_else(|| not_found(kind, id))?;
            for name in unset {
                object.attributes.remove(name);
            }
            object
                .attributes
                .extend(set.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(object.clone())
        })
        .await
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ProviderError> {
        let target = self.name_of(id);
        self.call(CloudOp::Delete, Some(kind), target, |inv| {
            if inv.get(kind, id).is_none() {
                return Err(not_found(kind, id));
            }
            inv.objects.remove(id);
            Ok(())
        })
        .await
    }

    async fn set_tags(&self, kind: ResourceKind, id: &str, tags: &TagSet) -> Result<(), ProviderError> {
        let target = self.name_of(id);
        self.call(CloudOp::SetTags, Some(kind), target, |inv| {
            let object = inv
                .objects
                .get_mut(id)
                .filter(|o| o.kind == kind)
                .ok_or_else(|| not_found(kind, id))?;
            object.tags = tags.clone();
            Ok(())
        })
        .await
    }
}

//! Resource adapters, one per kind, dispatched by kind tag.

pub mod cidr;
pub mod client;
pub mod common;
pub mod compute_pool;
pub mod firewall;
pub mod load_balancer;
pub mod network;
pub mod subnet;

pub use client::ProviderClient;
pub use common::{provider_name, KindAdapter, KindSpec, Schema};
pub use compute_pool::ComputePoolAdapter;
pub use firewall::FirewallAdapter;
pub use load_balancer::LoadBalancerAdapter;
pub use network::NetworkAdapter;
pub use subnet::SubnetAdapter;

use crate::domain::entities::{Observed, ResourceState};
use crate::domain::errors::{ResourceError, StructuralError};
use crate::domain::value_objects::{DiffMode, RenderPatch};
use crate::ports::outbound::Resource;
use async_trait::async_trait;
use shared_types::{Cluster, ResourceDecl, ResourceKind, TagSet};

/// Adapter for any supported kind.
#[derive(Clone)]
pub enum ResourceAdapter {
    Network(NetworkAdapter),
    Subnet(SubnetAdapter),
    Firewall(FirewallAdapter),
    ComputePool(ComputePoolAdapter),
    LoadBalancer(LoadBalancerAdapter),
}

macro_rules! dispatch {
    ($self:ident, $adapter:ident => $call:expr) => {
        match $self {
            ResourceAdapter::Network($adapter) => $call,
            ResourceAdapter::Subnet($adapter) => $call,
            ResourceAdapter::Firewall($adapter) => $call,
            ResourceAdapter::ComputePool($adapter) => $call,
            ResourceAdapter::LoadBalancer($adapter) => $call,
        }
    };
}

impl ResourceAdapter {
    pub fn new(kind: ResourceKind, client: ProviderClient) -> Self {
        match kind {
            ResourceKind::Network => ResourceAdapter::Network(NetworkAdapter::new(client)),
            ResourceKind::Subnet => ResourceAdapter::Subnet(SubnetAdapter::new(client)),
            ResourceKind::Firewall => ResourceAdapter::Firewall(FirewallAdapter::new(client)),
            ResourceKind::ComputePool => ResourceAdapter::ComputePool(ComputePoolAdapter::new(client)),
            ResourceKind::LoadBalancer => ResourceAdapter::LoadBalancer(LoadBalancerAdapter::new(client)),
        }
    }
}

#[async_trait]
impl Resource for ResourceAdapter {
    fn kind(&self) -> ResourceKind {
        dispatch!(self, a => a.kind())
    }

    fn output_fields(&self) -> &'static [&'static str] {
        dispatch!(self, a => a.output_fields())
    }

    async fn actual(&self, decl: &ResourceDecl, cluster: &Cluster) -> Result<Observed, ResourceError> {
        dispatch!(self, a => a.actual(decl, cluster).await)
    }

    fn expected(
        &self,
        decl: &ResourceDecl,
        cluster: &Cluster,
    ) -> Result<Option<ResourceState>, StructuralError> {
        dispatch!(self, a => a.expected(decl, cluster))
    }

    async fn apply(
        &self,
        actual: &Observed,
        expected: &ResourceState,
        mode: DiffMode,
    ) -> Result<ResourceState, ResourceError> {
        dispatch!(self, a => a.apply(actual, expected, mode).await)
    }

    async fn delete(&self, actual: &ResourceState) -> Result<(), ResourceError> {
        dispatch!(self, a => a.delete(actual).await)
    }

    fn render(&self, state: &ResourceState) -> Result<RenderPatch, StructuralError> {
        dispatch!(self, a => a.render(state))
    }

    async fn tag(&self, state: &ResourceState, tags: &TagSet) -> Result<(), ResourceError> {
        dispatch!(self, a => a.tag(state, tags).await)
    }
}

/// One adapter per kind, sharing a provider client.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: [ResourceAdapter; 5],
}

impl AdapterRegistry {
    pub fn new(client: ProviderClient) -> Self {
        Self {
            adapters: ResourceKind::ALL.map(|kind| ResourceAdapter::new(kind, client.clone())),
        }
    }

    pub fn for_kind(&self, kind: ResourceKind) -> &ResourceAdapter {
        // ALL is in declaration order
        &self.adapters[kind as usize]
    }
}

//! Behaviour shared by every resource kind.
//!
//! A kind is described by a `KindSpec`: its attribute schema, its value
//! validation and the outputs it renders. `KindAdapter<S>` turns that into
//! the full `Resource` contract on top of a `ProviderClient`.

use super::cidr::Ipv4Cidr;
use super::client::ProviderClient;
use crate::algorithms::differ::field_changes;
use crate::algorithms::tags::{is_owned_by, TAG_CLUSTER, TAG_RESOURCE};
use crate::domain::entities::{Observed, ProviderObject, ResourceState};
use crate::domain::errors::{ResourceError, StructuralError};
use crate::domain::value_objects::{DiffMode, RenderPatch};
use crate::ports::outbound::Resource;
use async_trait::async_trait;
use shared_types::{
    AttrValue, Attributes, Cluster, ClusterError, ResourceDecl, ResourceKey, ResourceKind, TagSet,
    ID_FIELD,
};
use std::marker::PhantomData;
use tracing::{debug, info, warn};

/// Attribute schema of one kind.
#[derive(Debug)]
pub struct Schema {
    pub kind: ResourceKind,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    /// Changing any of these forces delete-then-create
    pub immutable: &'static [&'static str],
    /// Rendered outputs, `id` included
    pub outputs: &'static [&'static str],
}

impl Schema {
    pub fn is_known(&self, attribute: &str) -> bool {
        self.required.contains(&attribute) || self.optional.contains(&attribute)
    }

    pub fn is_immutable(&self, attribute: &str) -> bool {
        self.immutable.contains(&attribute)
    }
}

/// Kind-specific parts of an adapter.
pub trait KindSpec: Send + Sync + 'static {
    const SCHEMA: Schema;

    /// Check declared values. References may still be unresolved.
    fn validate(decl: &ResourceDecl, attributes: &Attributes, cluster: &Cluster) -> Result<(), StructuralError>;

    /// Outputs beyond `id`, derived from an observed state.
    fn outputs(state: &ResourceState) -> Attributes;
}

/// Provider-side name of a declaration: `<cluster>-<name>`.
pub fn provider_name(cluster: &Cluster, key: &ResourceKey) -> String {
    format!("{}-{}", cluster.name, key.name())
}

/// `Resource` implementation for the kind described by `S`.
pub struct KindAdapter<S: KindSpec> {
    client: ProviderClient,
    _spec: PhantomData<S>,
}

impl<S: KindSpec> Clone for KindAdapter<S> {
    fn clone(&self) -> Self {
        Self::new(self.client.clone())
    }
}

impl<S: KindSpec> KindAdapter<S> {
    pub fn new(client: ProviderClient) -> Self {
        Self {
            client,
            _spec: PhantomData,
        }
    }

    /// Split a provider object into comparable attributes, outputs and
    /// provider-only fields.
    fn state_from_object(key: &ResourceKey, object: ProviderObject) -> ResourceState {
        let mut state = ResourceState::new(key.clone(), S::SCHEMA.kind, object.name);
        state.provider_id = Some(object.id.clone());
        state.tags = object.tags;

        for (name, value) in object.attributes {
            if S::SCHEMA.is_known(&name) {
                state.attributes.insert(name, value);
            } else {
                state.provider_only.insert(name, value);
            }
        }
        state
            .provider_only
            .insert("created_at".into(), object.created_at.to_rfc3339().into());

        let mut outputs = S::outputs(&state);
        outputs.insert(ID_FIELD.to_string(), object.id.into());
        state.outputs = outputs;
        state
    }

    fn provider_id<'a>(&self, state: &'a ResourceState) -> Result<&'a str, StructuralError> {
        state
            .provider_id
            .as_deref()
            .ok_or_else(|| StructuralError::MissingProviderId {
                key: state.key.clone(),
                kind: S::SCHEMA.kind,
            })
    }

    async fn create(&self, expected: &ResourceState) -> Result<ResourceState, ResourceError> {
        let object = self
            .client
            .create(&expected.key, S::SCHEMA.kind, &expected.name, &expected.attributes)
            .await?;
        info!(resource = %expected.key, id = %object.id, "Created");
        Ok(Self::state_from_object(&expected.key, object))
    }
}

#[async_trait]
impl<S: KindSpec> Resource for KindAdapter<S> {
    fn kind(&self) -> ResourceKind {
        S::SCHEMA.kind
    }

    fn output_fields(&self) -> &'static [&'static str] {
        S::SCHEMA.outputs
    }

    async fn actual(&self, decl: &ResourceDecl, cluster: &Cluster) -> Result<Observed, ResourceError> {
        let kind = S::SCHEMA.kind;

        let mut object = None;
        if let Some(id) = decl.provider_id() {
            match self.client.describe(&decl.key, kind, id).await {
                Ok(found) => object = Some(found),
                Err(e) if e.is_not_found() => {
                    debug!(resource = %decl.key, id, "Rendered id no longer exists");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Not rendered yet, or rendered id gone: adopt by name, but only an
        // object this declaration tagged as its own
        if object.is_none() {
            let name = provider_name(cluster, &decl.key);
            if let Some(found) = self.client.find_by_name(&decl.key, kind, &name).await? {
                if !is_owned_by(&found.tags, cluster, &decl.key) {
                    warn!(resource = %decl.key, name = %name, id = %found.id, "Refusing to adopt foreign object");
                    return Err(StructuralError::ForeignObject {
                        key: decl.key.clone(),
                        kind,
                        name,
                        owner: owner_of(&found.tags),
                    }
                    .into());
                }
                object = Some(found);
            }
        }

        Ok(match object {
            Some(object) => Observed::Found(Self::state_from_object(&decl.key, object)),
            None => Observed::NotFound,
        })
    }

    fn expected(
        &self,
        decl: &ResourceDecl,
        cluster: &Cluster,
    ) -> Result<Option<ResourceState>, StructuralError> {
        if decl.is_absent() {
            return Ok(None);
        }

        for attribute in S::SCHEMA.required {
            if !decl.attributes.contains_key(*attribute) {
                return Err(StructuralError::MissingAttribute {
                    key: decl.key.clone(),
                    attribute: attribute.to_string(),
                });
            }
        }
        if let Some(unknown) = decl.attributes.keys().find(|a| !S::SCHEMA.is_known(a)) {
            return Err(StructuralError::InvalidAttribute {
                key: decl.key.clone(),
                attribute: unknown.clone(),
                reason: format!("not a {} attribute", S::SCHEMA.kind),
            });
        }

        let attributes: Attributes = decl
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), cluster.resolve_partial(value)))
            .collect();
        S::validate(decl, &attributes, cluster)?;

        let mut state = ResourceState::new(decl.key.clone(), S::SCHEMA.kind, provider_name(cluster, &decl.key));
        state.provider_id = decl.provider_id().map(str::to_string);
        state.attributes = attributes;
        Ok(Some(state))
    }

    async fn apply(
        &self,
        actual: &Observed,
        expected: &ResourceState,
        mode: DiffMode,
    ) -> Result<ResourceState, ResourceError> {
        if let Some(reference) = expected.attributes.values().flat_map(|v| v.references()).next() {
            return Err(StructuralError::Cluster(ClusterError::UnresolvedReference {
                key: reference.key.clone(),
                field: reference.field.clone(),
            })
            .into());
        }

        let current = match actual {
            Observed::NotFound => return self.create(expected).await,
            Observed::Found(current) => current,
        };

        let changes = field_changes(current, expected, mode);
        if changes.is_empty() {
            return Ok(current.clone());
        }

        let immutable: Vec<&str> = changes
            .iter()
            .map(|c| c.field.as_str())
            .filter(|f| S::SCHEMA.is_immutable(f))
            .collect();

        if !immutable.is_empty() {
            warn!(
                resource = %expected.key,
                fields = ?immutable,
                "Immutable attributes changed, replacing"
            );
            self.delete(current).await?;
            return self.create(expected).await;
        }

        let id = self.provider_id(current)?;
        let mut set = Attributes::new();
        let mut unset = Vec::new();
        for change in changes {
            match change.expected {
                Some(value) => {
                    set.insert(change.field, value);
                }
                None => unset.push(change.field),
            }
        }
        let object = self
            .client
            .update(&expected.key, S::SCHEMA.kind, id, &set, &unset)
            .await?;
        info!(resource = %expected.key, id, set = set.len(), unset = unset.len(), "Updated");
        Ok(Self::state_from_object(&expected.key, object))
    }

    async fn delete(&self, actual: &ResourceState) -> Result<(), ResourceError> {
        let id = self.provider_id(actual)?;
        match self.client.delete(&actual.key, S::SCHEMA.kind, id).await {
            Ok(()) => {
                info!(resource = %actual.key, id, "Deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(resource = %actual.key, id, "Already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn render(&self, state: &ResourceState) -> Result<RenderPatch, StructuralError> {
        self.provider_id(state)?;
        Ok(RenderPatch {
            key: state.key.clone(),
            outputs: state.outputs.clone(),
        })
    }

    async fn tag(&self, state: &ResourceState, tags: &TagSet) -> Result<(), ResourceError> {
        let id = self.provider_id(state)?;
        self.client
            .set_tags(&state.key, S::SCHEMA.kind, id, tags)
            .await?;
        Ok(())
    }
}

// =============================================================================
// VALIDATION HELPERS
// =============================================================================

pub(crate) fn invalid(key: &ResourceKey, attribute: &str, reason: impl Into<String>) -> StructuralError {
    StructuralError::InvalidAttribute {
        key: key.clone(),
        attribute: attribute.to_string(),
        reason: reason.into(),
    }
}

/// Who a found object's ownership tags point at, for error reporting.
fn owner_of(tags: &TagSet) -> String {
    match (tags.get(TAG_CLUSTER), tags.get(TAG_RESOURCE)) {
        (Some(cluster), Some(resource)) => format!("{} of cluster {}", resource, cluster),
        (Some(cluster), None) => format!("cluster {}", cluster),
        _ => "nothing managed by stratos".to_string(),
    }
}

/// An observed value, whether the kind declares it or the provider computed it.
pub(crate) fn observed_field<'a>(state: &'a ResourceState, name: &str) -> Option<&'a AttrValue> {
    state
        .attributes
        .get(name)
        .or_else(|| state.provider_only.get(name))
}

/// A reference, or the provider id it already resolved to.
pub(crate) fn require_reference(
    key: &ResourceKey,
    attributes: &Attributes,
    attribute: &str,
) -> Result<(), StructuralError> {
    match attributes.get(attribute) {
        None | Some(AttrValue::Ref(_)) => Ok(()),
        Some(AttrValue::Str(s)) if !s.is_empty() => Ok(()),
        Some(other) => Err(invalid(key, attribute, format!("expected a reference, got {}", other))),
    }
}

pub(crate) fn require_string<'a>(
    key: &ResourceKey,
    attributes: &'a Attributes,
    attribute: &str,
) -> Result<Option<&'a str>, StructuralError> {
    match attributes.get(attribute) {
        None | Some(AttrValue::Ref(_)) => Ok(None),
        Some(AttrValue::Str(s)) if !s.is_empty() => Ok(Some(s)),
        Some(other) => Err(invalid(key, attribute, format!("expected a non-empty string, got {}", other))),
    }
}

pub(crate) fn parse_cidr(key: &ResourceKey, attribute: &str, value: &str) -> Result<Ipv4Cidr, StructuralError> {
    value.parse().map_err(|reason: String| invalid(key, attribute, reason))
}

/// Parse a port number in 1..=65535.
pub(crate) fn parse_port(key: &ResourceKey, attribute: &str, value: &AttrValue) -> Result<u16, StructuralError> {
    value
        .as_int()
        .filter(|p| (1..=65535).contains(p))
        .map(|p| p as u16)
        .ok_or_else(|| invalid(key, attribute, format!("{} is not a port between 1 and 65535", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name() {
        let cluster = Cluster::new("alpha", "proj", "local");
        assert_eq!(provider_name(&cluster, &"subnet/public-a".into()), "alpha-public-a");
    }

    #[test]
    fn test_require_reference() {
        let key = ResourceKey::from("subnet/a");
        let mut attrs = Attributes::new();
        attrs.insert("network".into(), AttrValue::Int(3));
        assert!(require_reference(&key, &attrs, "network").is_err());

        attrs.insert("network".into(), "net-0001".into());
        assert!(require_reference(&key, &attrs, "network").is_ok());
    }

    #[test]
    fn test_parse_port() {
        let key = ResourceKey::from("load_balancer/web");
        assert_eq!(parse_port(&key, "listeners", &AttrValue::Int(443)).unwrap(), 443);
        assert!(parse_port(&key, "listeners", &AttrValue::Int(0)).is_err());
        assert!(parse_port(&key, "listeners", &AttrValue::Int(70000)).is_err());
        assert!(parse_port(&key, "listeners", &"80".into()).is_err());
    }
}

use super::common::{invalid, observed_field, parse_cidr, require_string, KindAdapter, KindSpec, Schema};
use crate::domain::entities::ResourceState;
use crate::domain::errors::StructuralError;
use shared_types::{Attributes, Cluster, ResourceDecl, ResourceKind};

/// Virtual network. Its address range cannot change in place; the routing
/// mode can.
pub struct NetworkSpec;

pub type NetworkAdapter = KindAdapter<NetworkSpec>;

impl KindSpec for NetworkSpec {
    const SCHEMA: Schema = Schema {
        kind: ResourceKind::Network,
        required: &["cidr"],
        optional: &["routing_mode"],
        immutable: &["cidr"],
        outputs: &["id", "self_link"],
    };

    fn validate(decl: &ResourceDecl, attributes: &Attributes, _cluster: &Cluster) -> Result<(), StructuralError> {
        if let Some(cidr) = require_string(&decl.key, attributes, "cidr")? {
            parse_cidr(&decl.key, "cidr", cidr)?;
        }
        if let Some(mode) = require_string(&decl.key, attributes, "routing_mode")? {
            if !matches!(mode, "regional" | "global") {
                return Err(invalid(&decl.key, "routing_mode", format!("{:?} is neither regional nor global", mode)));
            }
        }
        Ok(())
    }

    fn outputs(state: &ResourceState) -> Attributes {
        let mut outputs = Attributes::new();
        if let Some(link) = observed_field(state, "self_link") {
            outputs.insert("self_link".into(), link.clone());
        }
        outputs
    }
}

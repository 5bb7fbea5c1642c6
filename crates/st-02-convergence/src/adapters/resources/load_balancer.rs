use super::common::{invalid, observed_field, parse_port, require_reference, KindAdapter, KindSpec, Schema};
use crate::domain::entities::ResourceState;
use crate::domain::errors::StructuralError;
use shared_types::{AttrValue, Attributes, Cluster, ResourceDecl, ResourceKind};

/// External load balancer fronting a compute pool.
pub struct LoadBalancerSpec;

pub type LoadBalancerAdapter = KindAdapter<LoadBalancerSpec>;

impl KindSpec for LoadBalancerSpec {
    const SCHEMA: Schema = Schema {
        kind: ResourceKind::LoadBalancer,
        required: &["subnet", "listeners"],
        optional: &["targets"],
        immutable: &["subnet"],
        outputs: &["id", "address"],
    };

    fn validate(decl: &ResourceDecl, attributes: &Attributes, _cluster: &Cluster) -> Result<(), StructuralError> {
        require_reference(&decl.key, attributes, "subnet")?;
        require_reference(&decl.key, attributes, "targets")?;

        let listeners = attributes
            .get("listeners")
            .and_then(AttrValue::as_list)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| invalid(&decl.key, "listeners", "must be a non-empty list of ports"))?;
        for listener in listeners {
            parse_port(&decl.key, "listeners", listener)?;
        }
        Ok(())
    }

    fn outputs(state: &ResourceState) -> Attributes {
        let mut outputs = Attributes::new();
        if let Some(address) = observed_field(state, "address") {
            outputs.insert("address".into(), address.clone());
        }
        outputs
    }
}

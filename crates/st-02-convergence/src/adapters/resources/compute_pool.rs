use super::common::{invalid, observed_field, require_reference, require_string, KindAdapter, KindSpec, Schema};
use crate::domain::entities::ResourceState;
use crate::domain::errors::StructuralError;
use shared_types::{AttrValue, Attributes, Cluster, PoolRole, ResourceDecl, ResourceKey, ResourceKind};

/// Group of identical instances in one subnet.
///
/// `size` is either a fixed count or an autoscaling `{min, max}` range.
pub struct ComputePoolSpec;

pub type ComputePoolAdapter = KindAdapter<ComputePoolSpec>;

fn validate_size(key: &ResourceKey, size: &AttrValue) -> Result<(), StructuralError> {
    if let Some(count) = size.as_int() {
        if count < 0 {
            return Err(invalid(key, "size", "must not be negative"));
        }
        return Ok(());
    }

    let range = size
        .as_map()
        .ok_or_else(|| invalid(key, "size", format!("{} is neither a count nor a {{min, max}} range", size)))?;
    let bound = |name: &str| {
        range
            .get(name)
            .and_then(AttrValue::as_int)
            .filter(|v| *v >= 0)
            .ok_or_else(|| invalid(key, "size", format!("range needs a non-negative '{}'", name)))
    };
    let (min, max) = (bound("min")?, bound("max")?);
    if min > max {
        return Err(invalid(key, "size", format!("min {} exceeds max {}", min, max)));
    }
    Ok(())
}

impl KindSpec for ComputePoolSpec {
    const SCHEMA: Schema = Schema {
        kind: ResourceKind::ComputePool,
        required: &["subnet", "image", "machine_type", "size"],
        optional: &["role"],
        immutable: &["subnet", "role"],
        outputs: &["id", "instance_group"],
    };

    fn validate(decl: &ResourceDecl, attributes: &Attributes, _cluster: &Cluster) -> Result<(), StructuralError> {
        require_reference(&decl.key, attributes, "subnet")?;
        require_string(&decl.key, attributes, "image")?;
        require_string(&decl.key, attributes, "machine_type")?;

        if let Some(role) = require_string(&decl.key, attributes, "role")? {
            if PoolRole::parse(role).is_none() {
                return Err(invalid(&decl.key, "role", format!("'{}' is not master or node", role)));
            }
        }
        if let Some(size) = attributes.get("size") {
            validate_size(&decl.key, size)?;
        }
        Ok(())
    }

    fn outputs(state: &ResourceState) -> Attributes {
        let mut outputs = Attributes::new();
        if let Some(group) = observed_field(state, "instance_group") {
            outputs.insert("instance_group".into(), group.clone());
        }
        outputs
    }
}

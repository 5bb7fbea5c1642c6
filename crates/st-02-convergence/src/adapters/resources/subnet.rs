use super::common::{
    invalid, observed_field, parse_cidr, require_reference, require_string, KindAdapter, KindSpec,
    Schema,
};
use super::cidr::Ipv4Cidr;
use crate::domain::entities::ResourceState;
use crate::domain::errors::StructuralError;
use shared_types::{AttrValue, Attributes, Cluster, ResourceDecl, ResourceKind};

/// Subnet of a network, pinned to a zone.
pub struct SubnetSpec;

pub type SubnetAdapter = KindAdapter<SubnetSpec>;

impl KindSpec for SubnetSpec {
    const SCHEMA: Schema = Schema {
        kind: ResourceKind::Subnet,
        required: &["network", "cidr"],
        optional: &["zone"],
        immutable: &["network", "cidr", "zone"],
        outputs: &["id", "gateway"],
    };

    fn validate(decl: &ResourceDecl, attributes: &Attributes, cluster: &Cluster) -> Result<(), StructuralError> {
        require_reference(&decl.key, attributes, "network")?;
        require_string(&decl.key, attributes, "zone")?;

        let Some(raw) = require_string(&decl.key, attributes, "cidr")? else {
            return Ok(());
        };
        let cidr = parse_cidr(&decl.key, "cidr", raw)?;

        // Containment is checked against the declared network range
        let network_cidr = decl
            .attr("network")
            .and_then(AttrValue::as_ref_target)
            .and_then(|r| cluster.get(&r.key))
            .and_then(|network| network.attr("cidr"))
            .and_then(AttrValue::as_str)
            .and_then(|raw| raw.parse::<Ipv4Cidr>().ok());

        if let Some(network_cidr) = network_cidr {
            if !network_cidr.contains(&cidr) {
                return Err(invalid(
                    &decl.key,
                    "cidr",
                    format!("{} is outside network range {}", cidr, network_cidr),
                ));
            }
        }
        Ok(())
    }

    fn outputs(state: &ResourceState) -> Attributes {
        let mut outputs = Attributes::new();
        let gateway = observed_field(state, "cidr")
            .and_then(AttrValue::as_str)
            .and_then(|raw| raw.parse::<Ipv4Cidr>().ok())
            .map(|cidr| cidr.gateway());
        if let Some(gateway) = gateway {
            outputs.insert("gateway".into(), gateway.to_string().into());
        }
        outputs
    }
}

use super::common::{invalid, parse_cidr, parse_port, require_reference, KindAdapter, KindSpec, Schema};
use crate::domain::entities::ResourceState;
use crate::domain::errors::StructuralError;
use shared_types::{AttrValue, Attributes, Cluster, ResourceDecl, ResourceKey, ResourceKind};

const PROTOCOLS: &[&str] = &["tcp", "udp", "icmp"];

/// Ingress rules attached to a network.
///
/// `rules` is a list of `{protocol, ports}` maps; `ports` is required for
/// tcp and udp and must be absent for icmp.
pub struct FirewallSpec;

pub type FirewallAdapter = KindAdapter<FirewallSpec>;

fn validate_rule(key: &ResourceKey, rule: &AttrValue) -> Result<(), StructuralError> {
    let rule = rule
        .as_map()
        .ok_or_else(|| invalid(key, "rules", format!("rule {} is not a map", rule)))?;

    let protocol = rule
        .get("protocol")
        .and_then(AttrValue::as_str)
        .ok_or_else(|| invalid(key, "rules", "rule has no protocol"))?;
    if !PROTOCOLS.contains(&protocol) {
        return Err(invalid(key, "rules", format!("unknown protocol '{}'", protocol)));
    }

    match (protocol, rule.get("ports")) {
        ("icmp", None) => Ok(()),
        ("icmp", Some(_)) => Err(invalid(key, "rules", "icmp rules take no ports")),
        (_, None) => Err(invalid(key, "rules", format!("{} rule needs ports", protocol))),
        (_, Some(ports)) => {
            let ports = ports
                .as_list()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| invalid(key, "rules", "ports must be a non-empty list"))?;
            ports.iter().try_for_each(|p| parse_port(key, "rules", p).map(|_| ()))
        }
    }
}

impl KindSpec for FirewallSpec {
    const SCHEMA: Schema = Schema {
        kind: ResourceKind::Firewall,
        required: &["network", "rules"],
        optional: &["source_ranges"],
        immutable: &["network"],
        outputs: &["id"],
    };

    fn validate(decl: &ResourceDecl, attributes: &Attributes, _cluster: &Cluster) -> Result<(), StructuralError> {
        require_reference(&decl.key, attributes, "network")?;

        let rules = attributes
            .get("rules")
            .and_then(AttrValue::as_list)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| invalid(&decl.key, "rules", "must be a non-empty list"))?;
        for rule in rules {
            validate_rule(&decl.key, rule)?;
        }

        if let Some(ranges) = attributes.get("source_ranges") {
            let ranges = ranges
                .as_list()
                .ok_or_else(|| invalid(&decl.key, "source_ranges", "must be a list"))?;
            for range in ranges {
                let raw = range
                    .as_str()
                    .ok_or_else(|| invalid(&decl.key, "source_ranges", format!("{} is not a string", range)))?;
                parse_cidr(&decl.key, "source_ranges", raw)?;
            }
        }
        Ok(())
    }

    fn outputs(_state: &ResourceState) -> Attributes {
        Attributes::new()
    }
}

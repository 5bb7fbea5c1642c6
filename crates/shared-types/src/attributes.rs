//! # Attribute Values
//!
//! Declared resource attributes are a small typed tree. A leaf may be a
//! reference to another resource's rendered output, which is how the
//! dependency graph is discovered and how provider-assigned identifiers flow
//! from one resource into the next.

use crate::entities::ResourceKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute map keyed by attribute name (sorted for deterministic output).
pub type Attributes = BTreeMap<String, AttrValue>;

/// Output field every created resource renders.
pub const ID_FIELD: &str = "id";

fn default_ref_field() -> String {
    ID_FIELD.to_string()
}

/// Reference to a rendered output of another resource.
///
/// Serialized as `{"$ref": "subnet/public-a", "field": "id"}`; `field`
/// defaults to `id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttrRef {
    #[serde(rename = "$ref")]
    pub key: ResourceKey,
    #[serde(default = "default_ref_field")]
    pub field: String,
}

impl AttrRef {
    pub fn new(key: impl Into<ResourceKey>, field: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field: field.into(),
        }
    }

    /// Reference to the provider id of `key`.
    pub fn id(key: impl Into<ResourceKey>) -> Self {
        Self::new(key, ID_FIELD)
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.key, self.field)
    }
}

/// A declared or observed attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Unresolved reference to another resource's output.
    Ref(AttrRef),
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<AttrValue>),
    Map(Attributes),
}

impl AttrValue {
    /// All references contained in this value, depth first.
    pub fn references(&self) -> Vec<&AttrRef> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a AttrRef>) {
        match self {
            AttrValue::Ref(r) => out.push(r),
            AttrValue::List(items) => items.iter().for_each(|v| v.collect_references(out)),
            AttrValue::Map(map) => map.values().for_each(|v| v.collect_references(out)),
            _ => {}
        }
    }

    /// True when no reference remains anywhere in the value.
    pub fn is_resolved(&self) -> bool {
        match self {
            AttrValue::Ref(_) => false,
            AttrValue::List(items) => items.iter().all(AttrValue::is_resolved),
            AttrValue::Map(map) => map.values().all(AttrValue::is_resolved),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Attributes> {
        match self {
            AttrValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_ref_target(&self) -> Option<&AttrRef> {
        match self {
            AttrValue::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Parse a scalar from override syntax: `true`/`false`, then integer,
    /// otherwise the raw string.
    pub fn parse_scalar(raw: &str) -> Self {
        match raw {
            "true" => AttrValue::Bool(true),
            "false" => AttrValue::Bool(false),
            _ => raw
                .parse::<i64>()
                .map(AttrValue::Int)
                .unwrap_or_else(|_| AttrValue::Str(raw.to_string())),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Ref(r) => write!(f, "{}", r),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Str(s) => write!(f, "{:?}", s),
            AttrValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            AttrValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<AttrRef> for AttrValue {
    fn from(r: AttrRef) -> Self {
        AttrValue::Ref(r)
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(items: Vec<AttrValue>) -> Self {
        AttrValue::List(items)
    }
}

impl From<Attributes> for AttrValue {
    fn from(map: Attributes) -> Self {
        AttrValue::Map(map)
    }
}

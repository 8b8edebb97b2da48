// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host scene-graph node collaborator.
//!
//! The binding never owns attribute storage. Everything goes through
//! [`HostNode`], which a host integration implements for its node type.

use crate::error::HostError;
use crate::value::HostValue;
use serde::{Deserialize, Serialize};

/// Numeric storage kinds of host attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericKind {
    /// Boolean
    Boolean,
    /// Unsigned byte
    Byte,
    /// 16-bit integer
    Short,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Int64,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
}

/// Unit-carrying attribute kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    /// Angle, stored in degrees on the host
    Angle,
    /// Distance, stored in centimetres on the host
    Distance,
    /// Time, stored in seconds on the host
    Time,
}

impl UnitKind {
    /// Parse a `scalarUnit` metadata value
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "angle" => Some(Self::Angle),
            "distance" => Some(Self::Distance),
            "time" => Some(Self::Time),
            _ => None,
        }
    }
}

/// Typed data kinds of host attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// Integer array
    IntArray,
    /// Float array
    FloatArray,
    /// Double array
    DoubleArray,
    /// Vector array
    VectorArray,
    /// Point array
    PointArray,
    /// String array
    StringArray,
    /// Polygon mesh
    Mesh,
    /// Curves
    Curve,
}

/// Attribute type descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    /// Single numeric value
    Numeric(NumericKind),
    /// Three numeric values (float3 / double3)
    Numeric3(NumericKind),
    /// Unit-carrying double
    Unit(UnitKind),
    /// String
    String,
    /// 4x4 matrix
    Matrix,
    /// Typed data
    Data(DataKind),
    /// Compound with child attributes
    Compound,
    /// Opaque engine payload
    Opaque,
    /// Connection-only message attribute
    Message,
}

/// A host attribute as enumerated from the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    /// Attribute name
    pub name: String,
    /// Type descriptor
    pub ty: AttributeType,
    /// Whether this is an array (multi) attribute
    pub array: bool,
    /// Owning compound, for child attributes
    pub parent: Option<String>,
    /// Child attribute names, for compounds
    pub children: Vec<String>,
    /// Readable (can feed connections)
    pub readable: bool,
    /// Writable (can receive connections)
    pub writable: bool,
    /// Hidden from the UI
    pub hidden: bool,
    /// Added at runtime rather than part of the node type
    pub dynamic: bool,
}

impl AttributeInfo {
    /// Whether this attribute is top level
    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }
}

/// Request to create an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Attribute name
    pub name: String,
    /// Type descriptor
    pub ty: AttributeType,
    /// Array (multi) attribute
    pub array: bool,
    /// Readable
    pub readable: bool,
    /// Writable
    pub writable: bool,
    /// Hidden
    pub hidden: bool,
    /// Children, for compounds
    pub children: Vec<AttributeSpec>,
}

impl AttributeSpec {
    /// Create a readable, writable, non-array attribute spec
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
            array: false,
            readable: true,
            writable: true,
            hidden: false,
            children: Vec::new(),
        }
    }

    /// Create a compound spec
    pub fn compound(name: impl Into<String>, children: Vec<AttributeSpec>) -> Self {
        Self {
            children,
            ..Self::new(name, AttributeType::Compound)
        }
    }

    /// Mark as array
    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    /// Mark as hidden
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Set access flags on this spec and every child
    pub fn with_access(mut self, readable: bool, writable: bool) -> Self {
        self.readable = readable;
        self.writable = writable;
        self.children = self
            .children
            .into_iter()
            .map(|c| c.with_access(readable, writable))
            .collect();
        self
    }
}

/// Host capabilities that change binding behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// The host can remove and recreate an attribute safely
    pub recreate_attributes: bool,
    /// The host can hold a mesh with no polygons
    pub empty_mesh: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            recreate_attributes: true,
            empty_mesh: true,
        }
    }
}

/// An attribute with its resolved children
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTree {
    /// This attribute
    pub info: AttributeInfo,
    /// Resolved children in declaration order
    pub children: Vec<AttributeTree>,
}

impl AttributeTree {
    /// Resolve an attribute and its children from a host
    pub fn resolve(host: &dyn HostNode, name: &str) -> Option<Self> {
        let info = host.attribute(name)?;
        let children = info
            .children
            .iter()
            .filter_map(|child| Self::resolve(host, child))
            .collect();
        Some(Self { info, children })
    }

    /// Attribute name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Same attribute viewed as a single element of its array
    pub fn element(&self) -> AttributeTree {
        let mut element = self.clone();
        element.info.array = false;
        element
    }
}

/// Host scene-graph node accessor
pub trait HostNode {
    /// Node name, unique within the scene
    fn node_name(&self) -> String;

    /// Every attribute, children included, in declaration order
    fn attributes(&self) -> Vec<AttributeInfo>;

    /// One attribute by name
    fn attribute(&self, name: &str) -> Option<AttributeInfo>;

    /// Read a value by attribute path (`name`, `name[2]`, `name[2].child`)
    fn value(&self, path: &str) -> Result<HostValue, HostError>;

    /// Write a value by attribute path
    fn set_value(&mut self, path: &str, value: HostValue) -> Result<(), HostError>;

    /// Add a dynamic attribute
    fn add_attribute(&mut self, spec: AttributeSpec) -> Result<(), HostError>;

    /// Remove a dynamic attribute and its children
    fn remove_attribute(&mut self, name: &str) -> Result<(), HostError>;

    /// Rename an attribute
    fn rename_attribute(&mut self, old: &str, new: &str) -> Result<(), HostError>;

    /// Mark an attribute's stored value clean
    fn set_clean(&mut self, name: &str);

    /// Upstream plugs connected into this attribute (`node.attr`)
    fn connections(&self, name: &str) -> Vec<String>;

    /// Host capabilities
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::default()
    }

    /// Current evaluation time in seconds
    fn current_time(&self) -> f64 {
        0.0
    }

    /// Path of the last loaded scene
    fn scene_path(&self) -> String {
        String::new()
    }

    /// Whether an attribute exists
    fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
}

/// Split an attribute path into top-level name and the remainder
///
/// `pos[2].posX` becomes (`pos`, Some(2), Some(`posX`)).
pub fn split_path(path: &str) -> (&str, Option<usize>, Option<&str>) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    match head.split_once('[') {
        Some((name, index)) => {
            let index = index.trim_end_matches(']').parse().ok();
            (name, index, rest)
        }
        None => (head, None, rest),
    }
}

/// Attribute part of a `node.attr` plug name
pub fn plug_attribute(plug: &str) -> &str {
    plug.split_once('.').map_or(plug, |(_, attr)| attr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("pos"), ("pos", None, None));
        assert_eq!(split_path("pos[2]"), ("pos", Some(2), None));
        assert_eq!(split_path("pos[2].posX"), ("pos", Some(2), Some("posX")));
        assert_eq!(split_path("pos[-1]"), ("pos", None, None));
        assert_eq!(plug_attribute("node1.weight"), "weight");
        assert_eq!(plug_attribute("weight"), "weight");
    }

    #[test]
    fn test_spec_access_propagates() {
        let spec = AttributeSpec::compound(
            "pos",
            vec![AttributeSpec::new("posX", AttributeType::Numeric(NumericKind::Double))],
        )
        .with_access(true, false);
        assert!(!spec.writable);
        assert!(!spec.children[0].writable);
    }
}

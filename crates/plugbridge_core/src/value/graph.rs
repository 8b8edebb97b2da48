// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine-native values.

use crate::numeric::{Scalar, ScalarArray};
use crate::types::{BaseType, FixedKind, ResolvedType, StructLayout, ARRAY_MARKER, MAX_STRUCT_DEPTH};
use crate::value::geometry::{Lines, PolygonMesh};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A typed value owned by the engine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum GraphValue {
    /// No value (null object or unset argument)
    #[default]
    Null,
    /// Numeric scalar
    Scalar(Scalar),
    /// String
    String(String),
    /// Fixed-size vector or matrix, components row major
    Fixed(FixedKind, Vec<f32>),
    /// Struct instance
    Struct(StructValue),
    /// Variable-size array
    Array(GraphArray),
    /// Polygon mesh object
    PolygonMesh(PolygonMesh),
    /// Lines object
    Lines(Lines),
}

/// Struct instance with named fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructValue {
    /// Struct type name
    pub type_name: String,
    /// Field values in declaration order
    pub fields: IndexMap<String, GraphValue>,
}

/// Variable-size engine array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphArray {
    /// Homogeneous numeric elements in one buffer
    Scalars(ScalarArray),
    /// Fixed-size elements flattened into one float buffer
    Fixed {
        /// Element kind
        kind: FixedKind,
        /// `len * kind.components()` floats
        data: Vec<f32>,
    },
    /// Strings
    Strings(Vec<String>),
    /// Per-element boxed values (structs, geometry)
    Boxed {
        /// Element type name
        element_type: String,
        /// Elements
        items: Vec<GraphValue>,
    },
}

impl GraphArray {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            Self::Scalars(array) => array.len(),
            Self::Fixed { kind, data } => data.len() / kind.components(),
            Self::Strings(items) => items.len(),
            Self::Boxed { items, .. } => items.len(),
        }
    }

    /// Whether the array is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type name
    pub fn element_type(&self) -> String {
        match self {
            Self::Scalars(array) => array.kind().name().to_string(),
            Self::Fixed { kind, .. } => kind.name().to_string(),
            Self::Strings(_) => "String".to_string(),
            Self::Boxed { element_type, .. } => element_type.clone(),
        }
    }

    /// Element at `index` as a standalone value
    pub fn get(&self, index: usize) -> Option<GraphValue> {
        match self {
            Self::Scalars(array) => array.get(index).map(GraphValue::Scalar),
            Self::Fixed { kind, data } => {
                let n = kind.components();
                data.get(index * n..index * n + n)
                    .map(|chunk| GraphValue::Fixed(*kind, chunk.to_vec()))
            }
            Self::Strings(items) => items.get(index).cloned().map(GraphValue::String),
            Self::Boxed { items, .. } => items.get(index).cloned(),
        }
    }
}

impl GraphValue {
    /// 32-bit float scalar
    pub fn float32(value: f32) -> Self {
        Self::Scalar(Scalar::Float32(value))
    }

    /// 64-bit float scalar
    pub fn float64(value: f64) -> Self {
        Self::Scalar(Scalar::Float64(value))
    }

    /// 3D vector
    pub fn vec3(x: f32, y: f32, z: f32) -> Self {
        Self::Fixed(FixedKind::Vec3, vec![x, y, z])
    }

    /// The engine type name of this value
    pub fn type_name(&self) -> String {
        match self {
            Self::Null => "None".to_string(),
            Self::Scalar(s) => s.kind().name().to_string(),
            Self::String(_) => "String".to_string(),
            Self::Fixed(kind, _) => kind.name().to_string(),
            Self::Struct(s) => s.type_name.clone(),
            Self::Array(array) => format!("{}{}", array.element_type(), ARRAY_MARKER),
            Self::PolygonMesh(_) => "PolygonMesh".to_string(),
            Self::Lines(_) => "Lines".to_string(),
        }
    }

    /// Whether this value is an array
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// The scalar inside, if any
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Self::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Fixed-size components, if any
    pub fn as_fixed(&self) -> Option<(FixedKind, &[f32])> {
        match self {
            Self::Fixed(kind, data) => Some((*kind, data.as_slice())),
            _ => None,
        }
    }

    /// Default value for a resolved type
    ///
    /// `layouts` resolves struct type names; unknown structs, and structs
    /// nested too deeply to be anything but cyclic, default to `Null`.
    pub fn default_for(
        resolved: &ResolvedType,
        layouts: &dyn Fn(&str) -> Option<StructLayout>,
    ) -> GraphValue {
        Self::default_at(resolved, layouts, 0)
    }

    fn default_at(
        resolved: &ResolvedType,
        layouts: &dyn Fn(&str) -> Option<StructLayout>,
        depth: usize,
    ) -> GraphValue {
        let base = resolved.base_type();
        if resolved.is_array {
            return GraphValue::Array(match base {
                BaseType::Scalar(kind) => GraphArray::Scalars(ScalarArray::empty(kind)),
                BaseType::Fixed(kind) => GraphArray::Fixed {
                    kind,
                    data: Vec::new(),
                },
                BaseType::String => GraphArray::Strings(Vec::new()),
                BaseType::PolygonMesh | BaseType::Lines | BaseType::Struct(_) => {
                    GraphArray::Boxed {
                        element_type: resolved.base.clone(),
                        items: Vec::new(),
                    }
                }
            });
        }
        match base {
            BaseType::Scalar(kind) => GraphValue::Scalar(Scalar::zero(kind)),
            BaseType::String => GraphValue::String(String::new()),
            BaseType::Fixed(kind) => GraphValue::Fixed(kind, identity_components(kind)),
            BaseType::PolygonMesh => GraphValue::PolygonMesh(PolygonMesh::default()),
            BaseType::Lines => GraphValue::Lines(Lines::default()),
            BaseType::Struct(name) if depth >= MAX_STRUCT_DEPTH => {
                tracing::warn!(type_name = %name, "Struct nests too deeply, defaulting to null");
                GraphValue::Null
            }
            BaseType::Struct(name) => match layouts(&name) {
                Some(layout) => GraphValue::Struct(StructValue {
                    type_name: name,
                    fields: layout
                        .fields
                        .iter()
                        .map(|field| {
                            let ty = ResolvedType::parse(&field.resolved_type);
                            (field.name.clone(), GraphValue::default_at(&ty, layouts, depth + 1))
                        })
                        .collect(),
                }),
                None => GraphValue::Null,
            },
        }
    }
}

/// Neutral components for a fixed kind (identity for matrices and quaternions)
pub fn identity_components(kind: FixedKind) -> Vec<f32> {
    let n = kind.components();
    let mut data = vec![0.0; n];
    match kind {
        FixedKind::Mat33 => {
            for i in 0..3 {
                data[i * 3 + i] = 1.0;
            }
        }
        FixedKind::Mat44 => {
            for i in 0..4 {
                data[i * 4 + i] = 1.0;
            }
        }
        FixedKind::Quat | FixedKind::Color => data[3] = 1.0,
        _ => {}
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_layouts(_: &str) -> Option<StructLayout> {
        None
    }

    #[test]
    fn test_type_names() {
        assert_eq!(GraphValue::float32(1.0).type_name(), "Float32");
        assert_eq!(GraphValue::vec3(0.0, 0.0, 0.0).type_name(), "Vec3");
        let array = GraphValue::Array(GraphArray::Fixed {
            kind: FixedKind::Vec3,
            data: vec![0.0; 6],
        });
        assert_eq!(array.type_name(), "Vec3[]");
    }

    #[test]
    fn test_fixed_array_elements() {
        let array = GraphArray::Fixed {
            kind: FixedKind::Vec2,
            data: vec![1.0, 2.0, 3.0, 4.0],
        };
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(1), Some(GraphValue::Fixed(FixedKind::Vec2, vec![3.0, 4.0])));
        assert_eq!(array.get(2), None);
    }

    #[test]
    fn test_defaults() {
        let mat = GraphValue::default_for(&ResolvedType::parse("Mat44"), &no_layouts);
        let (_, data) = mat.as_fixed().unwrap();
        assert_eq!(data[0], 1.0);
        assert_eq!(data[5], 1.0);
        assert_eq!(data[1], 0.0);

        let layout = StructLayout::new("Pair", &[("a", "SInt32"), ("b", "Vec3")]);
        let layouts = move |name: &str| (name == "Pair").then(|| layout.clone());
        let value = GraphValue::default_for(&ResolvedType::parse("Pair"), &layouts);
        match value {
            GraphValue::Struct(s) => {
                assert_eq!(s.fields.len(), 2);
                assert_eq!(s.fields["a"], GraphValue::Scalar(Scalar::SInt32(0)));
            }
            other => panic!("expected struct, got {other:?}"),
        }

        let unknown = GraphValue::default_for(&ResolvedType::parse("Mystery"), &no_layouts);
        assert_eq!(unknown, GraphValue::Null);
    }

    #[test]
    fn test_cyclic_struct_default_terminates() {
        let layout = StructLayout::new("Node", &[("value", "Float32"), ("next", "Node")]);
        let layouts = move |name: &str| (name == "Node").then(|| layout.clone());
        let mut value = GraphValue::default_for(&ResolvedType::parse("Node"), &layouts);
        let mut depth = 0;
        while let GraphValue::Struct(s) = value {
            depth += 1;
            value = s.fields["next"].clone();
        }
        assert_eq!(depth, MAX_STRUCT_DEPTH);
        assert_eq!(value, GraphValue::Null);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host attribute creation from engine port types.

use crate::engine::{meta, EngineGraph, PortDirection, PortInfo};
use crate::error::{BindError, Result};
use crate::host::{AttributeSpec, AttributeType, DataKind, NumericKind, UnitKind};
use crate::port_index::attribute_name_for_port;
use crate::types::{BaseType, FixedKind, ResolvedType, ScalarKind, MAX_STRUCT_DEPTH};

/// Attribute spec exposing `port` on the host
///
/// `Ok(None)` when the port asks for no attribute (`addAttribute=false`).
/// Types that cannot be represented fail with [`BindError::StructuralMismatch`].
pub fn attribute_spec(port: &PortInfo, graph: &dyn EngineGraph) -> Result<Option<AttributeSpec>> {
    let port_meta = |key: &str| graph.port_metadata(&port.name, key);
    if port_meta(meta::ADD_ATTRIBUTE).is_some_and(|v| v == "false") {
        return Ok(None);
    }
    let name = attribute_name_for_port(&port.name);
    let (readable, writable) = match port.direction {
        PortDirection::In | PortDirection::Io => (true, true),
        PortDirection::Out => (true, false),
    };

    if port_meta(meta::OPAQUE).is_some_and(|v| v == "true") {
        return Ok(Some(
            AttributeSpec::new(name, AttributeType::Opaque).with_access(readable, writable),
        ));
    }

    let resolved = port.resolved();
    let unit = port_meta(meta::SCALAR_UNIT).and_then(|v| UnitKind::parse(&v));
    let native = port_meta(meta::NATIVE_ARRAY).is_some_and(|v| v == "true");
    let base = resolved.base_type();

    let spec = if resolved.is_array {
        match data_kind_for_array(&base, native) {
            Some(kind) => AttributeSpec::new(name, AttributeType::Data(kind)),
            None => element_spec(&name, &port.name, &base, unit, graph, 0)?.array(),
        }
    } else {
        element_spec(&name, &port.name, &base, unit, graph, 0)?
    };
    Ok(Some(spec.with_access(readable, writable)))
}

/// Bulk data kind for an array port, when one fits
fn data_kind_for_array(base: &BaseType, native: bool) -> Option<DataKind> {
    match base {
        BaseType::String => Some(DataKind::StringArray),
        _ if !native => None,
        BaseType::Scalar(ScalarKind::Float32) => Some(DataKind::FloatArray),
        BaseType::Scalar(ScalarKind::Float64) => Some(DataKind::DoubleArray),
        BaseType::Scalar(kind) if kind.is_integer() => Some(DataKind::IntArray),
        BaseType::Fixed(FixedKind::Vec3) => Some(DataKind::VectorArray),
        BaseType::Fixed(FixedKind::Vec4 | FixedKind::Color) => Some(DataKind::PointArray),
        _ => None,
    }
}

fn numeric_kind(kind: ScalarKind) -> NumericKind {
    match kind {
        ScalarKind::Boolean => NumericKind::Boolean,
        ScalarKind::SInt8
        | ScalarKind::UInt8
        | ScalarKind::SInt16
        | ScalarKind::UInt16
        | ScalarKind::SInt32 => NumericKind::Int,
        ScalarKind::UInt32 | ScalarKind::SInt64 | ScalarKind::UInt64 => NumericKind::Int64,
        ScalarKind::Float32 => NumericKind::Float,
        ScalarKind::Float64 => NumericKind::Double,
    }
}

fn element_spec(
    name: &str,
    port: &str,
    base: &BaseType,
    unit: Option<UnitKind>,
    graph: &dyn EngineGraph,
    depth: usize,
) -> Result<AttributeSpec> {
    let ty = match base {
        BaseType::Scalar(kind) => match unit {
            Some(unit) if kind.is_float() => AttributeType::Unit(unit),
            _ => AttributeType::Numeric(numeric_kind(*kind)),
        },
        BaseType::String => AttributeType::String,
        BaseType::Fixed(FixedKind::Color) => AttributeType::Numeric3(NumericKind::Float),
        BaseType::Fixed(kind) if kind.is_matrix() => AttributeType::Matrix,
        BaseType::Fixed(kind) => {
            let child_type = if *kind == FixedKind::Euler {
                AttributeType::Unit(UnitKind::Angle)
            } else {
                AttributeType::Numeric(NumericKind::Double)
            };
            let children = kind
                .component_suffixes()
                .iter()
                .map(|suffix| AttributeSpec::new(format!("{name}{suffix}"), child_type))
                .collect();
            return Ok(AttributeSpec::compound(name, children));
        }
        BaseType::PolygonMesh => AttributeType::Data(DataKind::Mesh),
        BaseType::Lines => AttributeType::Data(DataKind::Curve),
        BaseType::Struct(type_name) => {
            let mismatch = |reason: String| BindError::StructuralMismatch {
                name: port.to_string(),
                reason,
            };
            if depth >= MAX_STRUCT_DEPTH {
                return Err(mismatch(format!("struct '{type_name}' nests too deeply")));
            }
            let layout = graph
                .struct_layout(type_name)
                .ok_or_else(|| mismatch(format!("unknown type '{type_name}'")))?;
            let mut children = Vec::with_capacity(layout.fields.len());
            for field in &layout.fields {
                let field_type = ResolvedType::parse(&field.resolved_type);
                let child_name = format!("{name}_{}", field.name);
                let field_base = field_type.base_type();
                let child = if field_type.is_array {
                    match data_kind_for_array(&field_base, false) {
                        Some(kind) => AttributeSpec::new(child_name, AttributeType::Data(kind)),
                        None => element_spec(&child_name, port, &field_base, None, graph, depth + 1)?
                            .array(),
                    }
                } else {
                    element_spec(&child_name, port, &field_base, None, graph, depth + 1)?
                };
                children.push(child);
            }
            return Ok(AttributeSpec::compound(name, children));
        }
    };
    Ok(AttributeSpec::new(name, ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::test_support::StubGraph;
    use crate::types::StructLayout;

    fn spec(graph: &StubGraph, direction: PortDirection, resolved: &str) -> Result<Option<AttributeSpec>> {
        attribute_spec(&PortInfo::new("p", direction, resolved), graph)
    }

    #[test]
    fn test_scalar_mapping() {
        let graph = StubGraph::default();
        let s = spec(&graph, PortDirection::In, "UInt8").unwrap().unwrap();
        assert_eq!(s.ty, AttributeType::Numeric(NumericKind::Int));
        let s = spec(&graph, PortDirection::In, "UInt64").unwrap().unwrap();
        assert_eq!(s.ty, AttributeType::Numeric(NumericKind::Int64));
        let s = spec(&graph, PortDirection::Out, "Float32").unwrap().unwrap();
        assert_eq!(s.ty, AttributeType::Numeric(NumericKind::Float));
        assert!(!s.writable);
    }

    #[test]
    fn test_vec3_becomes_xyz_compound() {
        let graph = StubGraph::default();
        let s = spec(&graph, PortDirection::In, "Vec3").unwrap().unwrap();
        assert_eq!(s.ty, AttributeType::Compound);
        let names: Vec<_> = s.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["pX", "pY", "pZ"]);
    }

    #[test]
    fn test_arrays_multi_or_native() {
        let mut graph = StubGraph::default();
        let s = spec(&graph, PortDirection::In, "Float64[]").unwrap().unwrap();
        assert!(s.array);
        assert_eq!(s.ty, AttributeType::Numeric(NumericKind::Double));

        graph
            .metadata
            .insert(("p".into(), meta::NATIVE_ARRAY.into()), "true".into());
        let s = spec(&graph, PortDirection::In, "Float64[]").unwrap().unwrap();
        assert!(!s.array);
        assert_eq!(s.ty, AttributeType::Data(DataKind::DoubleArray));
    }

    #[test]
    fn test_metadata_flags() {
        let mut graph = StubGraph::default();
        graph
            .metadata
            .insert(("p".into(), meta::SCALAR_UNIT.into()), "angle".into());
        let s = spec(&graph, PortDirection::In, "Float32").unwrap().unwrap();
        assert_eq!(s.ty, AttributeType::Unit(UnitKind::Angle));

        graph
            .metadata
            .insert(("p".into(), meta::ADD_ATTRIBUTE.into()), "false".into());
        assert!(spec(&graph, PortDirection::In, "Float32").unwrap().is_none());
    }

    #[test]
    fn test_struct_children_and_unknown_types() {
        let mut graph = StubGraph::default();
        graph
            .layouts
            .push(StructLayout::new("Xfo", &[("tr", "Vec3"), ("weight", "Float32")]));
        let s = spec(&graph, PortDirection::In, "Xfo").unwrap().unwrap();
        assert_eq!(s.children[0].name, "p_tr");
        assert_eq!(s.children[0].children[0].name, "p_trX");
        assert_eq!(s.children[1].name, "p_weight");

        let err = spec(&graph, PortDirection::In, "Mystery").unwrap_err();
        assert!(matches!(err, BindError::StructuralMismatch { .. }));
    }

    #[test]
    fn test_remapped_port_name() {
        let graph = StubGraph::default();
        let s = attribute_spec(&PortInfo::new("message", PortDirection::Out, "String"), &graph)
            .unwrap()
            .unwrap();
        assert_eq!(s.name, "graph_message");
    }
}

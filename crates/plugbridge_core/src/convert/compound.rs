// SPDX-License-Identifier: MIT OR Apache-2.0
//! Struct converters: engine struct ↔ host compound, field by field.

use super::{ConverterPair, PortContext};
use crate::error::ConversionError;
use crate::host::AttributeTree;
use crate::types::{ResolvedType, StructLayout};
use crate::value::{GraphArray, GraphValue, HostValue, StructValue};
use indexmap::IndexMap;

/// Any struct type the engine declares a layout for
pub const STRUCT: ConverterPair = ConverterPair {
    to_engine: struct_to_engine,
    to_host: struct_to_host,
};

/// Whether host child `child` of compound `parent` stands for `field`
///
/// Accepts `field`, `<parent>field` and `<parent>_field`, ignoring case.
pub fn field_matches(parent: &str, child: &str, field: &str) -> bool {
    if child.eq_ignore_ascii_case(field) {
        return true;
    }
    let stripped = strip_prefix_ignore_case(child, parent).unwrap_or(child);
    let stripped = stripped.strip_prefix('_').unwrap_or(stripped);
    stripped.eq_ignore_ascii_case(field)
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Index of the compound child matching `field`
pub fn find_child(tree: &AttributeTree, field: &str) -> Option<usize> {
    tree.children
        .iter()
        .position(|child| field_matches(tree.name(), child.name(), field))
}

fn layout(ctx: &PortContext<'_>) -> Result<StructLayout, ConversionError> {
    ctx.graph
        .struct_layout(&ctx.resolved.base)
        .ok_or_else(|| ConversionError::Unsupported(ctx.resolved.base.clone()))
}

fn single_to_engine(
    ctx: &PortContext<'_>,
    layout: &StructLayout,
    value: &HostValue,
    current: &GraphValue,
) -> Result<GraphValue, ConversionError> {
    let HostValue::Compound(values) = value else {
        return Err(ctx.host_shape(value));
    };
    let layouts = |name: &str| ctx.graph.struct_layout(name);
    let mut fields = IndexMap::with_capacity(layout.fields.len());
    for field in &layout.fields {
        let field_type = ResolvedType::parse(&field.resolved_type);
        let existing = match current {
            GraphValue::Struct(s) => s.fields.get(&field.name).cloned(),
            _ => None,
        }
        .unwrap_or_else(|| GraphValue::default_for(&field_type, &layouts));

        let converted = match find_child(ctx.attribute, &field.name) {
            Some(index) => match values.get(index) {
                Some(HostValue::Empty) | None => existing,
                Some(child_value) => {
                    let child = &ctx.attribute.children[index];
                    let fctx = ctx.with_attribute(child, field_type);
                    ctx.registry.to_engine(&fctx, child_value, &existing)?
                }
            },
            None => {
                tracing::debug!(
                    attribute = ctx.attribute.name(),
                    field = %field.name,
                    "No host child for struct field, keeping engine value"
                );
                existing
            }
        };
        fields.insert(field.name.clone(), converted);
    }
    Ok(GraphValue::Struct(StructValue {
        type_name: layout.name.clone(),
        fields,
    }))
}

fn single_to_host(ctx: &PortContext<'_>, value: &GraphValue) -> Result<HostValue, ConversionError> {
    let GraphValue::Struct(s) = value else {
        return Err(ctx.engine_shape(value));
    };
    let layout = layout(ctx)?;
    let mut children = Vec::with_capacity(ctx.attribute.children.len());
    for child in &ctx.attribute.children {
        let field = layout
            .fields
            .iter()
            .find(|f| field_matches(ctx.attribute.name(), child.name(), &f.name));
        let converted = match field.and_then(|f| s.fields.get(&f.name).map(|v| (f, v))) {
            Some((field, field_value)) => {
                let fctx = ctx.with_attribute(child, ResolvedType::parse(&field.resolved_type));
                ctx.registry.to_host(&fctx, field_value)?
            }
            None => HostValue::Empty,
        };
        children.push(converted);
    }
    Ok(HostValue::Compound(children))
}

fn struct_to_engine(
    ctx: &PortContext<'_>,
    value: &HostValue,
    current: &GraphValue,
) -> Result<GraphValue, ConversionError> {
    let layout = layout(ctx)?;
    if !ctx.is_array() {
        return single_to_engine(ctx, &layout, value, current);
    }
    let items = match value {
        HostValue::Multi(items) => items.as_slice(),
        HostValue::Empty => &[],
        other => return Err(ctx.host_shape(other)),
    };
    let element = ctx.attribute.element();
    let ectx = ctx.with_attribute(&element, ctx.element_type());
    let converted = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let existing = match current {
                GraphValue::Array(array) => array.get(i).unwrap_or_default(),
                _ => GraphValue::Null,
            };
            single_to_engine(&ectx, &layout, item, &existing)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(GraphValue::Array(GraphArray::Boxed {
        element_type: layout.name,
        items: converted,
    }))
}

fn struct_to_host(ctx: &PortContext<'_>, value: &GraphValue) -> Result<HostValue, ConversionError> {
    if !ctx.is_array() {
        return single_to_host(ctx, value);
    }
    let items = match value {
        GraphValue::Array(GraphArray::Boxed { items, .. }) => items.as_slice(),
        GraphValue::Null => &[],
        other => return Err(ctx.engine_shape(other)),
    };
    if !ctx.attribute.info.array {
        return Err(ctx.engine_shape(value));
    }
    let element = ctx.attribute.element();
    let ectx = ctx.with_attribute(&element, ctx.element_type());
    items
        .iter()
        .map(|item| single_to_host(&ectx, item))
        .collect::<Result<Vec<_>, _>>()
        .map(HostValue::Multi)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::ConverterRegistry;
    use super::*;
    use crate::host::{AttributeType, HostCapabilities, NumericKind};
    use crate::numeric::Scalar;

    fn xfo_graph() -> StubGraph {
        let mut graph = StubGraph::default();
        graph
            .layouts
            .push(StructLayout::new("Xfo", &[("tr", "Vec3"), ("weight", "Float32")]));
        graph
    }

    fn xfo_attribute() -> AttributeTree {
        compound(
            "xfo",
            vec![
                xyz("xfo_tr"),
                leaf("xfoWeight", AttributeType::Numeric(NumericKind::Float)),
            ],
        )
    }

    #[test]
    fn test_field_matching_is_tolerant() {
        assert!(field_matches("xfo", "xfo_tr", "tr"));
        assert!(field_matches("xfo", "xfoWeight", "weight"));
        assert!(field_matches("xfo", "TR", "tr"));
        assert!(!field_matches("xfo", "xfo_scale", "tr"));
    }

    #[test]
    fn test_struct_round_trip() {
        let registry = ConverterRegistry::new();
        let graph = xfo_graph();
        let p = port("Xfo");
        let attr = xfo_attribute();
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let value = HostValue::Compound(vec![
            HostValue::Compound(vec![
                HostValue::Double(1.0),
                HostValue::Double(2.0),
                HostValue::Double(3.0),
            ]),
            HostValue::Float(0.5),
        ]);
        let engine = (STRUCT.to_engine)(&ctx, &value, &GraphValue::Null).unwrap();
        match &engine {
            GraphValue::Struct(s) => {
                assert_eq!(s.fields["tr"], GraphValue::vec3(1.0, 2.0, 3.0));
                assert_eq!(s.fields["weight"], GraphValue::Scalar(Scalar::Float32(0.5)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!((STRUCT.to_host)(&ctx, &engine).unwrap(), value);
    }

    #[test]
    fn test_missing_child_keeps_current_field() {
        let registry = ConverterRegistry::new();
        let graph = xfo_graph();
        let p = port("Xfo");
        let attr = compound("xfo", vec![xyz("xfo_tr")]);
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let mut fields = IndexMap::new();
        fields.insert("tr".to_string(), GraphValue::vec3(0.0, 0.0, 0.0));
        fields.insert("weight".to_string(), GraphValue::float32(7.0));
        let current = GraphValue::Struct(StructValue {
            type_name: "Xfo".into(),
            fields,
        });
        let value = HostValue::Compound(vec![HostValue::Compound(vec![
            HostValue::Double(1.0),
            HostValue::Double(1.0),
            HostValue::Double(1.0),
        ])]);
        let engine = (STRUCT.to_engine)(&ctx, &value, &current).unwrap();
        match engine {
            GraphValue::Struct(s) => assert_eq!(s.fields["weight"], GraphValue::float32(7.0)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_struct_array_per_element() {
        let registry = ConverterRegistry::new();
        let graph = xfo_graph();
        let p = port("Xfo[]");
        let mut attr = xfo_attribute();
        attr.info.array = true;
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let element = HostValue::Compound(vec![
            HostValue::Compound(vec![
                HostValue::Double(0.0),
                HostValue::Double(1.0),
                HostValue::Double(0.0),
            ]),
            HostValue::Float(1.0),
        ]);
        let value = HostValue::Multi(vec![element.clone(), element]);
        let engine = (STRUCT.to_engine)(&ctx, &value, &GraphValue::Null).unwrap();
        assert_eq!(engine.type_name(), "Xfo[]");
        assert_eq!((STRUCT.to_host)(&ctx, &engine).unwrap(), value);
    }
}

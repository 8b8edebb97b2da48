// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fixed-size vector and matrix converters.
//!
//! Host compounds named `<name>X/<name>Y/<name>Z` (or `R/G/B/A`, `X/Y/Z/W`)
//! map component by component onto the vector type, matched by suffix, so no
//! struct layout is needed for them.

use super::scalar::host_numeric;
use super::{ConverterPair, PortContext};
use crate::error::ConversionError;
use crate::host::{AttributeTree, AttributeType, DataKind, NumericKind, UnitKind};
use crate::numeric::Scalar;
use crate::types::{BaseType, FixedKind};
use crate::value::graph::identity_components;
use crate::value::{GraphArray, GraphValue, HostValue};

/// Every [`FixedKind`]
pub const FIXED: ConverterPair = ConverterPair {
    to_engine: fixed_to_engine,
    to_host: fixed_to_host,
};

/// Child indices of a compound ordered by the component suffixes of `kind`
///
/// Returns `None` unless every component has a child named `<parent><suffix>`.
pub fn component_children(tree: &AttributeTree, kind: FixedKind) -> Option<Vec<usize>> {
    let suffixes = kind.component_suffixes();
    if suffixes.is_empty() || tree.children.len() != suffixes.len() {
        return None;
    }
    suffixes
        .iter()
        .map(|suffix| {
            let expected = format!("{}{}", tree.name(), suffix);
            tree.children
                .iter()
                .position(|child| child.name().eq_ignore_ascii_case(&expected))
        })
        .collect()
}

fn fixed_kind(ctx: &PortContext<'_>) -> Result<FixedKind, ConversionError> {
    match ctx.base_type() {
        BaseType::Fixed(kind) => Ok(kind),
        _ => Err(ConversionError::Unsupported(ctx.resolved.to_string())),
    }
}

fn holds_angles(tree: &AttributeTree) -> bool {
    tree.children
        .iter()
        .any(|child| child.info.ty == AttributeType::Unit(UnitKind::Angle))
}

/// Fill `kind` from leading components, identity elsewhere
fn fit(kind: FixedKind, components: &[f64]) -> Vec<f32> {
    let mut data = identity_components(kind);
    for (slot, value) in data.iter_mut().zip(components) {
        *slot = *value as f32;
    }
    data
}

fn matrix_to_engine(kind: FixedKind, m: &[f64; 16]) -> Option<Vec<f32>> {
    match kind {
        FixedKind::Mat44 => Some(m.iter().map(|v| *v as f32).collect()),
        FixedKind::Mat33 => Some(
            (0..3)
                .flat_map(|row| (0..3).map(move |col| m[row * 4 + col] as f32))
                .collect(),
        ),
        _ => None,
    }
}

fn matrix_to_host(kind: FixedKind, data: &[f32]) -> Option<[f64; 16]> {
    let mut m = [0.0; 16];
    match kind {
        FixedKind::Mat44 if data.len() == 16 => {
            for (slot, v) in m.iter_mut().zip(data) {
                *slot = f64::from(*v);
            }
        }
        FixedKind::Mat33 if data.len() == 9 => {
            for row in 0..3 {
                for col in 0..3 {
                    m[row * 4 + col] = f64::from(data[row * 3 + col]);
                }
            }
            m[15] = 1.0;
        }
        _ => return None,
    }
    Some(m)
}

fn single_to_engine(
    ctx: &PortContext<'_>,
    kind: FixedKind,
    value: &HostValue,
) -> Result<Vec<f32>, ConversionError> {
    if let HostValue::Matrix(m) = value {
        return matrix_to_engine(kind, m).ok_or_else(|| ctx.host_shape(value));
    }
    let mut components = value.components().ok_or_else(|| ctx.host_shape(value))?;
    if let HostValue::Compound(_) = value {
        if let Some(order) = component_children(ctx.attribute, kind) {
            components = order
                .iter()
                .map(|i| components.get(*i).copied())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| ctx.host_shape(value))?;
        }
    }
    if kind == FixedKind::Euler && holds_angles(ctx.attribute) {
        components.iter_mut().for_each(|c| *c = c.to_radians());
    }
    let fits = components.len() == kind.components()
        || (kind == FixedKind::Color && components.len() == 3);
    if !fits {
        return Err(ctx.host_shape(value));
    }
    Ok(fit(kind, &components))
}

fn single_to_host(
    ctx: &PortContext<'_>,
    kind: FixedKind,
    data: &[f32],
) -> Result<HostValue, ConversionError> {
    let shape_error = || ctx.engine_shape(&GraphValue::Fixed(kind, data.to_vec()));
    match ctx.attribute.info.ty {
        AttributeType::Matrix => matrix_to_host(kind, data)
            .map(HostValue::Matrix)
            .ok_or_else(shape_error),
        AttributeType::Numeric3(numeric) if data.len() >= 3 => Ok(match numeric {
            NumericKind::Float => HostValue::Float3([data[0], data[1], data[2]]),
            _ => HostValue::Double3([data[0], data[1], data[2]].map(f64::from)),
        }),
        AttributeType::Compound => {
            let children = &ctx.attribute.children;
            if children.len() > data.len() {
                return Err(shape_error());
            }
            let order = component_children(ctx.attribute, kind)
                .unwrap_or_else(|| (0..children.len()).collect());
            let degrees = kind == FixedKind::Euler && holds_angles(ctx.attribute);
            let mut values = vec![HostValue::Empty; children.len()];
            for (component, child_index) in order.into_iter().enumerate() {
                let mut v = f64::from(data[component]);
                if degrees {
                    v = v.to_degrees();
                }
                values[child_index] = match children[child_index].info.ty {
                    AttributeType::Numeric(numeric) => host_numeric(numeric, Scalar::Float64(v)),
                    AttributeType::Unit(_) => HostValue::Double(v),
                    _ => return Err(shape_error()),
                };
            }
            Ok(HostValue::Compound(values))
        }
        _ => Err(shape_error()),
    }
}

fn fixed_to_engine(
    ctx: &PortContext<'_>,
    value: &HostValue,
    _current: &GraphValue,
) -> Result<GraphValue, ConversionError> {
    let kind = fixed_kind(ctx)?;
    if !ctx.is_array() {
        return single_to_engine(ctx, kind, value).map(|data| GraphValue::Fixed(kind, data));
    }
    let data: Vec<f32> = match value {
        HostValue::VectorArray(items) => items.iter().flat_map(|v| fit(kind, v)).collect(),
        HostValue::PointArray(items) => {
            let n = kind.components().min(4);
            items.iter().flat_map(|p| fit(kind, &p[..n])).collect()
        }
        HostValue::Multi(items) => {
            let element = ctx.attribute.element();
            let ectx = ctx.with_attribute(&element, ctx.element_type());
            let mut data = Vec::with_capacity(items.len() * kind.components());
            for item in items {
                data.extend(single_to_engine(&ectx, kind, item)?);
            }
            data
        }
        HostValue::Empty => Vec::new(),
        other => return Err(ctx.host_shape(other)),
    };
    Ok(GraphValue::Array(GraphArray::Fixed { kind, data }))
}

fn fixed_to_host(ctx: &PortContext<'_>, value: &GraphValue) -> Result<HostValue, ConversionError> {
    if !ctx.is_array() {
        let (kind, data) = value.as_fixed().ok_or_else(|| ctx.engine_shape(value))?;
        return single_to_host(ctx, kind, data);
    }
    let (kind, data) = match value {
        GraphValue::Array(GraphArray::Fixed { kind, data }) => (*kind, data.as_slice()),
        GraphValue::Null => (fixed_kind(ctx)?, &[][..]),
        other => return Err(ctx.engine_shape(other)),
    };
    let chunks = data.chunks_exact(kind.components());
    let component = |c: &[f32], i: usize, default: f64| c.get(i).map_or(default, |v| f64::from(*v));
    match ctx.attribute.info.ty {
        AttributeType::Data(DataKind::VectorArray) => Ok(HostValue::VectorArray(
            chunks
                .map(|c| [component(c, 0, 0.0), component(c, 1, 0.0), component(c, 2, 0.0)])
                .collect(),
        )),
        AttributeType::Data(DataKind::PointArray) => Ok(HostValue::PointArray(
            chunks
                .map(|c| {
                    [
                        component(c, 0, 0.0),
                        component(c, 1, 0.0),
                        component(c, 2, 0.0),
                        component(c, 3, 1.0),
                    ]
                })
                .collect(),
        )),
        _ if ctx.attribute.info.array => {
            let element = ctx.attribute.element();
            let ectx = ctx.with_attribute(&element, ctx.element_type());
            chunks
                .map(|c| single_to_host(&ectx, kind, c))
                .collect::<Result<Vec<_>, _>>()
                .map(HostValue::Multi)
        }
        _ => Err(ctx.engine_shape(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::ConverterRegistry;
    use super::*;
    use crate::host::HostCapabilities;

    #[test]
    fn test_xyz_compound_passthrough() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("Vec3");
        let attr = xyz("pos");
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let value = HostValue::Compound(vec![
            HostValue::Double(1.0),
            HostValue::Double(2.0),
            HostValue::Double(3.0),
        ]);
        let engine = (FIXED.to_engine)(&ctx, &value, &GraphValue::Null).unwrap();
        assert_eq!(engine, GraphValue::vec3(1.0, 2.0, 3.0));
        assert_eq!((FIXED.to_host)(&ctx, &engine).unwrap(), value);
    }

    #[test]
    fn test_children_matched_by_suffix_not_order() {
        let mut attr = xyz("pos");
        attr.children.swap(0, 2);
        assert_eq!(component_children(&attr, FixedKind::Vec3), Some(vec![2, 1, 0]));

        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("Vec3");
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        // child order is Z, Y, X
        let value = HostValue::Compound(vec![
            HostValue::Double(3.0),
            HostValue::Double(2.0),
            HostValue::Double(1.0),
        ]);
        let engine = (FIXED.to_engine)(&ctx, &value, &GraphValue::Null).unwrap();
        assert_eq!(engine, GraphValue::vec3(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_short_compound_is_a_shape_error() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("Vec3");
        let attr = xyz("pos");
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let value = HostValue::Compound(vec![HostValue::Double(1.0), HostValue::Double(2.0)]);
        assert!((FIXED.to_engine)(&ctx, &value, &GraphValue::Null).is_err());
    }

    #[test]
    fn test_euler_angles_convert_units() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("Euler");
        let attr = compound(
            "rot",
            ["X", "Y", "Z"]
                .iter()
                .map(|s| leaf(&format!("rot{s}"), AttributeType::Unit(UnitKind::Angle)))
                .collect(),
        );
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let value = HostValue::Compound(vec![
            HostValue::Double(90.0),
            HostValue::Double(0.0),
            HostValue::Double(0.0),
        ]);
        let engine = (FIXED.to_engine)(&ctx, &value, &GraphValue::Null).unwrap();
        let (_, data) = engine.as_fixed().unwrap();
        assert!((data[0] - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        match (FIXED.to_host)(&ctx, &engine).unwrap() {
            HostValue::Compound(values) => {
                assert!((values[0].as_f64().unwrap() - 90.0).abs() < 1e-4)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_matrix_round_trip() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("Mat44");
        let attr = leaf("m", AttributeType::Matrix);
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let mut m = [0.0; 16];
        for (i, slot) in m.iter_mut().enumerate() {
            *slot = i as f64;
        }
        let engine = (FIXED.to_engine)(&ctx, &HostValue::Matrix(m), &GraphValue::Null).unwrap();
        assert_eq!((FIXED.to_host)(&ctx, &engine).unwrap(), HostValue::Matrix(m));
    }

    #[test]
    fn test_vector_array_fast_path_keeps_length() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("Vec3[]");
        let attr = leaf("v", AttributeType::Data(DataKind::VectorArray));
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let value = HostValue::VectorArray(vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        let engine = (FIXED.to_engine)(&ctx, &value, &GraphValue::Null).unwrap();
        match &engine {
            GraphValue::Array(array) => assert_eq!(array.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!((FIXED.to_host)(&ctx, &engine).unwrap(), value);
    }

    #[test]
    fn test_color_from_float3_gets_opaque_alpha() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("Color");
        let attr = leaf("c", AttributeType::Numeric3(NumericKind::Float));
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let engine =
            (FIXED.to_engine)(&ctx, &HostValue::Float3([0.5, 0.25, 1.0]), &GraphValue::Null)
                .unwrap();
        assert_eq!(engine, GraphValue::Fixed(FixedKind::Color, vec![0.5, 0.25, 1.0, 1.0]));
    }
}

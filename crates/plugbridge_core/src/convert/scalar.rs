// SPDX-License-Identifier: MIT OR Apache-2.0
//! Numeric, boolean and string converters.

use super::{ConverterPair, PortContext};
use crate::error::ConversionError;
use crate::host::{AttributeType, DataKind, NumericKind, UnitKind};
use crate::numeric::{Scalar, ScalarArray};
use crate::types::{BaseType, ScalarKind};
use crate::value::{GraphArray, GraphValue, HostValue};

/// Every numeric scalar type, including `Boolean`
pub const NUMERIC: ConverterPair = ConverterPair {
    to_engine: numeric_to_engine,
    to_host: numeric_to_host,
};

/// `String`
pub const STRING: ConverterPair = ConverterPair {
    to_engine: string_to_engine,
    to_host: string_to_host,
};

/// Host unit value into engine units
pub fn unit_to_engine(unit: UnitKind, value: f64) -> f64 {
    match unit {
        UnitKind::Angle => value.to_radians(),
        UnitKind::Distance => value * 10.0,
        UnitKind::Time => value,
    }
}

/// Engine unit value into host units
pub fn unit_to_host(unit: UnitKind, value: f64) -> f64 {
    match unit {
        UnitKind::Angle => value.to_degrees(),
        UnitKind::Distance => value / 10.0,
        UnitKind::Time => value,
    }
}

/// Store a scalar in a host numeric attribute of `kind`, truncating
pub(crate) fn host_numeric(kind: NumericKind, scalar: Scalar) -> HostValue {
    match kind {
        NumericKind::Boolean => HostValue::Bool(scalar.as_bool()),
        NumericKind::Byte => HostValue::Byte(scalar.as_i64() as u8),
        NumericKind::Short => HostValue::Short(scalar.as_i64() as i16),
        NumericKind::Int => HostValue::Int(scalar.as_i64() as i32),
        NumericKind::Int64 => HostValue::Int64(scalar.as_i64()),
        NumericKind::Float => HostValue::Float(scalar.as_f64() as f32),
        NumericKind::Double => HostValue::Double(scalar.as_f64()),
    }
}

fn scalar_kind(ctx: &PortContext<'_>) -> Result<ScalarKind, ConversionError> {
    match ctx.base_type() {
        BaseType::Scalar(kind) => Ok(kind),
        _ => Err(ConversionError::Unsupported(ctx.resolved.to_string())),
    }
}

fn scalar_to_engine(
    ctx: &PortContext<'_>,
    kind: ScalarKind,
    value: &HostValue,
) -> Result<Scalar, ConversionError> {
    let scalar = value.as_scalar().ok_or_else(|| ctx.host_shape(value))?;
    Ok(match ctx.unit() {
        Some(unit) if kind.is_float() => Scalar::from_f64(kind, unit_to_engine(unit, scalar.as_f64())),
        _ => scalar.cast(kind),
    })
}

fn scalar_to_host(ctx: &PortContext<'_>, scalar: Scalar) -> Result<HostValue, ConversionError> {
    let scalar = match ctx.unit() {
        Some(unit) if scalar.kind().is_float() => {
            Scalar::Float64(unit_to_host(unit, scalar.as_f64()))
        }
        _ => scalar,
    };
    match ctx.attribute.info.ty {
        AttributeType::Numeric(kind) => Ok(host_numeric(kind, scalar)),
        AttributeType::Unit(_) => Ok(HostValue::Double(scalar.as_f64())),
        _ => Err(ctx.engine_shape(&GraphValue::Scalar(scalar))),
    }
}

fn numeric_to_engine(
    ctx: &PortContext<'_>,
    value: &HostValue,
    _current: &GraphValue,
) -> Result<GraphValue, ConversionError> {
    let kind = scalar_kind(ctx)?;
    if !ctx.is_array() {
        return scalar_to_engine(ctx, kind, value).map(GraphValue::Scalar);
    }
    let array = match value {
        HostValue::IntArray(items) => ScalarArray::from_i32(kind, items),
        HostValue::FloatArray(items) => ScalarArray::from_f32(kind, items),
        HostValue::DoubleArray(items) => ScalarArray::from_f64(kind, items),
        HostValue::Multi(items) => {
            let element = ctx.attribute.element();
            let ectx = ctx.with_attribute(&element, ctx.element_type());
            let scalars = items
                .iter()
                .map(|item| scalar_to_engine(&ectx, kind, item))
                .collect::<Result<Vec<_>, _>>()?;
            ScalarArray::collect(kind, scalars.into_iter())
        }
        HostValue::Empty => ScalarArray::empty(kind),
        other => return Err(ctx.host_shape(other)),
    };
    Ok(GraphValue::Array(GraphArray::Scalars(array)))
}

fn numeric_to_host(ctx: &PortContext<'_>, value: &GraphValue) -> Result<HostValue, ConversionError> {
    if !ctx.is_array() {
        let scalar = value.as_scalar().ok_or_else(|| ctx.engine_shape(value))?;
        return scalar_to_host(ctx, scalar);
    }
    let array = match value {
        GraphValue::Array(GraphArray::Scalars(array)) => array.clone(),
        GraphValue::Null => ScalarArray::empty(scalar_kind(ctx)?),
        other => return Err(ctx.engine_shape(other)),
    };
    match ctx.attribute.info.ty {
        AttributeType::Data(DataKind::IntArray) => Ok(HostValue::IntArray(array.to_i32())),
        AttributeType::Data(DataKind::FloatArray) => Ok(HostValue::FloatArray(array.to_f32())),
        AttributeType::Data(DataKind::DoubleArray) => Ok(HostValue::DoubleArray(array.to_f64())),
        _ if ctx.attribute.info.array => {
            let element = ctx.attribute.element();
            let ectx = ctx.with_attribute(&element, ctx.element_type());
            array
                .iter()
                .map(|scalar| scalar_to_host(&ectx, scalar))
                .collect::<Result<Vec<_>, _>>()
                .map(HostValue::Multi)
        }
        _ => Err(ctx.engine_shape(value)),
    }
}

fn string_to_engine(
    ctx: &PortContext<'_>,
    value: &HostValue,
    _current: &GraphValue,
) -> Result<GraphValue, ConversionError> {
    if !ctx.is_array() {
        return match value {
            HostValue::String(s) => Ok(GraphValue::String(s.clone())),
            HostValue::Empty => Ok(GraphValue::String(String::new())),
            other => Err(ctx.host_shape(other)),
        };
    }
    let items = match value {
        HostValue::StringArray(items) => items.clone(),
        HostValue::Multi(items) => items
            .iter()
            .map(|item| match item {
                HostValue::String(s) => Ok(s.clone()),
                other => Err(ctx.host_shape(other)),
            })
            .collect::<Result<Vec<_>, _>>()?,
        HostValue::Empty => Vec::new(),
        other => return Err(ctx.host_shape(other)),
    };
    Ok(GraphValue::Array(GraphArray::Strings(items)))
}

fn string_to_host(ctx: &PortContext<'_>, value: &GraphValue) -> Result<HostValue, ConversionError> {
    if !ctx.is_array() {
        return match value {
            GraphValue::String(s) => Ok(HostValue::String(s.clone())),
            GraphValue::Null => Ok(HostValue::String(String::new())),
            other => Err(ctx.engine_shape(other)),
        };
    }
    let items = match value {
        GraphValue::Array(GraphArray::Strings(items)) => items.clone(),
        GraphValue::Null => Vec::new(),
        other => return Err(ctx.engine_shape(other)),
    };
    match ctx.attribute.info.ty {
        AttributeType::Data(DataKind::StringArray) => Ok(HostValue::StringArray(items)),
        _ if ctx.attribute.info.array => Ok(HostValue::Multi(
            items.into_iter().map(HostValue::String).collect(),
        )),
        _ => Err(ctx.engine_shape(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::ConverterRegistry;
    use super::*;
    use crate::host::HostCapabilities;

    fn round_trip(resolved: &str, ty: AttributeType, value: HostValue) -> (GraphValue, HostValue) {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port(resolved);
        let attr = leaf("p", ty);
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let engine = (NUMERIC.to_engine)(&ctx, &value, &GraphValue::Null).unwrap();
        let back = (NUMERIC.to_host)(&ctx, &engine).unwrap();
        (engine, back)
    }

    #[test]
    fn test_every_scalar_kind_round_trips() {
        let cases = [
            ("Boolean", NumericKind::Boolean, HostValue::Bool(true)),
            ("SInt8", NumericKind::Int, HostValue::Int(-7)),
            ("UInt8", NumericKind::Byte, HostValue::Byte(200)),
            ("SInt16", NumericKind::Short, HostValue::Short(-300)),
            ("UInt16", NumericKind::Int, HostValue::Int(60000)),
            ("SInt32", NumericKind::Int, HostValue::Int(-123456)),
            ("UInt32", NumericKind::Int64, HostValue::Int64(4_000_000_000)),
            ("SInt64", NumericKind::Int64, HostValue::Int64(-9_000_000_000)),
            ("UInt64", NumericKind::Int64, HostValue::Int64(9_000_000_000)),
            ("Float32", NumericKind::Float, HostValue::Float(1.5)),
            ("Float64", NumericKind::Double, HostValue::Double(0.1)),
        ];
        for (resolved, kind, value) in cases {
            let (engine, back) = round_trip(resolved, AttributeType::Numeric(kind), value.clone());
            assert_eq!(engine.type_name(), resolved);
            assert_eq!(back, value, "{resolved}");
        }
    }

    #[test]
    fn test_narrowing_truncates() {
        let (engine, _) = round_trip(
            "UInt8",
            AttributeType::Numeric(NumericKind::Int),
            HostValue::Int(300),
        );
        assert_eq!(engine, GraphValue::Scalar(Scalar::UInt8(44)));
    }

    #[test]
    fn test_float_promotion_is_exact() {
        let (engine, back) = round_trip(
            "Float64",
            AttributeType::Numeric(NumericKind::Float),
            HostValue::Float(0.1),
        );
        assert_eq!(engine, GraphValue::float64(f64::from(0.1f32)));
        assert_eq!(back, HostValue::Float(0.1));
    }

    #[test]
    fn test_distance_units() {
        let (engine, back) = round_trip(
            "Float32",
            AttributeType::Unit(UnitKind::Distance),
            HostValue::Double(2.5),
        );
        assert_eq!(engine, GraphValue::float32(25.0));
        assert_eq!(back, HostValue::Double(2.5));
    }

    #[test]
    fn test_bulk_array_fast_path_and_multi() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("SInt32[]");

        let data = leaf("p", AttributeType::Data(DataKind::IntArray));
        let ctx = PortContext::new(&p, &data, &graph, &registry, HostCapabilities::default());
        let value = HostValue::IntArray(vec![1, -2, 3, 4]);
        let engine = (NUMERIC.to_engine)(&ctx, &value, &GraphValue::Null).unwrap();
        match &engine {
            GraphValue::Array(array) => assert_eq!(array.len(), 4),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!((NUMERIC.to_host)(&ctx, &engine).unwrap(), value);

        let mut multi = leaf("p", AttributeType::Numeric(NumericKind::Int));
        multi.info.array = true;
        let ctx = PortContext::new(&p, &multi, &graph, &registry, HostCapabilities::default());
        let value = HostValue::Multi(vec![HostValue::Int(5), HostValue::Int(6)]);
        let engine = (NUMERIC.to_engine)(&ctx, &value, &GraphValue::Null).unwrap();
        assert_eq!((NUMERIC.to_host)(&ctx, &engine).unwrap(), value);
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("Float32");
        let attr = leaf("p", AttributeType::Numeric(NumericKind::Float));
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let err = (NUMERIC.to_engine)(&ctx, &HostValue::String("x".into()), &GraphValue::Null);
        assert!(matches!(err, Err(ConversionError::HostShape { .. })));
    }

    #[test]
    fn test_string_arrays() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("String[]");
        let attr = leaf("p", AttributeType::Data(DataKind::StringArray));
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let value = HostValue::StringArray(vec!["a".into(), "b".into()]);
        let engine = (STRING.to_engine)(&ctx, &value, &GraphValue::Null).unwrap();
        assert_eq!(engine.type_name(), "String[]");
        assert_eq!((STRING.to_host)(&ctx, &engine).unwrap(), value);
    }
}

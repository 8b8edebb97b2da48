// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host-native attribute values.

use crate::numeric::Scalar;
use crate::value::geometry::{CurveData, MeshData};
use crate::value::graph::GraphValue;
use serde::{Deserialize, Serialize};

/// A value read from or written to a host attribute
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum HostValue {
    /// No data (unset data attribute)
    #[default]
    Empty,
    /// Boolean
    Bool(bool),
    /// Unsigned byte
    Byte(u8),
    /// 16-bit integer
    Short(i16),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Int64(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float (also angle, distance and time units)
    Double(f64),
    /// Three 32-bit floats
    Float3([f32; 3]),
    /// Three 64-bit floats
    Double3([f64; 3]),
    /// String
    String(String),
    /// 4x4 matrix, row major
    Matrix([f64; 16]),
    /// Integer array data
    IntArray(Vec<i32>),
    /// Float array data
    FloatArray(Vec<f32>),
    /// Double array data
    DoubleArray(Vec<f64>),
    /// Vector array data
    VectorArray(Vec<[f64; 3]>),
    /// Homogeneous point array data
    PointArray(Vec<[f64; 4]>),
    /// String array data
    StringArray(Vec<String>),
    /// Mesh data
    Mesh(MeshData),
    /// Curve data
    Curve(CurveData),
    /// Child values of a compound attribute, in child order
    Compound(Vec<HostValue>),
    /// Elements of an array (multi) attribute
    Multi(Vec<HostValue>),
    /// Engine value carried through unchanged
    Opaque(Box<GraphValue>),
}

impl HostValue {
    /// Numeric scalar view of a plain numeric value
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Self::Bool(v) => Some(Scalar::Boolean(*v)),
            Self::Byte(v) => Some(Scalar::UInt8(*v)),
            Self::Short(v) => Some(Scalar::SInt16(*v)),
            Self::Int(v) => Some(Scalar::SInt32(*v)),
            Self::Int64(v) => Some(Scalar::SInt64(*v)),
            Self::Float(v) => Some(Scalar::Float32(*v)),
            Self::Double(v) => Some(Scalar::Float64(*v)),
            _ => None,
        }
    }

    /// Value as f64, if numeric
    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().map(|s| s.as_f64())
    }

    /// Components of a vector-like value
    pub fn components(&self) -> Option<Vec<f64>> {
        match self {
            Self::Float3(v) => Some(v.iter().map(|c| f64::from(*c)).collect()),
            Self::Double3(v) => Some(v.to_vec()),
            Self::Matrix(m) => Some(m.to_vec()),
            Self::Compound(children) => children.iter().map(Self::as_f64).collect(),
            _ => None,
        }
    }

    /// Short description used in diagnostics
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bool(_) => "bool",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Int64(_) => "int64",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Float3(_) => "float3",
            Self::Double3(_) => "double3",
            Self::String(_) => "string",
            Self::Matrix(_) => "matrix",
            Self::IntArray(_) => "intArray",
            Self::FloatArray(_) => "floatArray",
            Self::DoubleArray(_) => "doubleArray",
            Self::VectorArray(_) => "vectorArray",
            Self::PointArray(_) => "pointArray",
            Self::StringArray(_) => "stringArray",
            Self::Mesh(_) => "mesh",
            Self::Curve(_) => "curve",
            Self::Compound(_) => "compound",
            Self::Multi(_) => "multi",
            Self::Opaque(_) => "opaque",
        }
    }
}

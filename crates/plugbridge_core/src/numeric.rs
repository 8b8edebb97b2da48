// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed numeric scalars and bulk arrays with width/signedness casting.
//!
//! Integer narrowing truncates (two's complement wrap), float to integer
//! saturates, and nothing here ever fails.

use crate::types::ScalarKind;
use serde::{Deserialize, Serialize};

/// A typed numeric scalar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// Boolean
    Boolean(bool),
    /// Signed 8-bit
    SInt8(i8),
    /// Unsigned 8-bit
    UInt8(u8),
    /// Signed 16-bit
    SInt16(i16),
    /// Unsigned 16-bit
    UInt16(u16),
    /// Signed 32-bit
    SInt32(i32),
    /// Unsigned 32-bit
    UInt32(u32),
    /// Signed 64-bit
    SInt64(i64),
    /// Unsigned 64-bit
    UInt64(u64),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
}

/// Widest lossless representation of a scalar
#[derive(Debug, Clone, Copy)]
enum Wide {
    Bool(bool),
    Int(i128),
    Float(f64),
}

macro_rules! cast_to {
    ($wide:expr, $ty:ty) => {
        match $wide {
            Wide::Bool(b) => b as $ty,
            Wide::Int(i) => i as $ty,
            Wide::Float(f) => f as $ty,
        }
    };
}

impl Scalar {
    /// The kind of this scalar
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Boolean(_) => ScalarKind::Boolean,
            Self::SInt8(_) => ScalarKind::SInt8,
            Self::UInt8(_) => ScalarKind::UInt8,
            Self::SInt16(_) => ScalarKind::SInt16,
            Self::UInt16(_) => ScalarKind::UInt16,
            Self::SInt32(_) => ScalarKind::SInt32,
            Self::UInt32(_) => ScalarKind::UInt32,
            Self::SInt64(_) => ScalarKind::SInt64,
            Self::UInt64(_) => ScalarKind::UInt64,
            Self::Float32(_) => ScalarKind::Float32,
            Self::Float64(_) => ScalarKind::Float64,
        }
    }

    fn wide(self) -> Wide {
        match self {
            Self::Boolean(v) => Wide::Bool(v),
            Self::SInt8(v) => Wide::Int(v.into()),
            Self::UInt8(v) => Wide::Int(v.into()),
            Self::SInt16(v) => Wide::Int(v.into()),
            Self::UInt16(v) => Wide::Int(v.into()),
            Self::SInt32(v) => Wide::Int(v.into()),
            Self::UInt32(v) => Wide::Int(v.into()),
            Self::SInt64(v) => Wide::Int(v.into()),
            Self::UInt64(v) => Wide::Int(v.into()),
            Self::Float32(v) => Wide::Float(v.into()),
            Self::Float64(v) => Wide::Float(v),
        }
    }

    /// Convert to another kind, truncating on overflow
    pub fn cast(self, kind: ScalarKind) -> Scalar {
        let wide = self.wide();
        match kind {
            ScalarKind::Boolean => Scalar::Boolean(match wide {
                Wide::Bool(b) => b,
                Wide::Int(i) => i != 0,
                Wide::Float(f) => f != 0.0,
            }),
            ScalarKind::SInt8 => Scalar::SInt8(cast_to!(wide, i8)),
            ScalarKind::UInt8 => Scalar::UInt8(cast_to!(wide, u8)),
            ScalarKind::SInt16 => Scalar::SInt16(cast_to!(wide, i16)),
            ScalarKind::UInt16 => Scalar::UInt16(cast_to!(wide, u16)),
            ScalarKind::SInt32 => Scalar::SInt32(cast_to!(wide, i32)),
            ScalarKind::UInt32 => Scalar::UInt32(cast_to!(wide, u32)),
            ScalarKind::SInt64 => Scalar::SInt64(cast_to!(wide, i64)),
            ScalarKind::UInt64 => Scalar::UInt64(cast_to!(wide, u64)),
            ScalarKind::Float32 => Scalar::Float32(match wide {
                Wide::Bool(b) => f32::from(u8::from(b)),
                Wide::Int(i) => i as f32,
                Wide::Float(f) => f as f32,
            }),
            ScalarKind::Float64 => Scalar::Float64(match wide {
                Wide::Bool(b) => f64::from(u8::from(b)),
                Wide::Int(i) => i as f64,
                Wide::Float(f) => f,
            }),
        }
    }

    /// Value as f64 (lossy for 64-bit integers beyond 2^53)
    pub fn as_f64(&self) -> f64 {
        match self.cast(ScalarKind::Float64) {
            Scalar::Float64(v) => v,
            _ => unreachable!("cast to Float64 yields Float64"),
        }
    }

    /// Value as i64 (truncating)
    pub fn as_i64(&self) -> i64 {
        match self.cast(ScalarKind::SInt64) {
            Scalar::SInt64(v) => v,
            _ => unreachable!("cast to SInt64 yields SInt64"),
        }
    }

    /// Value as bool (non-zero is true)
    pub fn as_bool(&self) -> bool {
        matches!(self.cast(ScalarKind::Boolean), Scalar::Boolean(true))
    }

    /// Zero of the given kind
    pub fn zero(kind: ScalarKind) -> Scalar {
        Scalar::SInt64(0).cast(kind)
    }

    /// Build a scalar of `kind` from an f64
    pub fn from_f64(kind: ScalarKind, value: f64) -> Scalar {
        Scalar::Float64(value).cast(kind)
    }
}

/// Homogeneous numeric array stored as one flat buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarArray {
    /// Booleans
    Boolean(Vec<bool>),
    /// Signed 8-bit
    SInt8(Vec<i8>),
    /// Unsigned 8-bit
    UInt8(Vec<u8>),
    /// Signed 16-bit
    SInt16(Vec<i16>),
    /// Unsigned 16-bit
    UInt16(Vec<u16>),
    /// Signed 32-bit
    SInt32(Vec<i32>),
    /// Unsigned 32-bit
    UInt32(Vec<u32>),
    /// Signed 64-bit
    SInt64(Vec<i64>),
    /// Unsigned 64-bit
    UInt64(Vec<u64>),
    /// 32-bit floats
    Float32(Vec<f32>),
    /// 64-bit floats
    Float64(Vec<f64>),
}

macro_rules! map_array {
    ($array:expr, $v:ident => $body:expr) => {
        match $array {
            ScalarArray::Boolean($v) => $body,
            ScalarArray::SInt8($v) => $body,
            ScalarArray::UInt8($v) => $body,
            ScalarArray::SInt16($v) => $body,
            ScalarArray::UInt16($v) => $body,
            ScalarArray::SInt32($v) => $body,
            ScalarArray::UInt32($v) => $body,
            ScalarArray::SInt64($v) => $body,
            ScalarArray::UInt64($v) => $body,
            ScalarArray::Float32($v) => $body,
            ScalarArray::Float64($v) => $body,
        }
    };
}

impl ScalarArray {
    /// Empty array of `kind`
    pub fn empty(kind: ScalarKind) -> Self {
        Self::collect(kind, std::iter::empty())
    }

    /// Element kind
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Boolean(_) => ScalarKind::Boolean,
            Self::SInt8(_) => ScalarKind::SInt8,
            Self::UInt8(_) => ScalarKind::UInt8,
            Self::SInt16(_) => ScalarKind::SInt16,
            Self::UInt16(_) => ScalarKind::UInt16,
            Self::SInt32(_) => ScalarKind::SInt32,
            Self::UInt32(_) => ScalarKind::UInt32,
            Self::SInt64(_) => ScalarKind::SInt64,
            Self::UInt64(_) => ScalarKind::UInt64,
            Self::Float32(_) => ScalarKind::Float32,
            Self::Float64(_) => ScalarKind::Float64,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        map_array!(self, v => v.len())
    }

    /// Whether the array is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            Self::Boolean(v) => v.get(index).copied().map(Scalar::Boolean),
            Self::SInt8(v) => v.get(index).copied().map(Scalar::SInt8),
            Self::UInt8(v) => v.get(index).copied().map(Scalar::UInt8),
            Self::SInt16(v) => v.get(index).copied().map(Scalar::SInt16),
            Self::UInt16(v) => v.get(index).copied().map(Scalar::UInt16),
            Self::SInt32(v) => v.get(index).copied().map(Scalar::SInt32),
            Self::UInt32(v) => v.get(index).copied().map(Scalar::UInt32),
            Self::SInt64(v) => v.get(index).copied().map(Scalar::SInt64),
            Self::UInt64(v) => v.get(index).copied().map(Scalar::UInt64),
            Self::Float32(v) => v.get(index).copied().map(Scalar::Float32),
            Self::Float64(v) => v.get(index).copied().map(Scalar::Float64),
        }
    }

    /// Iterate elements as scalars
    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Build an array of `kind` from scalars of any kind
    pub fn collect(kind: ScalarKind, items: impl Iterator<Item = Scalar>) -> Self {
        macro_rules! gather {
            ($variant:ident) => {
                Self::$variant(
                    items
                        .map(|s| match s.cast(kind) {
                            Scalar::$variant(v) => v,
                            _ => unreachable!("cast yields the requested kind"),
                        })
                        .collect(),
                )
            };
        }
        match kind {
            ScalarKind::Boolean => gather!(Boolean),
            ScalarKind::SInt8 => gather!(SInt8),
            ScalarKind::UInt8 => gather!(UInt8),
            ScalarKind::SInt16 => gather!(SInt16),
            ScalarKind::UInt16 => gather!(UInt16),
            ScalarKind::SInt32 => gather!(SInt32),
            ScalarKind::UInt32 => gather!(UInt32),
            ScalarKind::SInt64 => gather!(SInt64),
            ScalarKind::UInt64 => gather!(UInt64),
            ScalarKind::Float32 => gather!(Float32),
            ScalarKind::Float64 => gather!(Float64),
        }
    }

    /// Convert every element to `kind`; a same-kind cast is a plain clone
    pub fn cast(&self, kind: ScalarKind) -> Self {
        if self.kind() == kind {
            return self.clone();
        }
        Self::collect(kind, self.iter())
    }
}

/// Bulk fast paths from plain host buffers
impl ScalarArray {
    /// From 32-bit integers
    pub fn from_i32(kind: ScalarKind, values: &[i32]) -> Self {
        match kind {
            ScalarKind::SInt32 => Self::SInt32(values.to_vec()),
            _ => Self::collect(kind, values.iter().copied().map(Scalar::SInt32)),
        }
    }

    /// From 32-bit floats
    pub fn from_f32(kind: ScalarKind, values: &[f32]) -> Self {
        match kind {
            ScalarKind::Float32 => Self::Float32(values.to_vec()),
            _ => Self::collect(kind, values.iter().copied().map(Scalar::Float32)),
        }
    }

    /// From 64-bit floats
    pub fn from_f64(kind: ScalarKind, values: &[f64]) -> Self {
        match kind {
            ScalarKind::Float64 => Self::Float64(values.to_vec()),
            ScalarKind::Float32 => Self::Float32(values.iter().map(|v| *v as f32).collect()),
            _ => Self::collect(kind, values.iter().copied().map(Scalar::Float64)),
        }
    }

    /// Into 32-bit integers
    pub fn to_i32(&self) -> Vec<i32> {
        match self {
            Self::SInt32(v) => v.clone(),
            other => other.iter().map(|s| s.as_i64() as i32).collect(),
        }
    }

    /// Into 32-bit floats
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            Self::Float32(v) => v.clone(),
            other => other.iter().map(|s| s.as_f64() as f32).collect(),
        }
    }

    /// Into 64-bit floats
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            Self::Float64(v) => v.clone(),
            Self::Float32(v) => v.iter().map(|x| f64::from(*x)).collect(),
            other => other.iter().map(|s| s.as_f64()).collect(),
        }
    }
}

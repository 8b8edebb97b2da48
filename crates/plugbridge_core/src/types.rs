// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resolved engine type names and their interned identifiers.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Suffix marking a variable-size array type
pub const ARRAY_MARKER: &str = "[]";

/// Split a resolved type name into its base name and array flag
pub fn strip_array_marker(resolved: &str) -> (&str, bool) {
    let trimmed = resolved.trim();
    match trimmed.strip_suffix(ARRAY_MARKER) {
        Some(base) => (base.trim_end(), true),
        None => (trimmed, false),
    }
}

/// A parsed resolved type: base name plus array marker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedType {
    /// Base type name, without array marker
    pub base: String,
    /// Whether the type carries the array marker
    pub is_array: bool,
}

impl ResolvedType {
    /// Parse a resolved type string such as `Vec3[]`
    pub fn parse(resolved: &str) -> Self {
        let (base, is_array) = strip_array_marker(resolved);
        Self {
            base: base.to_string(),
            is_array,
        }
    }

    /// The base type classification
    pub fn base_type(&self) -> BaseType {
        BaseType::parse(&self.base)
    }
}

impl fmt::Display for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            write!(f, "{}{}", self.base, ARRAY_MARKER)
        } else {
            f.write_str(&self.base)
        }
    }
}

/// Numeric scalar types of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// Boolean
    Boolean,
    /// Signed 8-bit integer
    SInt8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Signed 16-bit integer
    SInt16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    SInt32,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 64-bit integer
    SInt64,
    /// Unsigned 64-bit integer
    UInt64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
}

impl ScalarKind {
    /// Every scalar kind, narrowest first
    pub const ALL: [ScalarKind; 11] = [
        Self::Boolean,
        Self::SInt8,
        Self::UInt8,
        Self::SInt16,
        Self::UInt16,
        Self::SInt32,
        Self::UInt32,
        Self::SInt64,
        Self::UInt64,
        Self::Float32,
        Self::Float64,
    ];

    /// Canonical engine type name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::SInt8 => "SInt8",
            Self::UInt8 => "UInt8",
            Self::SInt16 => "SInt16",
            Self::UInt16 => "UInt16",
            Self::SInt32 => "SInt32",
            Self::UInt32 => "UInt32",
            Self::SInt64 => "SInt64",
            Self::UInt64 => "UInt64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
        }
    }

    /// Parse a canonical name or alias
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == canonical_name(name))
    }

    /// Whether this is an integer kind
    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::Boolean | Self::Float32 | Self::Float64)
    }

    /// Whether this is a floating point kind
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

/// Fixed-size float vectors and matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixedKind {
    /// 2D vector
    Vec2,
    /// 3D vector
    Vec3,
    /// 4D vector
    Vec4,
    /// RGBA color
    Color,
    /// Euler angles in radians
    Euler,
    /// Quaternion (x, y, z, w)
    Quat,
    /// 3x3 matrix, row major
    Mat33,
    /// 4x4 matrix, row major
    Mat44,
}

impl FixedKind {
    /// Every fixed kind
    pub const ALL: [FixedKind; 8] = [
        Self::Vec2,
        Self::Vec3,
        Self::Vec4,
        Self::Color,
        Self::Euler,
        Self::Quat,
        Self::Mat33,
        Self::Mat44,
    ];

    /// Number of float components
    pub fn components(&self) -> usize {
        match self {
            Self::Vec2 => 2,
            Self::Vec3 | Self::Euler => 3,
            Self::Vec4 | Self::Color | Self::Quat => 4,
            Self::Mat33 => 9,
            Self::Mat44 => 16,
        }
    }

    /// Canonical engine type name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vec2 => "Vec2",
            Self::Vec3 => "Vec3",
            Self::Vec4 => "Vec4",
            Self::Color => "Color",
            Self::Euler => "Euler",
            Self::Quat => "Quat",
            Self::Mat33 => "Mat33",
            Self::Mat44 => "Mat44",
        }
    }

    /// Parse a canonical name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Whether this is a matrix kind
    pub fn is_matrix(&self) -> bool {
        matches!(self, Self::Mat33 | Self::Mat44)
    }

    /// Suffixes used by host compound children for each component
    pub fn component_suffixes(&self) -> &'static [&'static str] {
        match self {
            Self::Vec2 => &["X", "Y"],
            Self::Vec3 | Self::Euler => &["X", "Y", "Z"],
            Self::Vec4 | Self::Quat => &["X", "Y", "Z", "W"],
            Self::Color => &["R", "G", "B", "A"],
            Self::Mat33 | Self::Mat44 => &[],
        }
    }
}

/// Classification of a base type name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BaseType {
    /// Numeric scalar
    Scalar(ScalarKind),
    /// String
    String,
    /// Fixed-size vector or matrix
    Fixed(FixedKind),
    /// Polygon mesh geometry
    PolygonMesh,
    /// Line segment geometry
    Lines,
    /// Anything else; resolved through engine struct layouts
    Struct(String),
}

impl BaseType {
    /// Classify a base type name (array marker already stripped)
    pub fn parse(name: &str) -> Self {
        let name = canonical_name(name);
        if let Some(kind) = ScalarKind::from_name(name) {
            return Self::Scalar(kind);
        }
        if let Some(kind) = FixedKind::from_name(name) {
            return Self::Fixed(kind);
        }
        match name {
            "String" => Self::String,
            "PolygonMesh" => Self::PolygonMesh,
            "Lines" => Self::Lines,
            other => Self::Struct(other.to_string()),
        }
    }
}

/// Map engine type aliases to their canonical names
pub fn canonical_name(name: &str) -> &str {
    match name {
        "Integer" | "SInt" => "SInt32",
        "UInt" | "Count" => "UInt32",
        "Size" | "Index" => "UInt64",
        "Byte" => "UInt8",
        "Scalar" | "Float" => "Float32",
        "Double" => "Float64",
        "Bool" => "Boolean",
        other => other,
    }
}

/// Interned identifier for a base type name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey(u32);

impl TypeKey {
    /// Raw index into the interner
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Interns base type names so dispatch never compares strings twice
#[derive(Debug, Default, Clone)]
pub struct TypeInterner {
    names: IndexSet<String>,
    aliases: HashMap<String, TypeKey>,
}

impl TypeInterner {
    /// Create an empty interner
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name, returning its key
    pub fn intern(&mut self, name: &str) -> TypeKey {
        if let Some(key) = self.get(name) {
            return key;
        }
        let (index, _) = self.names.insert_full(canonical_name(name).to_string());
        TypeKey(index as u32)
    }

    /// Register an alias that resolves to an existing (or new) name
    pub fn alias(&mut self, alias: &str, target: &str) -> TypeKey {
        let key = self.intern(target);
        self.aliases.insert(alias.to_string(), key);
        key
    }

    /// Look up a name without interning it
    pub fn get(&self, name: &str) -> Option<TypeKey> {
        if let Some(key) = self.aliases.get(name) {
            return Some(*key);
        }
        self.names
            .get_index_of(canonical_name(name))
            .map(|index| TypeKey(index as u32))
    }

    /// Name behind a key
    pub fn name(&self, key: TypeKey) -> Option<&str> {
        self.names.get_index(key.index()).map(String::as_str)
    }

    /// Number of interned names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing is interned
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A field of an engine struct type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    /// Field name
    pub name: String,
    /// Resolved field type
    pub resolved_type: String,
}

/// Deepest struct nesting followed before a layout is treated as cyclic
pub(crate) const MAX_STRUCT_DEPTH: usize = 8;

/// Field layout of an engine struct type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructLayout {
    /// Struct type name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<StructField>,
}

impl StructLayout {
    /// Create a layout from `(field, type)` pairs
    pub fn new(name: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .iter()
                .map(|(field, ty)| StructField {
                    name: (*field).to_string(),
                    resolved_type: (*ty).to_string(),
                })
                .collect(),
        }
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_array_marker() {
        assert_eq!(strip_array_marker("Vec3[]"), ("Vec3", true));
        assert_eq!(strip_array_marker("Float32"), ("Float32", false));
        assert_eq!(ResolvedType::parse("SInt8[]").to_string(), "SInt8[]");
    }

    #[test]
    fn test_aliases_resolve() {
        assert_eq!(BaseType::parse("Integer"), BaseType::Scalar(ScalarKind::SInt32));
        assert_eq!(BaseType::parse("Scalar"), BaseType::Scalar(ScalarKind::Float32));
        assert_eq!(BaseType::parse("Mat44"), BaseType::Fixed(FixedKind::Mat44));
        assert_eq!(BaseType::parse("Xfo"), BaseType::Struct("Xfo".to_string()));
    }

    #[test]
    fn test_interner_dedupes_aliases() {
        let mut interner = TypeInterner::new();
        let a = interner.intern("SInt32");
        let b = interner.intern("Integer");
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);

        let custom = interner.alias("MyFloat", "Float64");
        assert_eq!(interner.get("MyFloat"), Some(custom));
        assert_eq!(interner.name(custom), Some("Float64"));
        assert_eq!(interner.get("Unknown"), None);
    }
}

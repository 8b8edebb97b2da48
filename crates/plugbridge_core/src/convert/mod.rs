// SPDX-License-Identifier: MIT OR Apache-2.0
//! Converter registry: host value ↔ engine value dispatch.
//!
//! Base type names are interned once; each key maps to a [`ConverterPair`] of
//! plain function pointers. One converter per base type handles both the
//! single and the array shape, driven by [`PortContext::is_array`].

pub mod compound;
pub mod fixed;
pub mod geometry;
pub mod opaque;
pub mod scalar;

use crate::engine::{meta, EngineGraph, PortInfo};
use crate::error::ConversionError;
use crate::host::{AttributeInfo, AttributeTree, AttributeType, HostCapabilities, UnitKind};
use crate::types::{
    strip_array_marker, BaseType, FixedKind, ResolvedType, ScalarKind, TypeInterner, TypeKey,
};
use crate::value::{GraphValue, HostValue};
use std::collections::HashMap;

/// Host → engine conversion; receives the engine's current value for reuse
pub type ToEngineFn =
    fn(&PortContext<'_>, &HostValue, &GraphValue) -> Result<GraphValue, ConversionError>;

/// Engine → host conversion
pub type ToHostFn = fn(&PortContext<'_>, &GraphValue) -> Result<HostValue, ConversionError>;

/// Both directions for one base type
#[derive(Debug, Clone, Copy)]
pub struct ConverterPair {
    /// Host to engine
    pub to_engine: ToEngineFn,
    /// Engine to host
    pub to_host: ToHostFn,
}

/// Conversion direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host attribute into engine port
    ToEngine,
    /// Engine port into host attribute
    ToHost,
}

/// A converter for one direction
#[derive(Debug, Clone, Copy)]
pub enum Converter {
    /// Host to engine
    ToEngine(ToEngineFn),
    /// Engine to host
    ToHost(ToHostFn),
}

/// Everything a converter may consult about the binding it serves
pub struct PortContext<'a> {
    /// Engine port
    pub port: &'a PortInfo,
    /// Host attribute (or child / element) being converted
    pub attribute: &'a AttributeTree,
    /// Type being converted (the port type, or a field / element type)
    pub resolved: ResolvedType,
    /// Engine graph, for metadata and struct layouts
    pub graph: &'a dyn EngineGraph,
    /// Registry, for nested dispatch
    pub registry: &'a ConverterRegistry,
    /// Host capabilities
    pub capabilities: HostCapabilities,
}

impl<'a> PortContext<'a> {
    /// Context for a port and its own attribute
    pub fn new(
        port: &'a PortInfo,
        attribute: &'a AttributeTree,
        graph: &'a dyn EngineGraph,
        registry: &'a ConverterRegistry,
        capabilities: HostCapabilities,
    ) -> Self {
        Self {
            port,
            attribute,
            resolved: port.resolved(),
            graph,
            registry,
            capabilities,
        }
    }

    /// Classification of the converted base type
    pub fn base_type(&self) -> BaseType {
        self.resolved.base_type()
    }

    /// Whether the converted type is an array
    pub fn is_array(&self) -> bool {
        self.resolved.is_array
    }

    /// Port metadata value
    pub fn metadata(&self, key: &str) -> Option<String> {
        self.graph.port_metadata(&self.port.name, key)
    }

    /// Whether a port metadata flag is `"true"`
    pub fn flag(&self, key: &str) -> bool {
        self.metadata(key).is_some_and(|v| v == "true")
    }

    /// Unit of the converted scalar, from the attribute type or port metadata
    pub fn unit(&self) -> Option<UnitKind> {
        if let AttributeType::Unit(unit) = self.attribute.info.ty {
            return Some(unit);
        }
        if self.attribute.info.is_top_level() {
            return self
                .metadata(meta::SCALAR_UNIT)
                .and_then(|v| UnitKind::parse(&v));
        }
        None
    }

    /// The same binding viewed through another attribute and type
    pub fn with_attribute<'b>(
        &'b self,
        attribute: &'b AttributeTree,
        resolved: ResolvedType,
    ) -> PortContext<'b> {
        PortContext {
            port: self.port,
            attribute,
            resolved,
            graph: self.graph,
            registry: self.registry,
            capabilities: self.capabilities,
        }
    }

    /// Type of one array element
    pub fn element_type(&self) -> ResolvedType {
        ResolvedType {
            base: self.resolved.base.clone(),
            is_array: false,
        }
    }

    pub(crate) fn host_shape(&self, found: &HostValue) -> ConversionError {
        ConversionError::HostShape {
            expected: self.resolved.to_string(),
            found: found.describe().to_string(),
        }
    }

    pub(crate) fn engine_shape(&self, found: &GraphValue) -> ConversionError {
        ConversionError::EngineShape {
            attribute: self.attribute.name().to_string(),
            found: found.type_name(),
        }
    }
}

/// Dispatch table of converters keyed by interned base type
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    interner: TypeInterner,
    table: HashMap<TypeKey, ConverterPair>,
}

impl ConverterRegistry {
    /// Registry with every built-in converter
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for kind in ScalarKind::ALL {
            registry.register(kind.name(), scalar::NUMERIC);
        }
        registry.register("String", scalar::STRING);
        for kind in FixedKind::ALL {
            registry.register(kind.name(), fixed::FIXED);
        }
        registry.register("PolygonMesh", geometry::MESH);
        registry.register("Lines", geometry::LINES);
        registry
    }

    /// Registry with no converters
    pub fn empty() -> Self {
        Self {
            interner: TypeInterner::new(),
            table: HashMap::new(),
        }
    }

    /// Register (or replace) the converters for a base type name
    pub fn register(&mut self, type_name: &str, pair: ConverterPair) -> TypeKey {
        let key = self.interner.intern(type_name);
        self.table.insert(key, pair);
        key
    }

    /// Make `alias` dispatch like `target`
    pub fn alias(&mut self, alias: &str, target: &str) -> TypeKey {
        self.interner.alias(alias, target)
    }

    /// Interned key for a resolved type name, array marker ignored
    pub fn key(&self, resolved: &str) -> Option<TypeKey> {
        let (base, _) = strip_array_marker(resolved);
        self.interner.get(base)
    }

    /// Both converters for a resolved type name
    pub fn pair(&self, resolved: &str) -> Option<ConverterPair> {
        self.key(resolved).and_then(|key| self.table.get(&key).copied())
    }

    /// Converter for one direction; `None` means unsupported
    pub fn lookup(&self, direction: Direction, resolved: &str) -> Option<Converter> {
        self.pair(resolved).map(|pair| match direction {
            Direction::ToEngine => Converter::ToEngine(pair.to_engine),
            Direction::ToHost => Converter::ToHost(pair.to_host),
        })
    }

    /// Converters for a bound port, honouring opaque ports and struct layouts
    pub fn resolve(
        &self,
        port: &PortInfo,
        attribute: Option<&AttributeInfo>,
        graph: &dyn EngineGraph,
    ) -> Option<ConverterPair> {
        let opaque_port = graph
            .port_metadata(&port.name, meta::OPAQUE)
            .is_some_and(|v| v == "true");
        let opaque_attribute = attribute.is_some_and(|a| a.ty == AttributeType::Opaque);
        if opaque_port || opaque_attribute {
            return Some(opaque::OPAQUE);
        }
        self.pair_for(&port.resolved(), graph)
    }

    fn pair_for(&self, resolved: &ResolvedType, graph: &dyn EngineGraph) -> Option<ConverterPair> {
        if let Some(pair) = self.pair(&resolved.base) {
            return Some(pair);
        }
        match resolved.base_type() {
            BaseType::Struct(name) if graph.struct_layout(&name).is_some() => {
                Some(compound::STRUCT)
            }
            _ => None,
        }
    }

    /// Convert a nested value (struct field) host → engine
    pub fn to_engine(
        &self,
        ctx: &PortContext<'_>,
        value: &HostValue,
        current: &GraphValue,
    ) -> Result<GraphValue, ConversionError> {
        let pair = self
            .pair_for(&ctx.resolved, ctx.graph)
            .ok_or_else(|| ConversionError::Unsupported(ctx.resolved.to_string()))?;
        (pair.to_engine)(ctx, value, current)
    }

    /// Convert a nested value (struct field) engine → host
    pub fn to_host(
        &self,
        ctx: &PortContext<'_>,
        value: &GraphValue,
    ) -> Result<HostValue, ConversionError> {
        let pair = self
            .pair_for(&ctx.resolved, ctx.graph)
            .ok_or_else(|| ConversionError::Unsupported(ctx.resolved.to_string()))?;
        (pair.to_host)(ctx, value)
    }

    /// Number of registered base types
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no converter is registered
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal graph and attribute builders for converter tests.

    use super::*;
    use crate::engine::{NotificationSink, PortDirection};
    use crate::error::EngineError;
    use crate::host::NumericKind;
    use crate::types::StructLayout;

    #[derive(Default)]
    pub struct StubGraph {
        pub metadata: HashMap<(String, String), String>,
        pub layouts: Vec<StructLayout>,
    }

    impl EngineGraph for StubGraph {
        fn ports(&self) -> Vec<PortInfo> {
            Vec::new()
        }
        fn arg_value(&self, port: &str) -> Result<GraphValue, EngineError> {
            Err(EngineError::PortNotFound(port.to_string()))
        }
        fn set_arg_value(&mut self, _: &str, _: GraphValue) -> Result<(), EngineError> {
            Ok(())
        }
        fn execute(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn export_state(&self) -> Result<String, EngineError> {
            Ok(String::new())
        }
        fn metadata(&self, _: &str) -> Option<String> {
            None
        }
        fn set_metadata(&mut self, _: &str, _: &str) {}
        fn port_metadata(&self, port: &str, key: &str) -> Option<String> {
            self.metadata
                .get(&(port.to_string(), key.to_string()))
                .cloned()
        }
        fn set_port_metadata(&mut self, _: &str, _: &str, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
        fn struct_layout(&self, name: &str) -> Option<StructLayout> {
            self.layouts.iter().find(|l| l.name == name).cloned()
        }
        fn set_notification_sink(&mut self, _: Option<NotificationSink>) {}
    }

    pub fn leaf(name: &str, ty: AttributeType) -> AttributeTree {
        AttributeTree {
            info: AttributeInfo {
                name: name.to_string(),
                ty,
                array: false,
                parent: None,
                children: Vec::new(),
                readable: true,
                writable: true,
                hidden: false,
                dynamic: true,
            },
            children: Vec::new(),
        }
    }

    pub fn compound(name: &str, children: Vec<AttributeTree>) -> AttributeTree {
        let mut tree = leaf(name, AttributeType::Compound);
        tree.info.children = children.iter().map(|c| c.name().to_string()).collect();
        tree.children = children
            .into_iter()
            .map(|mut c| {
                c.info.parent = Some(name.to_string());
                c
            })
            .collect();
        tree
    }

    pub fn xyz(name: &str) -> AttributeTree {
        compound(
            name,
            ["X", "Y", "Z"]
                .iter()
                .map(|s| leaf(&format!("{name}{s}"), AttributeType::Numeric(NumericKind::Double)))
                .collect(),
        )
    }

    pub fn port(resolved: &str) -> PortInfo {
        PortInfo::new("p", PortDirection::In, resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::host::NumericKind;
    use crate::numeric::Scalar;

    #[test]
    fn test_builtin_lookup_strips_marker() {
        let registry = ConverterRegistry::new();
        assert!(registry.pair("Float32").is_some());
        assert!(registry.pair("Vec3[]").is_some());
        assert!(registry.pair("PolygonMesh").is_some());
        assert!(matches!(
            registry.lookup(Direction::ToHost, "SInt16"),
            Some(Converter::ToHost(_))
        ));
        assert!(registry.lookup(Direction::ToEngine, "Mystery").is_none());
    }

    #[test]
    fn test_aliases_share_keys() {
        let mut registry = ConverterRegistry::new();
        assert_eq!(registry.key("Integer"), registry.key("SInt32"));
        assert_eq!(registry.key("Scalar[]"), registry.key("Float32"));
        registry.alias("Real", "Float64");
        assert_eq!(registry.key("Real"), registry.key("Float64"));
        assert!(registry.pair("Real").is_some());
    }

    #[test]
    fn test_resolve_prefers_opaque_then_struct() {
        let registry = ConverterRegistry::new();
        let mut graph = StubGraph::default();
        graph.layouts.push(crate::types::StructLayout::new("Xfo", &[("tr", "Vec3")]));
        assert!(registry.resolve(&port("Xfo"), None, &graph).is_some());
        assert!(registry.resolve(&port("Unknown"), None, &graph).is_none());

        graph
            .metadata
            .insert(("p".into(), meta::OPAQUE.into()), "true".into());
        let pair = registry.resolve(&port("Unknown"), None, &graph);
        assert!(pair.is_some());
    }

    #[test]
    fn test_unit_from_metadata_only_at_top_level() {
        let registry = ConverterRegistry::new();
        let mut graph = StubGraph::default();
        graph
            .metadata
            .insert(("p".into(), meta::SCALAR_UNIT.into()), "angle".into());
        let p = port("Float64");
        let attr = leaf("p", AttributeType::Numeric(NumericKind::Double));
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        assert_eq!(ctx.unit(), Some(UnitKind::Angle));

        let parent = compound("c", vec![attr.clone()]);
        let child_ctx = ctx.with_attribute(&parent.children[0], ctx.element_type());
        assert_eq!(child_ctx.unit(), None);

        let value = registry
            .to_engine(&ctx, &HostValue::Double(180.0), &GraphValue::Null)
            .unwrap();
        match value {
            GraphValue::Scalar(Scalar::Float64(v)) => {
                assert!((v - std::f64::consts::PI).abs() < 1e-9)
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

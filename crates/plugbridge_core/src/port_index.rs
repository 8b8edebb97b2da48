// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host attribute ↔ engine port index.
//!
//! Rebuilt whenever either side changes structurally; between rebuilds every
//! lookup is a hash or vector access.

use crate::convert::{ConverterPair, ConverterRegistry};
use crate::engine::{EngineGraph, PortInfo};
use crate::host::{split_path, AttributeInfo};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Infrastructure attributes that never map to ports
pub const RESERVED_ATTRIBUTES: [&str; 6] = [
    "saveData",
    "refFilePath",
    "enableEvalContext",
    "evalID",
    "cacheToDisk",
    "lockState",
];

/// Port names that collide with host built-ins and get exposed with [`REMAP_PREFIX`]
pub const REMAPPED_PORTS: [&str; 3] = ["message", "saveData", "refFilePath"];

/// Prefix of remapped port attributes
pub const REMAP_PREFIX: &str = "graph_";

/// Whether an attribute name is reserved infrastructure
pub fn is_reserved(name: &str) -> bool {
    RESERVED_ATTRIBUTES.contains(&name)
}

/// Host attribute name exposing an engine port
pub fn attribute_name_for_port(port: &str) -> String {
    if REMAPPED_PORTS.contains(&port) {
        format!("{REMAP_PREFIX}{port}")
    } else {
        port.to_string()
    }
}

/// Engine port name behind a host attribute name
pub fn port_name_for_attribute(attribute: &str) -> &str {
    match attribute.strip_prefix(REMAP_PREFIX) {
        Some(port) if REMAPPED_PORTS.contains(&port) => port,
        _ => attribute,
    }
}

/// One host attribute bound to one engine port
#[derive(Debug, Clone)]
pub struct PortBinding {
    /// Top-level host attribute name
    pub attribute: String,
    /// Position of the attribute in the index
    pub attribute_index: usize,
    /// Engine port
    pub port: PortInfo,
    /// Position of the port in the engine's port list
    pub port_index: usize,
    /// Cached converters; `None` when the type is unsupported
    pub converters: Option<ConverterPair>,
}

/// Bidirectional attribute/port map
#[derive(Debug, Clone, Default)]
pub struct PortIndex {
    attributes: IndexMap<String, AttributeInfo>,
    owners: HashMap<String, String>,
    ports: Vec<PortInfo>,
    port_to_attribute: Vec<Option<usize>>,
    bindings: IndexMap<String, PortBinding>,
}

impl PortIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from the current host attributes and engine ports
    pub fn build(
        attributes: &[AttributeInfo],
        ports: &[PortInfo],
        registry: &ConverterRegistry,
        graph: &dyn EngineGraph,
    ) -> Self {
        let by_name: HashMap<&str, &AttributeInfo> =
            attributes.iter().map(|a| (a.name.as_str(), a)).collect();

        let mut index = Self {
            ports: ports.to_vec(),
            port_to_attribute: vec![None; ports.len()],
            ..Self::default()
        };

        for attribute in attributes {
            let mut owner = attribute;
            while let Some(parent) = owner.parent.as_deref().and_then(|p| by_name.get(p).copied()) {
                owner = parent;
            }
            if is_reserved(&owner.name) {
                continue;
            }
            index
                .owners
                .insert(attribute.name.clone(), owner.name.clone());
            if attribute.is_top_level() {
                index
                    .attributes
                    .insert(attribute.name.clone(), attribute.clone());
            }
        }

        for (port_index, port) in ports.iter().enumerate() {
            let name = attribute_name_for_port(&port.name);
            let Some((attribute_index, _, attribute)) = index.attributes.get_full(&name) else {
                continue;
            };
            let converters = registry.resolve(port, Some(attribute), graph);
            if converters.is_none() {
                tracing::warn!(
                    port = %port.name,
                    resolved_type = %port.resolved_type,
                    "No converter for port type"
                );
            }
            index.port_to_attribute[port_index] = Some(attribute_index);
            index.bindings.insert(
                name.clone(),
                PortBinding {
                    attribute: name,
                    attribute_index,
                    port: port.clone(),
                    port_index,
                    converters,
                },
            );
        }

        tracing::debug!(
            attributes = index.attributes.len(),
            ports = index.ports.len(),
            bound = index.bindings.len(),
            "Rebuilt port index"
        );
        index
    }

    /// Top-level owner of an attribute path (`a`, `a[3]`, `a[3].b`, `aX`)
    pub fn owner_of(&self, path: &str) -> Option<&str> {
        let (head, _, rest) = split_path(path);
        let leaf = rest
            .map(|r| split_path(r).0)
            .filter(|leaf| self.owners.contains_key(*leaf));
        self.owners
            .get(leaf.unwrap_or(head))
            .or_else(|| self.owners.get(head))
            .map(String::as_str)
    }

    /// Binding of a top-level attribute
    pub fn binding(&self, attribute: &str) -> Option<&PortBinding> {
        self.bindings.get(attribute)
    }

    /// Binding of an engine port
    pub fn binding_for_port(&self, port: &str) -> Option<&PortBinding> {
        self.bindings.get(&attribute_name_for_port(port))
    }

    /// Every binding in attribute order
    pub fn bindings(&self) -> impl Iterator<Item = &PortBinding> {
        self.bindings.values()
    }

    /// Port bound to an attribute
    pub fn port_for_attribute(&self, attribute: &str) -> Option<&PortInfo> {
        self.binding(attribute).map(|b| &b.port)
    }

    /// Attribute bound to a port
    pub fn attribute_for_port(&self, port: &str) -> Option<&str> {
        let position = self.ports.iter().position(|p| p.name == port)?;
        let attribute = self.port_to_attribute[position]?;
        self.attributes
            .get_index(attribute)
            .map(|(name, _)| name.as_str())
    }

    /// Ports without a host attribute
    pub fn unmapped_ports(&self) -> Vec<&PortInfo> {
        self.ports
            .iter()
            .zip(&self.port_to_attribute)
            .filter(|(_, attribute)| attribute.is_none())
            .map(|(port, _)| port)
            .collect()
    }

    /// Top-level attribute by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.get(name)
    }

    /// Indexed engine ports
    pub fn ports(&self) -> &[PortInfo] {
        &self.ports
    }

    /// Number of bound pairs
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::test_support::StubGraph;
    use crate::engine::PortDirection;
    use crate::host::{AttributeType, NumericKind};

    fn attr(name: &str, parent: Option<&str>) -> AttributeInfo {
        AttributeInfo {
            name: name.to_string(),
            ty: AttributeType::Numeric(NumericKind::Double),
            array: false,
            parent: parent.map(str::to_string),
            children: Vec::new(),
            readable: true,
            writable: true,
            hidden: false,
            dynamic: true,
        }
    }

    fn sample() -> PortIndex {
        let mut pos = attr("pos", None);
        pos.ty = AttributeType::Compound;
        pos.children = vec!["posX".into(), "posY".into(), "posZ".into()];
        let attributes = vec![
            attr("saveData", None),
            attr("x", None),
            pos,
            attr("posX", Some("pos")),
            attr("posY", Some("pos")),
            attr("posZ", Some("pos")),
            attr("graph_message", None),
        ];
        let ports = vec![
            PortInfo::new("x", PortDirection::In, "Float64"),
            PortInfo::new("pos", PortDirection::In, "Vec3"),
            PortInfo::new("message", PortDirection::Out, "String"),
            PortInfo::new("orphan", PortDirection::Out, "Float32"),
        ];
        PortIndex::build(&attributes, &ports, &ConverterRegistry::new(), &StubGraph::default())
    }

    #[test]
    fn test_remapped_names() {
        assert_eq!(attribute_name_for_port("message"), "graph_message");
        assert_eq!(attribute_name_for_port("x"), "x");
        assert_eq!(port_name_for_attribute("graph_saveData"), "saveData");
        assert_eq!(port_name_for_attribute("graph_other"), "graph_other");
    }

    #[test]
    fn test_bindings_and_owners() {
        let index = sample();
        assert_eq!(index.len(), 3);
        assert_eq!(index.port_for_attribute("x").unwrap().name, "x");
        assert_eq!(index.attribute_for_port("message"), Some("graph_message"));
        assert_eq!(index.binding_for_port("message").unwrap().attribute, "graph_message");
        assert_eq!(index.owner_of("posY"), Some("pos"));
        assert_eq!(index.owner_of("pos[2].posX"), Some("pos"));
        assert_eq!(index.owner_of("x"), Some("x"));
        assert!(index.binding("pos").unwrap().converters.is_some());
    }

    #[test]
    fn test_reserved_never_bound() {
        let index = sample();
        assert!(is_reserved("evalID"));
        assert_eq!(index.owner_of("saveData"), None);
        assert!(index.binding("saveData").is_none());
    }

    #[test]
    fn test_unmapped_ports() {
        let index = sample();
        let unmapped: Vec<_> = index.unmapped_ports().iter().map(|p| p.name.clone()).collect();
        assert_eq!(unmapped, vec!["orphan".to_string()]);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host-side session: owns the registry and carries out queued host requests.

use plugbridge_core::host::{plug_attribute, AttributeInfo, AttributeType, NumericKind};
use plugbridge_core::memory::{MemoryEngineHost, MemoryHost};
use plugbridge_core::{
    BindError, BindingId, BindingRegistry, BoundNode, Config, ExecuteReport, HostError, HostNode,
    HostRequest, HostValue, ManagedNode,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Node type driven by the CLI
pub type Node = BoundNode<MemoryHost, MemoryEngineHost>;

/// Session failure
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Binding operation failed
    #[error(transparent)]
    Bind(#[from] BindError),

    /// `--set` argument is malformed
    #[error("Invalid assignment '{0}': expected name=value")]
    InvalidAssignment(String),

    /// Value text does not fit the attribute
    #[error("Cannot assign '{value}' to {attribute}: {reason}")]
    InvalidValue {
        /// Target attribute
        attribute: String,
        /// Rejected text
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// File could not be read or written
    #[error("I/O error on {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    /// Reference file watcher failed
    #[error("Watch error: {0}")]
    Watch(#[source] notify::Error),

    /// Output snapshot could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Registry plus the request pump
pub struct Session {
    registry: BindingRegistry<Node>,
}

impl Session {
    /// Create an empty session
    pub fn new(config: Config) -> Self {
        Self {
            registry: BindingRegistry::new(config),
        }
    }

    /// Underlying registry
    pub fn registry(&self) -> &BindingRegistry<Node> {
        &self.registry
    }

    /// Load a node from its persisted state, binding an empty graph when there is none
    pub fn load_node(&mut self, host: MemoryHost) -> Result<BindingId, SessionError> {
        let node = self.registry.create(|id, services| {
            Node::load(id, services, host, MemoryEngineHost::new())
        })?;
        let id = node.lock().binding_id();
        Ok(id)
    }

    /// Apply `name=value` to a node's host attribute; returns the outputs it invalidates
    pub fn assign(&self, id: BindingId, assignment: &str) -> Result<Vec<String>, SessionError> {
        let (name, text) = parse_assignment(assignment)?;
        let info = self.registry.with_node(id, |node| {
            node.host()
                .attribute(name)
                .ok_or_else(|| HostError::AttributeNotFound(name.to_string()).into())
        })?;
        let value = parse_value(&info, text).map_err(|reason| SessionError::InvalidValue {
            attribute: name.to_string(),
            value: text.to_string(),
            reason,
        })?;
        Ok(self.registry.with_node(id, |node| node.set_value(name, value))?)
    }

    /// Carry out every pending host request; returns how many ran
    pub fn pump(&self) -> usize {
        let mut handled = 0;
        // requests may enqueue further requests
        loop {
            let requests = self.registry.queue().drain();
            if requests.is_empty() {
                return handled;
            }
            for request in requests {
                if let Err(e) = self.dispatch(&request) {
                    tracing::warn!(binding = %request.binding(), "Request failed: {e}");
                }
                handled += 1;
            }
        }
    }

    fn dispatch(&self, request: &HostRequest) -> Result<(), BindError> {
        match request {
            HostRequest::MarkDirty { attribute, .. } => {
                let node_name = attribute.split_once('.').map_or("", |(n, _)| n);
                match self.registry.find_by_name(node_name) {
                    Some(node) => {
                        node.lock().set_dependents_dirty(plug_attribute(attribute));
                    }
                    None => tracing::debug!(plug = %attribute, "No bound node for plug"),
                }
                Ok(())
            }
            _ => self
                .registry
                .with_node(request.binding(), |node| node.handle(request)),
        }
    }

    /// Evaluate a node
    pub fn compute(&self, id: BindingId) -> Result<ExecuteReport, SessionError> {
        Ok(self.registry.with_node(id, Node::compute)?)
    }

    /// Output attribute values of a node as JSON
    pub fn outputs(&self, id: BindingId) -> Result<serde_json::Value, SessionError> {
        let snapshot = self.registry.with_node(id, |node| {
            let mut values = BTreeMap::new();
            for binding in node.binding().port_index().bindings() {
                if binding.port.direction.is_output() {
                    values.insert(binding.attribute.clone(), node.host().value(&binding.attribute)?);
                }
            }
            Ok(values)
        })?;
        Ok(serde_json::to_value(snapshot)?)
    }

    /// Export a node's state blob
    pub fn export(&self, id: BindingId) -> Result<String, SessionError> {
        Ok(self.registry.with_node(id, Node::export_state)?)
    }
}

/// Split `name=value`
pub fn parse_assignment(text: &str) -> Result<(&str, &str), SessionError> {
    match text.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => Err(SessionError::InvalidAssignment(text.to_string())),
    }
}

/// Parse command-line text into a value for `info`
pub fn parse_value(info: &AttributeInfo, text: &str) -> Result<HostValue, String> {
    let number = |t: &str| t.trim().parse::<f64>().map_err(|e| format!("{t}: {e}"));
    let list = || text.split(',').map(number).collect::<Result<Vec<_>, _>>();
    match info.ty {
        AttributeType::Numeric(NumericKind::Boolean) => match text {
            "true" | "1" | "on" => Ok(HostValue::Bool(true)),
            "false" | "0" | "off" => Ok(HostValue::Bool(false)),
            _ => Err(format!("{text} is not a boolean")),
        },
        AttributeType::Numeric(NumericKind::Float | NumericKind::Double) | AttributeType::Unit(_) => {
            number(text).map(HostValue::Double)
        }
        AttributeType::Numeric(_) => text
            .parse::<i64>()
            .map(HostValue::Int64)
            .map_err(|e| format!("{text}: {e}")),
        AttributeType::String => Ok(HostValue::String(text.to_string())),
        AttributeType::Numeric3(_) => match list()?.as_slice() {
            [x, y, z] => Ok(HostValue::Double3([*x, *y, *z])),
            _ => Err("expected three comma-separated numbers".to_string()),
        },
        AttributeType::Compound => {
            let values = list()?;
            if values.len() != info.children.len() {
                return Err(format!("expected {} comma-separated numbers", info.children.len()));
            }
            Ok(HostValue::Compound(values.into_iter().map(HostValue::Double).collect()))
        }
        AttributeType::Data(_) => {
            let values = list()?;
            Ok(HostValue::DoubleArray(values))
        }
        AttributeType::Matrix | AttributeType::Opaque | AttributeType::Message => {
            Err("not settable from the command line".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugbridge_core::memory::{GraphDefinition, MemoryGraph, Op, PortDef};
    use plugbridge_core::{EngineGraph, PortDirection};

    fn doubler_blob() -> String {
        let definition = GraphDefinition::new("doubler")
            .port(PortDef::new("x", PortDirection::In, "Float32"))
            .port(PortDef::new("y", PortDirection::Out, "Float32"))
            .op(Op::Scale {
                from: "x".into(),
                to: "y".into(),
                factor: 2.0,
            });
        MemoryGraph::new(definition).export_state().unwrap()
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment(" x = 3 ").unwrap(), ("x", "3"));
        assert!(parse_assignment("=3").is_err());
        assert!(parse_assignment("x").is_err());
    }

    #[test]
    fn test_parse_value_by_type() {
        let mut host = MemoryHost::new("n");
        let info = host.attribute("enableEvalContext").unwrap();
        assert_eq!(parse_value(&info, "on").unwrap(), HostValue::Bool(true));
        let info = host.attribute("evalID").unwrap();
        assert_eq!(parse_value(&info, "7").unwrap(), HostValue::Int64(7));
        assert!(parse_value(&info, "seven").is_err());
        host.add_attribute(plugbridge_core::AttributeSpec::new(
            "c",
            AttributeType::Numeric3(NumericKind::Float),
        ))
        .unwrap();
        let info = host.attribute("c").unwrap();
        assert_eq!(
            parse_value(&info, "1, 2,3").unwrap(),
            HostValue::Double3([1.0, 2.0, 3.0])
        );
    }

    #[test]
    fn test_pump_runs_queued_evaluation() {
        let mut session = Session::new(Config::default());
        let mut host = MemoryHost::new("n1");
        host.set_value("saveData", HostValue::String(doubler_blob())).unwrap();
        let id = session.load_node(host).unwrap();
        session.assign(id, "x=4").unwrap();
        // the import queued one evaluation
        assert_eq!(session.pump(), 1);
        let outputs = session.outputs(id).unwrap();
        assert_eq!(outputs["y"], serde_json::json!({ "Float": 8.0 }));
    }

    #[test]
    fn test_assign_unknown_attribute() {
        let mut session = Session::new(Config::default());
        let id = session.load_node(MemoryHost::new("n1")).unwrap();
        assert!(matches!(
            session.assign(id, "nope=1"),
            Err(SessionError::Bind(BindError::Host(_)))
        ));
        assert!(matches!(
            session.assign(id, "evalID=seven"),
            Err(SessionError::InvalidValue { .. })
        ));
    }
}

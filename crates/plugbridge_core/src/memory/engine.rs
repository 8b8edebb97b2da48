// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory engine with a small fixed operation set.
//!
//! State blobs are JSON: `{ "definition": { name, ports, ops, metadata, structs }, "values": {..} }`.

use crate::engine::{
    EngineGraph, EngineHost, EvalContext, Notification, NotificationSink, PortDirection, PortInfo,
};
use crate::error::EngineError;
use crate::numeric::Scalar;
use crate::types::{BaseType, ResolvedType, StructLayout};
use crate::value::GraphValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One declared port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDef {
    /// Port name
    pub name: String,
    /// Direction
    pub direction: PortDirection,
    /// Resolved type
    pub resolved_type: String,
    /// Port metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PortDef {
    /// Create a port without metadata
    pub fn new(name: impl Into<String>, direction: PortDirection, resolved_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction,
            resolved_type: resolved_type.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Operation run in order on execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// `to = from`
    Copy {
        /// Source port
        from: String,
        /// Target port
        to: String,
    },
    /// `to = from * factor`, component-wise for vectors
    Scale {
        /// Source port
        from: String,
        /// Target port
        to: String,
        /// Multiplier
        factor: f64,
    },
    /// `to = a + b`
    Add {
        /// First operand
        a: String,
        /// Second operand
        b: String,
        /// Target port
        to: String,
    },
    /// Raise an execution error
    Fail {
        /// Error message
        message: String,
    },
}

/// Graph definition: everything but argument values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// Graph name
    pub name: String,
    /// Ports in declaration order
    #[serde(default)]
    pub ports: Vec<PortDef>,
    /// Operations
    #[serde(default)]
    pub ops: Vec<Op>,
    /// Graph metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Registered struct types
    #[serde(default)]
    pub structs: Vec<StructLayout>,
}

impl GraphDefinition {
    /// Empty definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a port
    pub fn port(mut self, port: PortDef) -> Self {
        self.ports.push(port);
        self
    }

    /// Add an operation
    pub fn op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    /// Register a struct type
    pub fn struct_type(mut self, layout: StructLayout) -> Self {
        self.structs.push(layout);
        self
    }

    /// Set graph metadata
    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateBlob {
    definition: GraphDefinition,
    #[serde(default)]
    values: IndexMap<String, GraphValue>,
}

/// Graph instance of the in-memory engine
#[derive(Debug)]
pub struct MemoryGraph {
    definition: GraphDefinition,
    values: IndexMap<String, GraphValue>,
    sink: Option<NotificationSink>,
    eval_context: Option<EvalContext>,
    handles_attached: bool,
    executions: usize,
}

impl MemoryGraph {
    /// Instantiate a definition with default argument values
    pub fn new(definition: GraphDefinition) -> Self {
        let mut graph = Self {
            definition,
            values: IndexMap::new(),
            sink: None,
            eval_context: None,
            handles_attached: true,
            executions: 0,
        };
        let names: Vec<String> = graph.definition.ports.iter().map(|p| p.name.clone()).collect();
        for name in names {
            graph.reset_value(&name);
        }
        graph
    }

    /// Definition
    pub fn definition(&self) -> &GraphDefinition {
        &self.definition
    }

    /// Context handed over by the last evaluation, if any
    pub fn eval_context(&self) -> Option<&EvalContext> {
        self.eval_context.as_ref()
    }

    /// Whether external handles are attached
    pub fn handles_attached(&self) -> bool {
        self.handles_attached
    }

    /// Number of successful executions
    pub fn executions(&self) -> usize {
        self.executions
    }

    fn notify(&self, notification: Notification) {
        if let Some(sink) = &self.sink {
            sink.push(notification);
        }
    }

    fn def(&self, name: &str) -> Result<&PortDef, EngineError> {
        self.definition
            .ports
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| EngineError::PortNotFound(name.to_string()))
    }

    fn def_mut(&mut self, name: &str) -> Result<&mut PortDef, EngineError> {
        self.definition
            .ports
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| EngineError::PortNotFound(name.to_string()))
    }

    fn reset_value(&mut self, name: &str) {
        let Ok(port) = self.def(name) else {
            return;
        };
        let resolved = ResolvedType::parse(&port.resolved_type);
        let structs = &self.definition.structs;
        let lookup = |n: &str| structs.iter().find(|s| s.name == n).cloned();
        let value = GraphValue::default_for(&resolved, &lookup);
        self.values.insert(name.to_string(), value);
    }

    /// Add a port
    pub fn add_port(&mut self, port: PortDef) -> Result<(), EngineError> {
        if self.def(&port.name).is_ok() {
            return Err(EngineError::PortExists(port.name));
        }
        let notification = Notification::ArgInserted {
            name: port.name.clone(),
            resolved_type: port.resolved_type.clone(),
        };
        let name = port.name.clone();
        self.definition.ports.push(port);
        self.reset_value(&name);
        self.notify(notification);
        Ok(())
    }

    /// Remove a port
    pub fn remove_port(&mut self, name: &str) -> Result<(), EngineError> {
        self.def(name)?;
        self.definition.ports.retain(|p| p.name != name);
        self.values.shift_remove(name);
        self.notify(Notification::ArgRemoved {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Rename a port, keeping its value
    pub fn rename_port(&mut self, old: &str, new: &str) -> Result<(), EngineError> {
        if self.def(new).is_ok() {
            return Err(EngineError::PortExists(new.to_string()));
        }
        self.def_mut(old)?.name = new.to_string();
        if let Some(value) = self.values.shift_remove(old) {
            self.values.insert(new.to_string(), value);
        }
        self.notify(Notification::ArgRenamed {
            old: old.to_string(),
            new: new.to_string(),
        });
        Ok(())
    }

    /// Change a port's type; its value resets to the new type's default
    pub fn set_port_type(&mut self, name: &str, resolved_type: &str) -> Result<(), EngineError> {
        self.def_mut(name)?.resolved_type = resolved_type.to_string();
        self.reset_value(name);
        self.notify(Notification::ArgTypeChanged {
            name: name.to_string(),
            resolved_type: resolved_type.to_string(),
        });
        Ok(())
    }

    /// Append an operation
    pub fn add_op(&mut self, op: Op) {
        self.definition.ops.push(op);
        self.notify(Notification::Dirty);
    }

    /// Declare a graph variable
    pub fn add_variable(&mut self, name: &str) {
        self.notify(Notification::VarInserted {
            name: name.to_string(),
        });
    }

    /// Drop a graph variable
    pub fn remove_variable(&mut self, name: &str) {
        self.notify(Notification::VarRemoved {
            name: name.to_string(),
        });
    }

    fn input(&self, name: &str) -> Result<GraphValue, EngineError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::PortNotFound(name.to_string()))
    }

    /// Store an op result, cast to the target port's scalar kind
    fn store(&mut self, to: &str, value: GraphValue) -> Result<(), EngineError> {
        let port = self.def(to)?;
        let value = match (ResolvedType::parse(&port.resolved_type).base_type(), &value) {
            (BaseType::Scalar(kind), GraphValue::Scalar(s)) => GraphValue::Scalar(s.cast(kind)),
            _ => value,
        };
        self.values.insert(to.to_string(), value);
        Ok(())
    }

    fn run_op(&mut self, op: &Op) -> Result<(), EngineError> {
        match op {
            Op::Copy { from, to } => {
                let value = self.input(from)?;
                self.store(to, value)
            }
            Op::Scale { from, to, factor } => {
                let value = scale(&self.input(from)?, *factor)
                    .ok_or_else(|| EngineError::Execution(format!("cannot scale '{from}'")))?;
                self.store(to, value)
            }
            Op::Add { a, b, to } => {
                let value = add(&self.input(a)?, &self.input(b)?)
                    .ok_or_else(|| EngineError::Execution(format!("cannot add '{a}' and '{b}'")))?;
                self.store(to, value)
            }
            Op::Fail { message } => Err(EngineError::Execution(message.clone())),
        }
    }
}

fn scale(value: &GraphValue, factor: f64) -> Option<GraphValue> {
    match value {
        GraphValue::Scalar(s) => Some(GraphValue::Scalar(Scalar::from_f64(
            s.kind(),
            s.as_f64() * factor,
        ))),
        GraphValue::Fixed(kind, data) => Some(GraphValue::Fixed(
            *kind,
            data.iter().map(|c| (f64::from(*c) * factor) as f32).collect(),
        )),
        _ => None,
    }
}

fn add(a: &GraphValue, b: &GraphValue) -> Option<GraphValue> {
    match (a, b) {
        (GraphValue::Scalar(x), GraphValue::Scalar(y)) => Some(GraphValue::Scalar(Scalar::from_f64(
            x.kind(),
            x.as_f64() + y.as_f64(),
        ))),
        (GraphValue::Fixed(kind, x), GraphValue::Fixed(other, y)) if kind == other => Some(
            GraphValue::Fixed(*kind, x.iter().zip(y).map(|(p, q)| p + q).collect()),
        ),
        _ => None,
    }
}

impl EngineGraph for MemoryGraph {
    fn ports(&self) -> Vec<PortInfo> {
        self.definition
            .ports
            .iter()
            .map(|p| PortInfo::new(p.name.clone(), p.direction, p.resolved_type.clone()))
            .collect()
    }

    fn arg_value(&self, port: &str) -> Result<GraphValue, EngineError> {
        self.def(port)?;
        Ok(self.values.get(port).cloned().unwrap_or_default())
    }

    fn set_arg_value(&mut self, port: &str, value: GraphValue) -> Result<(), EngineError> {
        let def = self.def(port)?;
        let expects_array = ResolvedType::parse(&def.resolved_type).is_array;
        if !matches!(value, GraphValue::Null) && value.is_array() != expects_array {
            return Err(EngineError::TypeMismatch {
                port: port.to_string(),
                expected: def.resolved_type.clone(),
                found: value.type_name(),
            });
        }
        self.values.insert(port.to_string(), value);
        Ok(())
    }

    fn execute(&mut self) -> Result<(), EngineError> {
        let ops = self.definition.ops.clone();
        for op in &ops {
            self.run_op(op)?;
        }
        self.executions += 1;
        Ok(())
    }

    fn export_state(&self) -> Result<String, EngineError> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            definition: &'a GraphDefinition,
            values: &'a IndexMap<String, GraphValue>,
        }
        serde_json::to_string(&Borrowed {
            definition: &self.definition,
            values: &self.values,
        })
        .map_err(|e| EngineError::Parse(e.to_string()))
    }

    fn metadata(&self, key: &str) -> Option<String> {
        self.definition.metadata.get(key).cloned()
    }

    fn set_metadata(&mut self, key: &str, value: &str) {
        self.definition
            .metadata
            .insert(key.to_string(), value.to_string());
    }

    fn port_metadata(&self, port: &str, key: &str) -> Option<String> {
        self.def(port).ok()?.metadata.get(key).cloned()
    }

    fn set_port_metadata(&mut self, port: &str, key: &str, value: &str) -> Result<(), EngineError> {
        self.def_mut(port)?
            .metadata
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn struct_layout(&self, name: &str) -> Option<StructLayout> {
        self.definition.structs.iter().find(|s| s.name == name).cloned()
    }

    fn set_notification_sink(&mut self, sink: Option<NotificationSink>) {
        self.sink = sink;
    }

    fn set_eval_context(&mut self, context: EvalContext) {
        self.eval_context = Some(context);
    }

    fn detach_external_handles(&mut self) {
        self.handles_attached = false;
    }

    fn attach_external_handles(&mut self) {
        self.handles_attached = true;
    }
}

/// Engine factory for [`MemoryGraph`]
#[derive(Debug, Default)]
pub struct MemoryEngineHost {
    created: usize,
    imported: usize,
}

impl MemoryEngineHost {
    /// Create a factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Graphs created empty
    pub fn created(&self) -> usize {
        self.created
    }

    /// Graphs imported from blobs
    pub fn imported(&self) -> usize {
        self.imported
    }
}

impl EngineHost for MemoryEngineHost {
    type Graph = MemoryGraph;

    fn name(&self) -> &str {
        "memory"
    }

    fn create_graph(&mut self, name: &str) -> Result<MemoryGraph, EngineError> {
        self.created += 1;
        Ok(MemoryGraph::new(GraphDefinition::new(name)))
    }

    fn import_graph(&mut self, blob: &str) -> Result<MemoryGraph, EngineError> {
        let state: StateBlob =
            serde_json::from_str(blob).map_err(|e| EngineError::Parse(e.to_string()))?;
        let mut graph = MemoryGraph::new(state.definition);
        for (name, value) in state.values {
            if graph.def(&name).is_err() {
                tracing::debug!(port = %name, "Dropping value of undeclared port");
                continue;
            }
            graph.values.insert(name, value);
        }
        self.imported += 1;
        Ok(graph)
    }
}

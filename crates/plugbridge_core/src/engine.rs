// SPDX-License-Identifier: MIT OR Apache-2.0
//! Computation-graph engine collaborator.
//!
//! An [`EngineHost`] creates or imports graphs; an [`EngineGraph`] exposes
//! named, typed ports and executes. Structural edits made on the engine side
//! are reported through a [`NotificationSink`] the binding registers.

use crate::error::EngineError;
use crate::types::{ResolvedType, StructLayout};
use crate::value::GraphValue;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Port metadata keys understood by the binding
pub mod meta {
    /// `"false"` suppresses host attribute creation
    pub const ADD_ATTRIBUTE: &str = "addAttribute";
    /// `"true"` carries the engine value through unchanged
    pub const OPAQUE: &str = "opaque";
    /// `"true"` maps arrays to bulk data attributes instead of multis
    pub const NATIVE_ARRAY: &str = "nativeArray";
    /// `angle`, `distance` or `time`
    pub const SCALAR_UNIT: &str = "scalarUnit";
    /// Graph metadata: `shared` or `exclusive`
    pub const LOCK_TYPE: &str = "lockType";
    /// Graph metadata: owning binding id
    pub const BINDING_ID: &str = "binding_id";
    /// Graph metadata: `"false"` once loaded from a reference file
    pub const EDITABLE: &str = "editable";
}

/// Direction of data flow through a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Host to engine
    In,
    /// Engine to host
    Out,
    /// Both ways
    Io,
}

impl PortDirection {
    /// Whether values flow into the engine
    pub fn is_input(&self) -> bool {
        matches!(self, Self::In | Self::Io)
    }

    /// Whether values flow back to the host
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Out | Self::Io)
    }
}

/// A named, typed engine port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// Port name
    pub name: String,
    /// Data flow direction
    pub direction: PortDirection,
    /// Resolved type, including `[]` for arrays
    pub resolved_type: String,
}

impl PortInfo {
    /// Create a port description
    pub fn new(
        name: impl Into<String>,
        direction: PortDirection,
        resolved_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            resolved_type: resolved_type.into(),
        }
    }

    /// Parsed resolved type
    pub fn resolved(&self) -> ResolvedType {
        ResolvedType::parse(&self.resolved_type)
    }

    /// Whether the port carries an array
    pub fn is_array(&self) -> bool {
        self.resolved().is_array
    }
}

/// How a binding holds the process-wide execution lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// Read side; bindings run concurrently
    #[default]
    Shared,
    /// Write side; nothing else executes meanwhile
    Exclusive,
}

impl LockMode {
    /// Parse a `lockType` metadata value
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "shared" => Some(Self::Shared),
            "exclusive" => Some(Self::Exclusive),
            _ => None,
        }
    }
}

/// Structural change reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// Graph output is dirty
    Dirty,
    /// A port was added
    ArgInserted {
        /// Port name
        name: String,
        /// Resolved type
        resolved_type: String,
    },
    /// A port changed type
    ArgTypeChanged {
        /// Port name
        name: String,
        /// New resolved type
        resolved_type: String,
    },
    /// A port was removed
    ArgRemoved {
        /// Port name
        name: String,
    },
    /// A port was renamed
    ArgRenamed {
        /// Previous name
        old: String,
        /// New name
        new: String,
    },
    /// A graph variable was added
    VarInserted {
        /// Variable path
        name: String,
    },
    /// A graph variable was removed
    VarRemoved {
        /// Variable path
        name: String,
    },
}

/// Queue the engine pushes notifications into
#[derive(Debug, Clone, Default)]
pub struct NotificationSink(Arc<Mutex<VecDeque<Notification>>>);

impl NotificationSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a notification
    pub fn push(&self, notification: Notification) {
        self.0.lock().push_back(notification);
    }

    /// Take every queued notification in arrival order
    pub fn drain(&self) -> Vec<Notification> {
        self.0.lock().drain(..).collect()
    }

    /// Number of queued notifications
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Host state handed to the engine before an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalContext {
    /// Host application name
    pub host: String,
    /// Node (graph) name
    pub graph: String,
    /// Current time in seconds
    pub time: f64,
    /// Path of the loaded scene
    pub current_file_path: String,
}

/// A live engine graph instance
pub trait EngineGraph: Send {
    /// Every port in declaration order
    fn ports(&self) -> Vec<PortInfo>;

    /// One port by name
    fn port(&self, name: &str) -> Option<PortInfo> {
        self.ports().into_iter().find(|p| p.name == name)
    }

    /// Current argument value of a port
    fn arg_value(&self, port: &str) -> Result<GraphValue, EngineError>;

    /// Replace the argument value of a port
    fn set_arg_value(&mut self, port: &str, value: GraphValue) -> Result<(), EngineError>;

    /// Run the graph
    fn execute(&mut self) -> Result<(), EngineError>;

    /// Serialize definition, metadata and argument values
    fn export_state(&self) -> Result<String, EngineError>;

    /// Graph-level metadata
    fn metadata(&self, key: &str) -> Option<String>;

    /// Set graph-level metadata
    fn set_metadata(&mut self, key: &str, value: &str);

    /// Port-level metadata
    fn port_metadata(&self, port: &str, key: &str) -> Option<String>;

    /// Set port-level metadata
    fn set_port_metadata(&mut self, port: &str, key: &str, value: &str)
        -> Result<(), EngineError>;

    /// Field layout of a registered struct type
    fn struct_layout(&self, name: &str) -> Option<StructLayout>;

    /// Register (or clear) the sink structural notifications go to
    fn set_notification_sink(&mut self, sink: Option<NotificationSink>);

    /// Hand host state to the graph before execution
    fn set_eval_context(&mut self, _context: EvalContext) {}

    /// Release engine objects that point into host-owned memory
    fn detach_external_handles(&mut self) {}

    /// Reacquire engine objects released by [`Self::detach_external_handles`]
    fn attach_external_handles(&mut self) {}
}

/// Factory for engine graphs
pub trait EngineHost {
    /// Graph type produced by this engine
    type Graph: EngineGraph;

    /// Engine name, used in diagnostics
    fn name(&self) -> &str {
        "engine"
    }

    /// Create an empty graph
    fn create_graph(&mut self, name: &str) -> Result<Self::Graph, EngineError>;

    /// Recreate a graph from an exported state blob
    fn import_graph(&mut self, blob: &str) -> Result<Self::Graph, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_flags() {
        assert!(PortDirection::In.is_input());
        assert!(!PortDirection::In.is_output());
        assert!(PortDirection::Io.is_input() && PortDirection::Io.is_output());
    }

    #[test]
    fn test_lock_mode_parse() {
        assert_eq!(LockMode::parse("Exclusive"), Some(LockMode::Exclusive));
        assert_eq!(LockMode::parse(" shared "), Some(LockMode::Shared));
        assert_eq!(LockMode::parse("none"), None);
    }

    #[test]
    fn test_sink_drains_in_order() {
        let sink = NotificationSink::new();
        let producer = sink.clone();
        producer.push(Notification::Dirty);
        producer.push(Notification::ArgRemoved { name: "x".into() });
        assert_eq!(sink.len(), 2);
        let drained = sink.drain();
        assert_eq!(drained[0], Notification::Dirty);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_port_array_flag() {
        assert!(PortInfo::new("p", PortDirection::In, "Vec3[]").is_array());
        assert!(!PortInfo::new("p", PortDirection::In, "Vec3").is_array());
    }
}

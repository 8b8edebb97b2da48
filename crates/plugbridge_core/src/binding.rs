// SPDX-License-Identifier: MIT OR Apache-2.0
//! Binding lifecycle: one engine graph bound to one host node.
//!
//! A [`Binding`] creates or imports its graph, keeps the host attribute set in
//! step with the graph's ports as structural notifications arrive, and persists
//! the graph state into the host's `saveData` attribute.

use crate::attr_factory::attribute_spec;
use crate::commands::{CommandQueue, HostRequest};
use crate::config::Config;
use crate::convert::{ConverterRegistry, PortContext};
use crate::dirty::DirtyTracker;
use crate::engine::{meta, EngineGraph, EngineHost, LockMode, Notification, NotificationSink, PortInfo};
use crate::error::{BindError, Result};
use crate::execution::{BindingPhase, ExecutionLock, PhaseCell};
use crate::host::{AttributeTree, HostNode};
use crate::port_index::{attribute_name_for_port, PortBinding, PortIndex};
use crate::value::HostValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Persisted graph state attribute
pub const SAVE_DATA: &str = "saveData";
/// External reference file attribute
pub const REF_FILE_PATH: &str = "refFilePath";
/// Evaluation context toggle attribute
pub const ENABLE_EVAL_CONTEXT: &str = "enableEvalContext";
/// Evaluation counter attribute
pub const EVAL_ID: &str = "evalID";

/// Stable identifier of a binding within its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingId(pub u32);

impl BindingId {
    /// Wrap a raw id
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw id
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared services injected into every binding by its registry
#[derive(Debug, Clone, Default)]
pub struct BindingServices {
    /// Converter dispatch table
    pub converters: Arc<ConverterRegistry>,
    /// Process-wide execution lock
    pub lock: ExecutionLock,
    /// Settings
    pub config: Arc<Config>,
    /// Deferred host work
    pub queue: CommandQueue,
}

/// An engine graph bound to a host node
pub struct Binding<G: EngineGraph> {
    pub(crate) id: BindingId,
    pub(crate) graph: Option<G>,
    pub(crate) sink: NotificationSink,
    pub(crate) index: PortIndex,
    pub(crate) index_stale: bool,
    pub(crate) dirty: DirtyTracker,
    pub(crate) services: BindingServices,
    pub(crate) phase: PhaseCell,
    pub(crate) lock_mode: LockMode,
    pub(crate) handles_detached: bool,
    last_imported: Option<String>,
    referenced: bool,
}

impl<G: EngineGraph> Binding<G> {
    /// Create an unbound binding
    pub fn new(id: BindingId, services: BindingServices) -> Self {
        let lock_mode = services.config.default_lock_mode;
        Self {
            id,
            graph: None,
            sink: NotificationSink::new(),
            index: PortIndex::new(),
            index_stale: true,
            dirty: DirtyTracker::new(),
            services,
            phase: PhaseCell::new(),
            lock_mode,
            handles_detached: false,
            last_imported: None,
            referenced: false,
        }
    }

    /// Binding id
    pub fn id(&self) -> BindingId {
        self.id
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> BindingPhase {
        self.phase.get()
    }

    /// Shared handle on the phase, for reentrancy checks from outside
    pub fn phase_cell(&self) -> PhaseCell {
        self.phase.clone()
    }

    /// Whether a graph is bound
    pub fn is_bound(&self) -> bool {
        self.graph.is_some()
    }

    /// Bound graph
    pub fn graph(&self) -> Option<&G> {
        self.graph.as_ref()
    }

    /// Bound graph, mutably
    pub fn graph_mut(&mut self) -> Option<&mut G> {
        self.graph.as_mut()
    }

    /// Lock mode used for execution
    pub fn lock_mode(&self) -> LockMode {
        self.lock_mode
    }

    /// Whether the graph was loaded from a reference file
    pub fn is_referenced(&self) -> bool {
        self.referenced
    }

    /// Dirty bookkeeping
    pub fn dirty(&self) -> &DirtyTracker {
        &self.dirty
    }

    /// Current port index
    pub fn port_index(&self) -> &PortIndex {
        &self.index
    }

    /// Sink the bound graph reports structural changes to
    pub fn sink(&self) -> &NotificationSink {
        &self.sink
    }

    /// Injected services
    pub fn services(&self) -> &BindingServices {
        &self.services
    }

    /// Binding of a host attribute, if it maps to a port
    pub fn port_binding(&self, attribute: &str) -> Option<&PortBinding> {
        self.index.binding(attribute)
    }

    pub(crate) fn require_graph(&self) -> Result<&G> {
        self.graph.as_ref().ok_or(BindError::Unbound(self.id.0))
    }

    /// Create a fresh graph named after the host node and bind it
    pub fn bind<E>(&mut self, engine: &mut E, host: &mut dyn HostNode) -> Result<()>
    where
        E: EngineHost<Graph = G>,
    {
        let graph = engine.create_graph(&host.node_name())?;
        tracing::info!(binding = %self.id, engine = engine.name(), "Created graph");
        self.attach(graph, host);
        Ok(())
    }

    /// Bind an existing graph, creating host attributes for its ports
    pub fn attach(&mut self, mut graph: G, host: &mut dyn HostNode) {
        self.release_graph();
        graph.set_notification_sink(Some(self.sink.clone()));
        graph.set_metadata(meta::BINDING_ID, &self.id.to_string());
        self.lock_mode = graph
            .metadata(meta::LOCK_TYPE)
            .and_then(|v| LockMode::parse(&v))
            .unwrap_or(self.services.config.default_lock_mode);
        self.graph = Some(graph);
        self.phase.set(BindingPhase::Bound);
        // ports present at attach time are handled below
        self.sink.drain();
        self.ensure_attributes(host);
        self.rebuild_index(host);
    }

    fn release_graph(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.set_notification_sink(None);
            graph.detach_external_handles();
        }
        self.sink.drain();
        self.index = PortIndex::new();
        self.index_stale = true;
        self.dirty.clear();
        self.handles_detached = false;
    }

    /// Unbind and drop the graph
    pub fn destroy(&mut self) {
        if self.graph.is_some() {
            tracing::debug!(binding = %self.id, "Destroying binding");
        }
        self.release_graph();
        self.services.queue.discard(self.id);
        self.last_imported = None;
        self.referenced = false;
        self.phase.set(BindingPhase::Unbound);
    }

    /// Create the host attribute for `port`; false when the port asks for none
    fn create_attribute(&self, host: &mut dyn HostNode, port: &PortInfo) -> Result<bool> {
        let graph = self.require_graph()?;
        match attribute_spec(port, graph)? {
            Some(spec) => {
                tracing::debug!(binding = %self.id, attribute = %spec.name, "Adding attribute");
                host.add_attribute(spec)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Create host attributes for every port that has none; returns their names
    pub fn ensure_attributes(&mut self, host: &mut dyn HostNode) -> Vec<String> {
        let Some(graph) = self.graph.as_ref() else {
            return Vec::new();
        };
        let mut created = Vec::new();
        for port in graph.ports() {
            let name = attribute_name_for_port(&port.name);
            if host.has_attribute(&name) {
                continue;
            }
            match self.create_attribute(host, &port) {
                Ok(true) => created.push(name),
                Ok(false) => {}
                Err(e) => tracing::warn!(binding = %self.id, port = %port.name, "Skipping port: {e}"),
            }
        }
        if !created.is_empty() {
            self.index_stale = true;
        }
        created
    }

    /// Rebuild the attribute/port index from both sides
    pub fn rebuild_index(&mut self, host: &dyn HostNode) {
        let Some(graph) = self.graph.as_ref() else {
            return;
        };
        self.index = PortIndex::build(
            &host.attributes(),
            &graph.ports(),
            &self.services.converters,
            graph,
        );
        for port in self.index.unmapped_ports() {
            tracing::debug!(binding = %self.id, port = %port.name, "Port has no host attribute");
        }
        self.index_stale = false;
        self.dirty.invalidate_affected();
    }

    fn refresh_index(&mut self, host: &dyn HostNode) {
        if self.index_stale {
            self.rebuild_index(host);
        }
    }

    /// Apply queued engine notifications to the host; returns how many were handled
    ///
    /// A notification the host rejects is logged and skipped; the rest of the
    /// queue is still applied.
    pub fn process_notifications(&mut self, host: &mut dyn HostNode) -> Result<usize> {
        let notifications = self.sink.drain();
        if notifications.is_empty() {
            return Ok(0);
        }
        self.require_graph()?;
        let mut structural = false;
        for notification in &notifications {
            match self.apply_notification(host, notification) {
                Ok(changed) => structural |= changed,
                Err(e) => {
                    tracing::warn!(binding = %self.id, ?notification, "Notification not applied: {e}");
                    // the host may have been partly changed
                    structural = true;
                }
            }
        }
        if structural {
            self.index_stale = true;
            self.dirty.invalidate_affected();
        }
        Ok(notifications.len())
    }

    fn apply_notification(&mut self, host: &mut dyn HostNode, notification: &Notification) -> Result<bool> {
        match notification {
            Notification::Dirty => {
                self.dirty.reset_outputs_memo();
                Ok(false)
            }
            Notification::ArgInserted { name, .. } => self.port_added_or_changed(host, name, false),
            Notification::ArgTypeChanged { name, .. } => self.port_added_or_changed(host, name, true),
            Notification::ArgRemoved { name } => {
                let attribute = attribute_name_for_port(name);
                if !host.has_attribute(&attribute) {
                    return Ok(false);
                }
                tracing::debug!(binding = %self.id, %attribute, "Removing attribute");
                host.remove_attribute(&attribute)?;
                self.dirty.forget(&attribute);
                Ok(true)
            }
            Notification::ArgRenamed { old, new } => self.rename_attribute(host, old, new),
            Notification::VarInserted { name } => {
                tracing::debug!(binding = %self.id, variable = %name, "Variable inserted");
                Ok(false)
            }
            Notification::VarRemoved { name } => {
                tracing::debug!(binding = %self.id, variable = %name, "Variable removed");
                Ok(false)
            }
        }
    }

    fn port_added_or_changed(
        &mut self,
        host: &mut dyn HostNode,
        name: &str,
        type_changed: bool,
    ) -> Result<bool> {
        // an insert followed by a removal leaves nothing to create
        let Some(port) = self.require_graph()?.port(name) else {
            return Ok(false);
        };
        let attribute = attribute_name_for_port(name);
        if host.has_attribute(&attribute) {
            if !type_changed {
                return Ok(false);
            }
            if !host.capabilities().recreate_attributes {
                tracing::debug!(binding = %self.id, %attribute, "Keeping attribute until reload");
                return Ok(false);
            }
            host.remove_attribute(&attribute)?;
            self.dirty.forget(&attribute);
        }
        match self.create_attribute(host, &port) {
            Ok(created) => Ok(created || type_changed),
            Err(e @ BindError::StructuralMismatch { .. }) => {
                tracing::warn!(binding = %self.id, "{e}");
                Ok(type_changed)
            }
            Err(e) => Err(e),
        }
    }

    fn rename_attribute(&mut self, host: &mut dyn HostNode, old: &str, new: &str) -> Result<bool> {
        let old_name = attribute_name_for_port(old);
        let new_name = attribute_name_for_port(new);
        let Some(info) = host.attribute(&old_name) else {
            return Ok(false);
        };
        host.rename_attribute(&old_name, &new_name)?;
        let mut pending = info.children;
        while let Some(child) = pending.pop() {
            if let Some(grandchildren) = host.attribute(&child).map(|c| c.children) {
                pending.extend(grandchildren);
            }
            if let Some(suffix) = child.strip_prefix(old_name.as_str()) {
                host.rename_attribute(&child, &format!("{new_name}{suffix}"))?;
            }
        }
        self.dirty.rename(&old_name, &new_name);
        Ok(true)
    }

    /// Mark the owner of an attribute path dirty
    pub fn mark_dirty(&mut self, host: &dyn HostNode, path: &str) -> Option<String> {
        self.refresh_index(host);
        self.dirty.mark_dirty(&self.index, path)
    }

    /// Mark `path` dirty and return the outputs it invalidates
    pub fn set_dependents_dirty(&mut self, host: &dyn HostNode, path: &str) -> Vec<String> {
        if self.mark_dirty(host, path).is_none() {
            return Vec::new();
        }
        self.dirty.collect_affected_outputs(&self.index)
    }

    /// Dirty inputs and ask the host to propagate through connections
    ///
    /// `None` invalidates every bound attribute.
    pub fn invalidate(&mut self, host: &dyn HostNode, attribute: Option<&str>) {
        self.refresh_index(host);
        let node = host.node_name();
        let propagate = self.services.config.dirty_propagation;
        let bindings: Vec<PortBinding> = self
            .index
            .bindings()
            .filter(|b| attribute.map_or(true, |a| a == b.attribute))
            .cloned()
            .collect();
        for binding in bindings {
            let direction = binding.port.direction;
            if direction.is_input() {
                self.dirty.mark_attribute_dirty(&binding.attribute);
                if propagate {
                    for plug in host.connections(&binding.attribute) {
                        self.request_dirty(plug);
                    }
                }
            }
            if direction.is_output() && propagate {
                self.request_dirty(format!("{node}.{}", binding.attribute));
                if let Some(info) = host.attribute(&binding.attribute) {
                    for child in info.children {
                        self.request_dirty(format!("{node}.{child}"));
                    }
                }
            }
        }
        self.dirty.reset_outputs_memo();
    }

    fn request_dirty(&self, attribute: String) {
        self.services.queue.push(HostRequest::MarkDirty {
            binding: self.id,
            attribute,
        });
    }

    /// Export the graph state and store it in `saveData`
    pub fn export_state(&mut self, host: &mut dyn HostNode) -> Result<String> {
        let blob = self.require_graph()?.export_state()?;
        host.set_value(SAVE_DATA, HostValue::String(blob.clone()))?;
        tracing::debug!(binding = %self.id, bytes = blob.len(), "Exported state");
        Ok(blob)
    }

    /// Replace the graph with one imported from `blob`
    ///
    /// Returns `Ok(false)` when `blob` equals the last imported state. A corrupt
    /// blob leaves the binding unbound.
    pub fn import_state<E>(&mut self, engine: &mut E, host: &mut dyn HostNode, blob: &str) -> Result<bool>
    where
        E: EngineHost<Graph = G>,
    {
        if self.is_bound() && self.last_imported.as_deref() == Some(blob) {
            tracing::debug!(binding = %self.id, "State unchanged, skipping import");
            return Ok(false);
        }
        let graph = match engine.import_graph(blob) {
            Ok(graph) => graph,
            Err(e) => {
                let err = BindError::PersistenceCorrupt(e.to_string());
                tracing::error!(binding = %self.id, "{err}");
                self.destroy();
                return Err(err);
            }
        };
        self.attach(graph, host);
        self.seed_inputs(host);
        let inputs: Vec<String> = self
            .index
            .bindings()
            .filter(|b| b.port.direction.is_input())
            .map(|b| b.attribute.clone())
            .collect();
        for attribute in &inputs {
            self.dirty.mark_attribute_dirty(attribute);
        }
        self.services.queue.push(HostRequest::Evaluate {
            binding: self.id,
            attribute: None,
        });
        self.last_imported = Some(blob.to_string());
        tracing::info!(binding = %self.id, ports = self.index.ports().len(), "Imported state");
        Ok(true)
    }

    /// Copy engine argument values into the bound input attributes
    fn seed_inputs(&self, host: &mut dyn HostNode) {
        let Some(graph) = self.graph.as_ref() else {
            return;
        };
        let capabilities = host.capabilities();
        for binding in self.index.bindings().filter(|b| b.port.direction.is_input()) {
            let Some(converters) = binding.converters else {
                continue;
            };
            let Some(tree) = AttributeTree::resolve(host, &binding.attribute) else {
                continue;
            };
            let value = match graph.arg_value(&binding.port.name) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(port = %binding.port.name, "No value to seed: {e}");
                    continue;
                }
            };
            let ctx = PortContext::new(
                &binding.port,
                &tree,
                graph,
                &self.services.converters,
                capabilities,
            );
            match (converters.to_host)(&ctx, &value) {
                Ok(host_value) => {
                    if let Err(e) = host.set_value(&binding.attribute, host_value) {
                        tracing::debug!(attribute = %binding.attribute, "Seed rejected: {e}");
                    }
                }
                Err(e) => tracing::debug!(attribute = %binding.attribute, "Seed skipped: {e}"),
            }
        }
    }

    /// Load the persisted state: the reference file when set, `saveData` otherwise
    ///
    /// Returns `Ok(false)` when there is nothing to load or nothing changed.
    pub fn restore_from_persistence<E>(&mut self, engine: &mut E, host: &mut dyn HostNode) -> Result<bool>
    where
        E: EngineHost<Graph = G>,
    {
        let reference = match host.value(REF_FILE_PATH) {
            Ok(HostValue::String(path)) => expand_env_vars(path.trim()),
            _ => String::new(),
        };
        if !reference.is_empty() {
            match std::fs::read_to_string(&reference) {
                Ok(blob) => {
                    let imported = self.import_state(engine, host, &blob)?;
                    self.referenced = true;
                    if let Some(graph) = self.graph.as_mut() {
                        graph.set_metadata(meta::EDITABLE, "false");
                    }
                    return Ok(imported);
                }
                Err(e) => tracing::error!(
                    binding = %self.id,
                    "Cannot read reference file {reference}: {e}; falling back to saved state"
                ),
            }
        }
        self.referenced = false;
        match host.value(SAVE_DATA) {
            Ok(HostValue::String(blob)) if !blob.is_empty() => self.import_state(engine, host, &blob),
            _ => Ok(false),
        }
    }

    /// Point the binding at a reference file and load it
    pub fn set_referenced_file_path<E>(
        &mut self,
        engine: &mut E,
        host: &mut dyn HostNode,
        path: &str,
    ) -> Result<bool>
    where
        E: EngineHost<Graph = G>,
    {
        host.set_value(REF_FILE_PATH, HostValue::String(path.to_string()))?;
        if path.is_empty() {
            self.referenced = false;
            if let Some(graph) = self.graph.as_mut() {
                graph.set_metadata(meta::EDITABLE, "true");
            }
            return Ok(false);
        }
        self.reload_from_reference(engine, host)
    }

    /// Re-import persisted state even if unchanged
    pub fn reload_from_reference<E>(&mut self, engine: &mut E, host: &mut dyn HostNode) -> Result<bool>
    where
        E: EngineHost<Graph = G>,
    {
        self.last_imported = None;
        self.restore_from_persistence(engine, host)
    }

    /// Detach engine-owned external handles (node left the scene) or reattach them
    pub fn manage_external_handles(&mut self, detach: bool) {
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        if detach && !self.handles_detached {
            graph.detach_external_handles();
            self.handles_detached = true;
        } else if !detach && self.handles_detached {
            graph.attach_external_handles();
            self.handles_detached = false;
        }
    }
}

/// Expand `${VAR}` references from the environment; unknown variables expand to nothing
pub fn expand_env_vars(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&std::env::var(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("PLUGBRIDGE_TEST_ROOT", "/assets");
        assert_eq!(expand_env_vars("${PLUGBRIDGE_TEST_ROOT}/rig.json"), "/assets/rig.json");
        assert_eq!(expand_env_vars("plain/path"), "plain/path");
        assert_eq!(expand_env_vars("${PLUGBRIDGE_TEST_UNSET_VAR}x"), "x");
        assert_eq!(expand_env_vars("broken${"), "broken${");
    }

    #[test]
    fn test_binding_id_display() {
        assert_eq!(BindingId::new(7).to_string(), "7");
        assert_eq!(BindingId::new(7).get(), 7);
    }
}

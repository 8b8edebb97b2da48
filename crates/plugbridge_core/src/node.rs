// SPDX-License-Identifier: MIT OR Apache-2.0
//! A host node composed with its binding.

use crate::binding::{Binding, BindingId, BindingServices};
use crate::commands::HostRequest;
use crate::engine::EngineHost;
use crate::error::Result;
use crate::execution::ExecuteReport;
use crate::host::{plug_attribute, HostNode};
use crate::port_index::PortBinding;
use crate::registry::ManagedNode;
use crate::value::HostValue;

/// Host node, engine factory and binding owned together
pub struct BoundNode<H: HostNode, E: EngineHost> {
    host: H,
    engine: E,
    binding: Binding<E::Graph>,
}

impl<H: HostNode, E: EngineHost> BoundNode<H, E> {
    /// Wrap a host node with an unbound binding
    pub fn new(id: BindingId, services: BindingServices, host: H, engine: E) -> Self {
        Self {
            host,
            engine,
            binding: Binding::new(id, services),
        }
    }

    /// Wrap a host node and bind a fresh graph
    pub fn create(id: BindingId, services: BindingServices, host: H, engine: E) -> Result<Self> {
        let mut node = Self::new(id, services, host, engine);
        node.binding.bind(&mut node.engine, &mut node.host)?;
        Ok(node)
    }

    /// Wrap a host node and load its persisted state, binding a fresh graph when there is none
    pub fn load(id: BindingId, services: BindingServices, host: H, engine: E) -> Result<Self> {
        let mut node = Self::new(id, services, host, engine);
        node.binding.restore_from_persistence(&mut node.engine, &mut node.host)?;
        if !node.binding.is_bound() {
            node.binding.bind(&mut node.engine, &mut node.host)?;
        }
        Ok(node)
    }

    /// Bind an existing graph
    pub fn attach(&mut self, graph: E::Graph) {
        self.binding.attach(graph, &mut self.host);
    }

    /// Host node
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Host node, mutably
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Engine factory
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Binding
    pub fn binding(&self) -> &Binding<E::Graph> {
        &self.binding
    }

    /// Binding, mutably
    pub fn binding_mut(&mut self) -> &mut Binding<E::Graph> {
        &mut self.binding
    }

    /// Write a host value and dirty its owner; returns the outputs it invalidates
    pub fn set_value(&mut self, path: &str, value: HostValue) -> Result<Vec<String>> {
        self.host.set_value(path, value)?;
        Ok(self.set_dependents_dirty(path))
    }

    /// Dirty the owner of `path`; returns the outputs it invalidates
    pub fn set_dependents_dirty(&mut self, path: &str) -> Vec<String> {
        self.binding.set_dependents_dirty(&self.host, path)
    }

    /// Run an evaluation pass
    pub fn compute(&mut self) -> Result<ExecuteReport> {
        self.binding.execute(&mut self.host)
    }

    /// Apply pending engine notifications
    pub fn process_notifications(&mut self) -> Result<usize> {
        self.binding.process_notifications(&mut self.host)
    }

    /// Dirty one attribute, or all of them, and queue propagation requests
    pub fn invalidate(&mut self, attribute: Option<&str>) {
        self.binding.invalidate(&self.host, attribute);
    }

    /// Persist graph state into `saveData`
    pub fn export_state(&mut self) -> Result<String> {
        self.binding.export_state(&mut self.host)
    }

    /// Replace the graph with the state in `blob`
    pub fn import_state(&mut self, blob: &str) -> Result<bool> {
        self.binding.import_state(&mut self.engine, &mut self.host, blob)
    }

    /// Force a reload of the persisted state
    pub fn reload(&mut self) -> Result<bool> {
        self.binding
            .reload_from_reference(&mut self.engine, &mut self.host)
    }

    /// Point at a reference file and load it
    pub fn set_referenced_file_path(&mut self, path: &str) -> Result<bool> {
        self.binding
            .set_referenced_file_path(&mut self.engine, &mut self.host, path)
    }

    /// Detach or reattach engine-owned external handles
    pub fn manage_external_handles(&mut self, detach: bool) {
        self.binding.manage_external_handles(detach);
    }

    /// Binding of a host attribute
    pub fn port_binding(&self, attribute: &str) -> Option<&PortBinding> {
        self.binding.port_binding(attribute)
    }

    /// Carry out a queued host request addressed to this node
    pub fn handle(&mut self, request: &HostRequest) -> Result<()> {
        match request {
            HostRequest::MarkDirty { attribute, .. } => {
                let node = self.host.node_name();
                if attribute.split_once('.').is_some_and(|(n, _)| n == node) {
                    self.set_dependents_dirty(plug_attribute(attribute));
                } else {
                    tracing::debug!(plug = %attribute, "Dirty request for another node");
                }
            }
            HostRequest::Evaluate { .. } => {
                self.compute()?;
            }
            HostRequest::Reload { .. } => {
                self.reload()?;
            }
        }
        Ok(())
    }

    /// Drop the bound graph
    pub fn destroy(&mut self) {
        self.binding.destroy();
    }
}

impl<H: HostNode, E: EngineHost> ManagedNode for BoundNode<H, E> {
    fn binding_id(&self) -> BindingId {
        self.binding.id()
    }

    fn node_name(&self) -> String {
        self.host.node_name()
    }

    fn store(&mut self) -> Result<()> {
        self.export_state().map(|_| ())
    }

    fn restore(&mut self) -> Result<bool> {
        self.binding
            .restore_from_persistence(&mut self.engine, &mut self.host)
    }

    fn reset(&mut self) {
        self.destroy();
    }
}

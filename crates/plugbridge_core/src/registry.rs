// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry of live bindings.
//!
//! Owned by whatever loads and unloads the plugin. Allocates stable ids and
//! hands every new binding the shared execution lock, configuration,
//! converter registry and command queue.

use crate::binding::{BindingId, BindingServices};
use crate::commands::CommandQueue;
use crate::config::Config;
use crate::convert::ConverterRegistry;
use crate::error::{BindError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A node the registry can store, restore and reset in bulk
pub trait ManagedNode {
    /// Id assigned at creation
    fn binding_id(&self) -> BindingId;

    /// Host node name
    fn node_name(&self) -> String;

    /// Persist graph state into the host
    fn store(&mut self) -> Result<()>;

    /// Reload graph state from the host; false when nothing was loaded
    fn restore(&mut self) -> Result<bool>;

    /// Drop the bound graph
    fn reset(&mut self);
}

/// Id-keyed map of live nodes
pub struct BindingRegistry<N: ManagedNode> {
    nodes: HashMap<BindingId, Arc<Mutex<N>>>,
    next_id: u32,
    services: BindingServices,
}

impl<N: ManagedNode> Default for BindingRegistry<N> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<N: ManagedNode> BindingRegistry<N> {
    /// Create a registry with the built-in converters
    pub fn new(config: Config) -> Self {
        Self::with_converters(config, ConverterRegistry::new())
    }

    /// Create a registry with a custom converter table
    pub fn with_converters(config: Config, converters: ConverterRegistry) -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
            services: BindingServices {
                converters: Arc::new(converters),
                config: Arc::new(config),
                ..BindingServices::default()
            },
        }
    }

    /// Services injected into new bindings
    pub fn services(&self) -> &BindingServices {
        &self.services
    }

    /// Shared request queue
    pub fn queue(&self) -> &CommandQueue {
        &self.services.queue
    }

    /// Settings
    pub fn config(&self) -> &Config {
        &self.services.config
    }

    /// Allocate an id and register the node built by `build`
    ///
    /// Ids are never reused, even when `build` fails.
    pub fn create<F>(&mut self, build: F) -> Result<Arc<Mutex<N>>>
    where
        F: FnOnce(BindingId, BindingServices) -> Result<N>,
    {
        let id = BindingId::new(self.next_id);
        self.next_id += 1;
        let node = Arc::new(Mutex::new(build(id, self.services.clone())?));
        self.nodes.insert(id, Arc::clone(&node));
        tracing::debug!(binding = %id, "Registered binding");
        Ok(node)
    }

    /// Node by id
    pub fn get(&self, id: BindingId) -> Option<Arc<Mutex<N>>> {
        self.nodes.get(&id).cloned()
    }

    /// Node by host node name; nodes locked by the caller are skipped
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Mutex<N>>> {
        self.nodes
            .values()
            .find(|node| node.try_lock().is_some_and(|n| n.node_name() == name))
            .cloned()
    }

    /// Run `f` on one node
    ///
    /// Fails with [`BindError::Unbound`] for unknown ids and
    /// [`BindError::Reentrant`] when the node is already in use.
    pub fn with_node<T>(&self, id: BindingId, f: impl FnOnce(&mut N) -> Result<T>) -> Result<T> {
        let node = self.nodes.get(&id).ok_or(BindError::Unbound(id.0))?;
        let mut guard = node.try_lock().ok_or(BindError::Reentrant(id.0))?;
        f(&mut guard)
    }

    /// Unregister a node, resetting it
    pub fn remove(&mut self, id: BindingId) -> Option<Arc<Mutex<N>>> {
        let node = self.nodes.remove(&id)?;
        node.lock().reset();
        self.services.queue.discard(id);
        tracing::debug!(binding = %id, "Unregistered binding");
        Some(node)
    }

    /// Registered ids in ascending order
    pub fn ids(&self) -> Vec<BindingId> {
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Store every node; returns how many succeeded
    pub fn store_all(&self) -> usize {
        self.for_each("store", |node| node.store().map(|()| true))
    }

    /// Restore every node; returns how many loaded state
    pub fn restore_all(&self) -> usize {
        self.for_each("restore", N::restore)
    }

    /// Reset every node
    pub fn reset_all(&self) -> usize {
        self.for_each("reset", |node| {
            node.reset();
            Ok(true)
        })
    }

    fn for_each(&self, action: &str, mut f: impl FnMut(&mut N) -> Result<bool>) -> usize {
        let mut count = 0;
        for id in self.ids() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            match f(&mut node.lock()) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(binding = %id, "Failed to {action}: {e}"),
            }
        }
        count
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is registered
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        id: BindingId,
        name: String,
        stored: usize,
        reset: bool,
    }

    impl ManagedNode for Dummy {
        fn binding_id(&self) -> BindingId {
            self.id
        }

        fn node_name(&self) -> String {
            self.name.clone()
        }

        fn store(&mut self) -> Result<()> {
            self.stored += 1;
            Ok(())
        }

        fn restore(&mut self) -> Result<bool> {
            Err(BindError::PersistenceCorrupt("no state".into()))
        }

        fn reset(&mut self) {
            self.reset = true;
        }
    }

    fn dummy(name: &str) -> impl FnOnce(BindingId, BindingServices) -> Result<Dummy> + '_ {
        move |id, _| {
            Ok(Dummy {
                id,
                name: name.to_string(),
                stored: 0,
                reset: false,
            })
        }
    }

    #[test]
    fn test_ids_start_at_one_and_are_not_reused() {
        let mut registry = BindingRegistry::<Dummy>::default();
        let a = registry.create(dummy("a")).unwrap();
        assert_eq!(a.lock().binding_id(), BindingId::new(1));
        assert!(registry
            .create(|_, _| Err(BindError::Unbound(0)))
            .is_err());
        let b = registry.create(dummy("b")).unwrap();
        assert_eq!(b.lock().binding_id(), BindingId::new(3));
        registry.remove(BindingId::new(1)).unwrap();
        assert!(a.lock().reset);
        assert_eq!(registry.ids(), vec![BindingId::new(3)]);
    }

    #[test]
    fn test_lookup_by_id_and_name() {
        let mut registry = BindingRegistry::<Dummy>::default();
        registry.create(dummy("alpha")).unwrap();
        registry.create(dummy("beta")).unwrap();
        let beta = registry.find_by_name("beta").unwrap();
        assert_eq!(beta.lock().binding_id(), BindingId::new(2));
        assert!(registry.get(BindingId::new(2)).is_some());
        assert!(registry.get(BindingId::new(9)).is_none());
        assert!(registry.find_by_name("gamma").is_none());
    }

    #[test]
    fn test_with_node_detects_reentry() {
        let mut registry = BindingRegistry::<Dummy>::default();
        registry.create(dummy("a")).unwrap();
        let id = BindingId::new(1);
        let result = registry.with_node(id, |_| registry.with_node(id, |_| Ok(())));
        assert!(matches!(result, Err(BindError::Reentrant(1))));
        assert!(matches!(
            registry.with_node(BindingId::new(5), |_| Ok(())),
            Err(BindError::Unbound(5))
        ));
    }

    #[test]
    fn test_bulk_operations() {
        let mut registry = BindingRegistry::<Dummy>::default();
        registry.create(dummy("a")).unwrap();
        registry.create(dummy("b")).unwrap();
        assert_eq!(registry.store_all(), 2);
        assert_eq!(registry.restore_all(), 0);
        assert_eq!(registry.reset_all(), 2);
        assert!(registry.get(BindingId::new(2)).unwrap().lock().reset);
    }
}

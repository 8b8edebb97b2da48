// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-attribute dirty bookkeeping.
//!
//! Each top-level attribute moves `Clean → Dirty → Transferred → Clean`.
//! Any dirty input invalidates every output; there is no finer dependency
//! tracking.

use crate::port_index::{is_reserved, PortIndex};
use indexmap::IndexMap;

/// Dirty state of one top-level attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyState {
    /// In sync with the engine
    #[default]
    Clean,
    /// Changed since the last transfer
    Dirty,
    /// Pushed to the engine, awaiting a successful execute
    Transferred,
}

/// Tracks which attributes changed since the last evaluation
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    states: IndexMap<String, DirtyState>,
    affected: Option<Vec<String>>,
    outputs_reported: bool,
}

impl DirtyTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the owner of `path` dirty; returns the owner
    ///
    /// Compound children and array elements redirect to their top-level
    /// attribute. Reserved and unknown attributes are ignored.
    pub fn mark_dirty(&mut self, index: &PortIndex, path: &str) -> Option<String> {
        let owner = index.owner_of(path)?.to_string();
        if is_reserved(&owner) {
            return None;
        }
        self.set(&owner, DirtyState::Dirty);
        Some(owner)
    }

    /// Mark a top-level attribute dirty by name, without index resolution
    pub fn mark_attribute_dirty(&mut self, attribute: &str) {
        if !is_reserved(attribute) {
            self.set(attribute, DirtyState::Dirty);
        }
    }

    fn set(&mut self, attribute: &str, state: DirtyState) {
        match self.states.get_mut(attribute) {
            Some(slot) => *slot = state,
            None => {
                self.states.insert(attribute.to_string(), state);
            }
        }
    }

    /// Output attributes invalidated by the current dirty set
    ///
    /// Empty once outputs were reported, until [`Self::reset_outputs_memo`].
    pub fn collect_affected_outputs(&mut self, index: &PortIndex) -> Vec<String> {
        if self.outputs_reported {
            return Vec::new();
        }
        let input_dirty = self.states.iter().any(|(name, state)| {
            *state == DirtyState::Dirty
                && index
                    .port_for_attribute(name)
                    .is_some_and(|port| port.direction.is_input())
        });
        if !input_dirty {
            return Vec::new();
        }
        let affected = self
            .affected
            .get_or_insert_with(|| {
                index
                    .bindings()
                    .filter(|b| b.port.direction.is_output())
                    .map(|b| b.attribute.clone())
                    .collect()
            })
            .clone();
        self.outputs_reported = true;
        affected
    }

    /// Drop the cached affected-output list (structure or connections changed)
    pub fn invalidate_affected(&mut self) {
        self.affected = None;
    }

    /// Allow outputs to be reported again
    pub fn reset_outputs_memo(&mut self) {
        self.outputs_reported = false;
    }

    /// Whether outputs were reported since the last reset
    pub fn outputs_reported(&self) -> bool {
        self.outputs_reported
    }

    /// Attributes currently `Dirty`, in first-dirtied order
    pub fn dirty_attributes(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, state)| **state == DirtyState::Dirty)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// `Dirty → Transferred`; false if the attribute was not dirty
    pub fn begin_transfer(&mut self, attribute: &str) -> bool {
        match self.states.get_mut(attribute) {
            Some(state) if *state == DirtyState::Dirty => {
                *state = DirtyState::Transferred;
                true
            }
            _ => false,
        }
    }

    /// Every `Transferred → Clean`; returns how many were cleaned
    pub fn complete(&mut self) -> usize {
        self.move_all(DirtyState::Transferred, DirtyState::Clean)
    }

    /// Every `Transferred → Dirty`, so a failed pass retransfers
    pub fn abort(&mut self) -> usize {
        self.move_all(DirtyState::Transferred, DirtyState::Dirty)
    }

    fn move_all(&mut self, from: DirtyState, to: DirtyState) -> usize {
        let mut moved = 0;
        for state in self.states.values_mut().filter(|s| **s == from) {
            *state = to;
            moved += 1;
        }
        moved
    }

    /// State of an attribute; unknown attributes are clean
    pub fn state(&self, attribute: &str) -> DirtyState {
        self.states.get(attribute).copied().unwrap_or_default()
    }

    /// Whether an attribute is clean
    pub fn is_clean(&self, attribute: &str) -> bool {
        self.state(attribute) == DirtyState::Clean
    }

    /// Stop tracking a removed attribute
    pub fn forget(&mut self, attribute: &str) {
        self.states.shift_remove(attribute);
        self.invalidate_affected();
    }

    /// Move state to a renamed attribute
    pub fn rename(&mut self, old: &str, new: &str) {
        if let Some(state) = self.states.shift_remove(old) {
            self.states.insert(new.to_string(), state);
        }
        self.invalidate_affected();
    }

    /// Forget everything
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Number of tracked attributes
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

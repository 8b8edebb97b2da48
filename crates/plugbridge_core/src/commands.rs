// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deferred host work requested by the binding layer.
//!
//! The core never runs host commands itself. It queues typed requests that the
//! host integration drains on its own schedule (idle callback, frame end).

use crate::binding::BindingId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Work the host should perform later
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    /// Propagate dirtiness from a plug (`node.attr`)
    MarkDirty {
        /// Requesting binding
        binding: BindingId,
        /// Plug to dirty
        attribute: String,
    },
    /// Pull a value so the node evaluates
    Evaluate {
        /// Requesting binding
        binding: BindingId,
        /// Attribute to pull; `None` means any output
        attribute: Option<String>,
    },
    /// Reload the binding from its persisted state
    Reload {
        /// Binding to reload
        binding: BindingId,
    },
}

impl HostRequest {
    /// Binding the request belongs to
    pub fn binding(&self) -> BindingId {
        match self {
            Self::MarkDirty { binding, .. }
            | Self::Evaluate { binding, .. }
            | Self::Reload { binding } => *binding,
        }
    }
}

/// Shared FIFO of host requests
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    requests: Arc<Mutex<VecDeque<HostRequest>>>,
}

impl CommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a request; an identical pending request is not duplicated
    pub fn push(&self, request: HostRequest) {
        let mut requests = self.requests.lock();
        if !requests.contains(&request) {
            requests.push_back(request);
        }
    }

    /// Take every pending request in order
    pub fn drain(&self) -> Vec<HostRequest> {
        self.requests.lock().drain(..).collect()
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }

    /// Drop pending requests of one binding
    pub fn discard(&self, binding: BindingId) {
        self.requests.lock().retain(|r| r.binding() != binding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_dedupes_and_drains_in_order() {
        let queue = CommandQueue::new();
        let id = BindingId::new(1);
        queue.push(HostRequest::Reload { binding: id });
        queue.push(HostRequest::MarkDirty {
            binding: id,
            attribute: "n.x".into(),
        });
        queue.push(HostRequest::Reload { binding: id });
        assert_eq!(queue.len(), 2);
        let drained = queue.drain();
        assert_eq!(drained[0], HostRequest::Reload { binding: id });
        assert!(queue.is_empty());
    }

    #[test]
    fn test_discard_by_binding() {
        let queue = CommandQueue::new();
        queue.push(HostRequest::Reload { binding: BindingId::new(1) });
        queue.push(HostRequest::Reload { binding: BindingId::new(2) });
        queue.discard(BindingId::new(1));
        assert_eq!(queue.drain(), vec![HostRequest::Reload { binding: BindingId::new(2) }]);
    }
}

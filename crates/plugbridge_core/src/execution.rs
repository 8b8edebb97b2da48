// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation passes.
//!
//! One pass pushes dirty inputs into the engine, runs the graph under the
//! binding's lock mode and writes every output back. Outputs are converted into
//! a staging list first and written only when all of them converted.

use crate::binding::{Binding, ENABLE_EVAL_CONTEXT, EVAL_ID};
use crate::convert::{ConverterRegistry, PortContext};
use crate::engine::{EngineGraph, EvalContext, LockMode};
use crate::error::{BindError, HostError, Result};
use crate::host::{AttributeTree, HostCapabilities, HostNode};
use crate::port_index::PortBinding;
use crate::value::HostValue;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle phase of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingPhase {
    /// No graph
    Unbound,
    /// Graph bound and idle
    Bound,
    /// Inside an evaluation pass
    Evaluating,
}

impl BindingPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Bound,
            2 => Self::Evaluating,
            _ => Self::Unbound,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unbound => 0,
            Self::Bound => 1,
            Self::Evaluating => 2,
        }
    }
}

/// Shared atomic phase of one binding
#[derive(Debug, Clone, Default)]
pub struct PhaseCell(Arc<AtomicU8>);

impl PhaseCell {
    /// Create an unbound cell
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase
    pub fn get(&self) -> BindingPhase {
        BindingPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, phase: BindingPhase) {
        self.0.store(phase.as_u8(), Ordering::Release);
    }

    /// Enter `Evaluating` from `Bound`; `None` if not bound or already evaluating
    pub fn begin_evaluation(&self) -> Option<PhaseToken> {
        self.0
            .compare_exchange(
                BindingPhase::Bound.as_u8(),
                BindingPhase::Evaluating.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| PhaseToken { cell: self.clone() })
    }
}

/// Held for the duration of an evaluation; dropping it returns the cell to `Bound`
#[derive(Debug)]
pub struct PhaseToken {
    cell: PhaseCell,
}

impl Drop for PhaseToken {
    fn drop(&mut self) {
        // a destroy during evaluation already moved the cell to Unbound
        let _ = self.cell.0.compare_exchange(
            BindingPhase::Evaluating.as_u8(),
            BindingPhase::Bound.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Process-wide engine execution lock, owned by the registry
#[derive(Debug, Clone, Default)]
pub struct ExecutionLock(Arc<RwLock<()>>);

impl ExecutionLock {
    /// Create a lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` holding the read side (`Shared`) or the write side (`Exclusive`)
    pub fn run<T>(&self, mode: LockMode, f: impl FnOnce() -> T) -> T {
        match mode {
            LockMode::Shared => {
                let _guard = self.0.read_recursive();
                f()
            }
            LockMode::Exclusive => {
                let _guard = self.0.write();
                f()
            }
        }
    }

    /// Whether some binding holds the write side
    pub fn is_exclusive(&self) -> bool {
        self.0.is_locked_exclusive()
    }
}

/// Outcome of a successful evaluation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteReport {
    /// Inputs pushed to the engine
    pub transferred: Vec<String>,
    /// Outputs written back to the host
    pub outputs: Vec<String>,
    /// Dirty inputs left dirty because they could not be converted
    pub skipped: Vec<String>,
    /// Staged outputs the host refused to store; they keep their previous value
    pub unwritten: Vec<String>,
    /// Host evaluation counter after the pass
    pub eval_id: i64,
}

impl<G: EngineGraph> Binding<G> {
    /// Run one evaluation pass
    pub fn execute(&mut self, host: &mut dyn HostNode) -> Result<ExecuteReport> {
        if self.graph.is_none() {
            return Err(BindError::Unbound(self.id.0));
        }
        let Some(_token) = self.phase.begin_evaluation() else {
            return Err(BindError::Reentrant(self.id.0));
        };
        let span = tracing::debug_span!("execute", binding = %self.id);
        let _enter = span.enter();

        self.manage_external_handles(false);
        self.process_notifications(host)?;
        if self.index_stale {
            self.ensure_attributes(host);
            self.rebuild_index(host);
        }

        let mut report = ExecuteReport::default();
        self.transfer_inputs(host, &mut report);
        self.hand_eval_context(host);

        let lock = self.services.lock.clone();
        let mode = self.lock_mode;
        let graph = self.graph.as_mut().ok_or(BindError::Unbound(self.id.0))?;
        if let Err(e) = lock.run(mode, || graph.execute()) {
            let restored = self.dirty.abort();
            let err = BindError::EngineExecutionFailure(e.to_string());
            tracing::error!(restored, "{err}");
            return Err(err);
        }
        self.dirty.complete();
        self.dirty.reset_outputs_memo();

        let staged = self.stage_outputs(host).inspect_err(|e| {
            tracing::error!("Outputs left unchanged: {e}");
        })?;
        if let Some((missing, _)) = staged.iter().find(|(a, _)| !host.has_attribute(a)) {
            let err = BindError::Host(HostError::AttributeNotFound(missing.clone()));
            tracing::error!("Outputs left unchanged: {err}");
            return Err(err);
        }
        for (attribute, value) in staged {
            match host.set_value(&attribute, value) {
                Ok(()) => {
                    host.set_clean(&attribute);
                    report.outputs.push(attribute);
                }
                Err(e) => {
                    tracing::warn!(%attribute, "Host rejected output: {e}");
                    report.unwritten.push(attribute);
                }
            }
        }

        report.eval_id = bump_eval_id(host);
        tracing::debug!(
            transferred = report.transferred.len(),
            outputs = report.outputs.len(),
            eval_id = report.eval_id,
            "Evaluated"
        );
        Ok(report)
    }

    fn transfer_inputs(&mut self, host: &dyn HostNode, report: &mut ExecuteReport) {
        let capabilities = host.capabilities();
        for attribute in self.dirty.dirty_attributes() {
            let Some(binding) = self.index.binding(&attribute) else {
                // nothing to push for unmapped attributes
                self.dirty.begin_transfer(&attribute);
                continue;
            };
            if !binding.port.direction.is_input() {
                self.dirty.begin_transfer(&attribute);
                continue;
            }
            let Some(graph) = self.graph.as_mut() else {
                return;
            };
            match transfer_input(graph, &self.services.converters, host, binding, capabilities) {
                Ok(()) => {
                    tracing::debug!(%attribute, port = %binding.port.name, "Transferred input");
                    self.dirty.begin_transfer(&attribute);
                    report.transferred.push(attribute);
                }
                Err(e) => {
                    tracing::warn!(%attribute, "Input not transferred: {e}");
                    report.skipped.push(attribute);
                }
            }
        }
    }

    fn hand_eval_context(&mut self, host: &dyn HostNode) {
        if !matches!(host.value(ENABLE_EVAL_CONTEXT), Ok(HostValue::Bool(true))) {
            return;
        }
        let context = EvalContext {
            host: self.services.config.eval_context_host.clone(),
            graph: host.node_name(),
            time: host.current_time(),
            current_file_path: host.scene_path(),
        };
        if let Some(graph) = self.graph.as_mut() {
            graph.set_eval_context(context);
        }
    }

    fn stage_outputs(&self, host: &dyn HostNode) -> Result<Vec<(String, HostValue)>> {
        let graph = self.require_graph()?;
        let capabilities = host.capabilities();
        let mut staged = Vec::new();
        for binding in self.index.bindings().filter(|b| b.port.direction.is_output()) {
            let Some(converters) = binding.converters else {
                tracing::debug!(attribute = %binding.attribute, "No converter, output not written");
                continue;
            };
            let tree = AttributeTree::resolve(host, &binding.attribute)
                .ok_or_else(|| HostError::AttributeNotFound(binding.attribute.clone()))?;
            let value = graph.arg_value(&binding.port.name)?;
            let ctx = PortContext::new(
                &binding.port,
                &tree,
                graph,
                &self.services.converters,
                capabilities,
            );
            let host_value = (converters.to_host)(&ctx, &value).map_err(|source| {
                BindError::Conversion {
                    port: binding.port.name.clone(),
                    source,
                }
            })?;
            staged.push((binding.attribute.clone(), host_value));
        }
        Ok(staged)
    }
}

fn transfer_input<G: EngineGraph>(
    graph: &mut G,
    converters: &ConverterRegistry,
    host: &dyn HostNode,
    binding: &PortBinding,
    capabilities: HostCapabilities,
) -> Result<()> {
    let port = &binding.port;
    let pair = binding
        .converters
        .ok_or_else(|| BindError::TypeConversionUnsupported {
            port: port.name.clone(),
            resolved_type: port.resolved_type.clone(),
        })?;
    let tree = AttributeTree::resolve(host, &binding.attribute)
        .ok_or_else(|| HostError::AttributeNotFound(binding.attribute.clone()))?;
    let value = host.value(&binding.attribute)?;
    let current = graph.arg_value(&port.name)?;
    let converted = {
        let ctx = PortContext::new(port, &tree, &*graph, converters, capabilities);
        (pair.to_engine)(&ctx, &value, &current).map_err(|source| BindError::Conversion {
            port: port.name.clone(),
            source,
        })?
    };
    graph.set_arg_value(&port.name, converted)?;
    Ok(())
}

fn bump_eval_id(host: &mut dyn HostNode) -> i64 {
    let next = match host.value(EVAL_ID) {
        Ok(HostValue::Int(v)) => i64::from(v).wrapping_add(1),
        Ok(HostValue::Int64(v)) => v.wrapping_add(1),
        _ => 1,
    };
    let value = match host.value(EVAL_ID) {
        Ok(HostValue::Int64(_)) => HostValue::Int64(next),
        _ => HostValue::Int(next as i32),
    };
    if let Err(e) = host.set_value(EVAL_ID, value) {
        tracing::debug!("evalID not updated: {e}");
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_token_restores_bound() {
        let cell = PhaseCell::new();
        assert!(cell.begin_evaluation().is_none());
        cell.set(BindingPhase::Bound);
        {
            let _token = cell.begin_evaluation().unwrap();
            assert_eq!(cell.get(), BindingPhase::Evaluating);
            assert!(cell.begin_evaluation().is_none());
        }
        assert_eq!(cell.get(), BindingPhase::Bound);
    }

    #[test]
    fn test_token_keeps_unbound_after_destroy() {
        let cell = PhaseCell::new();
        cell.set(BindingPhase::Bound);
        let token = cell.begin_evaluation().unwrap();
        cell.set(BindingPhase::Unbound);
        drop(token);
        assert_eq!(cell.get(), BindingPhase::Unbound);
    }

    #[test]
    fn test_lock_modes() {
        let lock = ExecutionLock::new();
        let nested = lock.run(LockMode::Shared, || lock.run(LockMode::Shared, || 3));
        assert_eq!(nested, 3);
        assert!(lock.run(LockMode::Exclusive, || lock.is_exclusive()));
        assert!(!lock.is_exclusive());
    }
}

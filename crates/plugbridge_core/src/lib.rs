// SPDX-License-Identifier: MIT OR Apache-2.0
//! Attribute/port binding between a host scene graph and a computation-graph engine.
//!
//! A host node exposes typed attributes; an engine graph exposes typed ports.
//! This crate keeps the two in step:
//! - Port index mapping host attributes to engine ports
//! - Dirty tracking so only changed inputs are transferred
//! - Converter registry marshaling values in both directions
//! - Binding lifecycle, persistence and structural notifications
//! - Execution passes with staged, all-or-nothing output writes
//!
//! ## Architecture
//!
//! The host and the engine are collaborators behind the [`HostNode`] and
//! [`EngineGraph`] / [`EngineHost`] traits. A [`BindingRegistry`] owns the
//! shared services (execution lock, configuration, converters, request queue)
//! and hands them to every [`BoundNode`] it creates.

pub mod attr_factory;
pub mod binding;
pub mod commands;
pub mod config;
pub mod convert;
pub mod dirty;
pub mod engine;
pub mod error;
pub mod execution;
pub mod host;
pub mod memory;
pub mod node;
pub mod numeric;
pub mod port_index;
pub mod registry;
pub mod types;
pub mod value;

pub use binding::{Binding, BindingId, BindingServices};
pub use commands::{CommandQueue, HostRequest};
pub use config::Config;
pub use convert::{ConverterPair, ConverterRegistry, Direction, PortContext};
pub use dirty::{DirtyState, DirtyTracker};
pub use engine::{EngineGraph, EngineHost, LockMode, Notification, PortDirection, PortInfo};
pub use error::{BindError, ConversionError, EngineError, HostError, Result};
pub use execution::{BindingPhase, ExecuteReport, ExecutionLock};
pub use host::{AttributeInfo, AttributeSpec, AttributeType, HostCapabilities, HostNode};
pub use node::BoundNode;
pub use port_index::{PortBinding, PortIndex};
pub use registry::{BindingRegistry, ManagedNode};
pub use types::{ResolvedType, StructLayout};
pub use value::{GraphValue, HostValue};

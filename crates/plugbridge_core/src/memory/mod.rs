// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory host and engine implementations.
//!
//! Used by the `plugbridge` binary and the test suites to drive bindings
//! without a real scene graph or graph engine.

pub mod engine;
pub mod host;

pub use engine::{GraphDefinition, MemoryEngineHost, MemoryGraph, Op, PortDef};
pub use host::MemoryHost;

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value models for both sides of the binding.

pub mod geometry;
pub mod graph;
pub mod host;

pub use geometry::{CurveData, Lines, MeshData, PolygonMesh};
pub use graph::{GraphArray, GraphValue, StructValue};
pub use host::HostValue;

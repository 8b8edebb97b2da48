// SPDX-License-Identifier: MIT OR Apache-2.0
//! Geometry payloads on both sides of the binding.
//!
//! Engine meshes store every per-sample channel (normals, UVs, colors) per
//! polygon point. Host meshes keep indexed pools the way scene-graph hosts do.

use serde::{Deserialize, Serialize};

/// Engine-side polygon mesh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonMesh {
    /// Point positions
    pub points: Vec<[f32; 3]>,
    /// Vertex count per polygon
    pub counts: Vec<u32>,
    /// Point index per polygon point
    pub indices: Vec<u32>,
    /// Normal per polygon point (empty when absent)
    pub normals: Vec<[f32; 3]>,
    /// UV per polygon point (empty when absent)
    pub uvs: Vec<[f32; 2]>,
    /// RGBA color per polygon point (empty when absent)
    pub colors: Vec<[f32; 4]>,
}

impl PolygonMesh {
    /// Number of points
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of polygons
    pub fn polygon_count(&self) -> usize {
        self.counts.len()
    }

    /// Number of polygon points (face vertices)
    pub fn polygon_points_count(&self) -> usize {
        self.indices.len()
    }

    /// Whether the mesh has no polygons
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty() || self.points.is_empty()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Check topology and channel sizes
    pub fn validate(&self) -> Result<(), String> {
        let samples: usize = self.counts.iter().map(|c| *c as usize).sum();
        if samples != self.indices.len() {
            return Err(format!(
                "polygon counts cover {samples} samples but {} indices are present",
                self.indices.len()
            ));
        }
        if let Some(bad) = self
            .indices
            .iter()
            .find(|i| **i as usize >= self.points.len())
        {
            return Err(format!("point {bad} out of range"));
        }
        for (name, len) in [
            ("normals", self.normals.len()),
            ("uvs", self.uvs.len()),
            ("colors", self.colors.len()),
        ] {
            if len != 0 && len != samples {
                return Err(format!("{name} has {len} entries, expected {samples}"));
            }
        }
        Ok(())
    }
}

/// Engine-side line segments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lines {
    /// Point positions
    pub points: Vec<[f32; 3]>,
    /// Point index pairs, two per segment
    pub indices: Vec<u32>,
}

impl Lines {
    /// Number of segments
    pub fn segment_count(&self) -> usize {
        self.indices.len() / 2
    }

    /// Check index pairing and ranges
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 2 != 0 {
            return Err("odd number of segment indices".to_string());
        }
        match self.indices.iter().find(|i| **i as usize >= self.points.len()) {
            Some(bad) => Err(format!("point {bad} out of range")),
            None => Ok(()),
        }
    }
}

/// Host-side mesh data with indexed channels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    /// Homogeneous point positions
    pub points: Vec<[f64; 4]>,
    /// Vertex count per polygon
    pub counts: Vec<i32>,
    /// Point index per face vertex
    pub indices: Vec<i32>,
    /// Normal pool
    pub normals: Vec<[f32; 3]>,
    /// Normal pool index per face vertex
    pub normal_ids: Vec<i32>,
    /// U coordinate pool
    pub u: Vec<f32>,
    /// V coordinate pool
    pub v: Vec<f32>,
    /// UV pool index per face vertex
    pub uv_ids: Vec<i32>,
    /// Color per face vertex from the first color set
    pub colors: Vec<[f32; 4]>,
}

impl MeshData {
    /// Number of polygons
    pub fn polygon_count(&self) -> usize {
        self.counts.len()
    }

    /// Number of face vertices
    pub fn face_vertex_count(&self) -> usize {
        self.indices.len()
    }

    /// A single triangle collapsed at the origin
    ///
    /// Hosts that cannot hold an empty mesh get this instead.
    pub fn degenerate() -> Self {
        Self {
            points: vec![[0.0, 0.0, 0.0, 1.0]; 3],
            counts: vec![3],
            indices: vec![0, 1, 2],
            ..Self::default()
        }
    }
}

/// Host-side curve data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveData {
    /// Homogeneous point positions
    pub points: Vec<[f64; 4]>,
    /// Segments as point index pairs
    pub segments: Vec<[i32; 2]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> PolygonMesh {
        PolygonMesh {
            points: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            counts: vec![4],
            indices: vec![0, 1, 2, 3],
            ..PolygonMesh::default()
        }
    }

    #[test]
    fn test_mesh_validation() {
        let mut mesh = quad();
        assert!(mesh.validate().is_ok());

        mesh.indices[3] = 9;
        assert!(mesh.validate().unwrap_err().contains("out of range"));

        let mut mesh = quad();
        mesh.normals = vec![[0.0, 0.0, 1.0]; 3];
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_degenerate_mesh_is_valid_triangle() {
        let mesh = MeshData::degenerate();
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.face_vertex_count(), 3);
        assert_eq!(mesh.points.len(), 3);
    }

    #[test]
    fn test_lines_validation() {
        let lines = Lines {
            points: vec![[0.0; 3], [1.0; 3]],
            indices: vec![0, 1],
        };
        assert_eq!(lines.segment_count(), 1);
        assert!(lines.validate().is_ok());
        let broken = Lines {
            points: lines.points.clone(),
            indices: vec![0, 1, 1],
        };
        assert!(broken.validate().is_err());
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Polygon mesh and lines converters.
//!
//! Meshes transfer channel by channel. Engine topology is only replaced when
//! the polygon or face-vertex counts change; otherwise the engine keeps the
//! topology it already has.

use super::{ConverterPair, PortContext};
use crate::error::ConversionError;
use crate::value::{CurveData, GraphArray, GraphValue, HostValue, Lines, MeshData, PolygonMesh};

/// `PolygonMesh`
pub const MESH: ConverterPair = ConverterPair {
    to_engine: mesh_to_engine,
    to_host: mesh_to_host,
};

/// `Lines`
pub const LINES: ConverterPair = ConverterPair {
    to_engine: lines_to_engine,
    to_host: lines_to_host,
};

fn to_indices(values: &[i32], what: &str) -> Result<Vec<u32>, ConversionError> {
    values
        .iter()
        .map(|v| {
            u32::try_from(*v).map_err(|_| ConversionError::Geometry(format!("negative {what} {v}")))
        })
        .collect()
}

fn from_indices(values: &[u32], what: &str) -> Result<Vec<i32>, ConversionError> {
    values
        .iter()
        .map(|v| {
            i32::try_from(*v).map_err(|_| ConversionError::Geometry(format!("{what} {v} too large")))
        })
        .collect()
}

/// Expand an indexed pool to one entry per face vertex
fn expand<T: Copy>(
    pool: &[T],
    ids: &[i32],
    samples: usize,
    what: &str,
) -> Result<Vec<T>, ConversionError> {
    if pool.is_empty() {
        return Ok(Vec::new());
    }
    if ids.is_empty() {
        // unindexed pools are only usable when already per face vertex
        return Ok(if pool.len() == samples {
            pool.to_vec()
        } else {
            Vec::new()
        });
    }
    if ids.len() != samples {
        return Err(ConversionError::Geometry(format!(
            "{what} has {} ids, expected {samples}",
            ids.len()
        )));
    }
    ids.iter()
        .map(|id| {
            usize::try_from(*id)
                .ok()
                .and_then(|i| pool.get(i).copied())
                .ok_or_else(|| ConversionError::Geometry(format!("{what} id {id} out of range")))
        })
        .collect()
}

/// Host mesh into an engine mesh, reusing `current` topology when counts match
pub fn mesh_from_host(
    data: &MeshData,
    current: Option<&PolygonMesh>,
) -> Result<PolygonMesh, ConversionError> {
    let mut mesh = current.cloned().unwrap_or_default();
    mesh.points = data
        .points
        .iter()
        .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
        .collect();

    let same_topology = current.is_some()
        && mesh.polygon_count() == data.polygon_count()
        && mesh.polygon_points_count() == data.face_vertex_count();
    if !same_topology {
        mesh.counts = to_indices(&data.counts, "polygon size")?;
        mesh.indices = to_indices(&data.indices, "point index")?;
    }

    let samples = data.face_vertex_count();
    mesh.normals = expand(&data.normals, &data.normal_ids, samples, "normals")?;
    let uv_pool: Vec<[f32; 2]> = data.u.iter().zip(&data.v).map(|(u, v)| [*u, *v]).collect();
    mesh.uvs = expand(&uv_pool, &data.uv_ids, samples, "uvs")?;
    mesh.colors = if data.colors.len() == samples {
        data.colors.clone()
    } else {
        Vec::new()
    };
    mesh.validate().map_err(ConversionError::Geometry)?;
    Ok(mesh)
}

/// Engine mesh into host mesh data
///
/// Empty meshes become [`MeshData::degenerate`] when the host cannot hold them.
pub fn mesh_to_host_data(mesh: &PolygonMesh, empty_mesh: bool) -> Result<MeshData, ConversionError> {
    if mesh.is_empty() {
        return Ok(if empty_mesh {
            MeshData::default()
        } else {
            MeshData::degenerate()
        });
    }
    mesh.validate().map_err(ConversionError::Geometry)?;
    if let Some(count) = mesh.counts.iter().find(|c| **c < 3) {
        return Err(ConversionError::Geometry(format!(
            "polygon with {count} vertices"
        )));
    }
    let sequence = |len: usize| (0..len as i32).collect::<Vec<_>>();
    Ok(MeshData {
        points: mesh
            .points
            .iter()
            .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2]), 1.0])
            .collect(),
        counts: from_indices(&mesh.counts, "polygon size")?,
        indices: from_indices(&mesh.indices, "point index")?,
        normals: mesh.normals.clone(),
        normal_ids: sequence(mesh.normals.len()),
        u: mesh.uvs.iter().map(|uv| uv[0]).collect(),
        v: mesh.uvs.iter().map(|uv| uv[1]).collect(),
        uv_ids: sequence(mesh.uvs.len()),
        colors: mesh.colors.clone(),
    })
}

fn single_mesh_to_engine(
    ctx: &PortContext<'_>,
    value: &HostValue,
    current: &GraphValue,
) -> Result<GraphValue, ConversionError> {
    let current = match current {
        GraphValue::PolygonMesh(mesh) => Some(mesh),
        _ => None,
    };
    match value {
        HostValue::Mesh(data) => mesh_from_host(data, current).map(GraphValue::PolygonMesh),
        HostValue::Empty => Ok(GraphValue::PolygonMesh(PolygonMesh::default())),
        other => Err(ctx.host_shape(other)),
    }
}

fn single_mesh_to_host(ctx: &PortContext<'_>, value: &GraphValue) -> Result<HostValue, ConversionError> {
    let empty = PolygonMesh::default();
    let mesh = match value {
        GraphValue::PolygonMesh(mesh) => mesh,
        GraphValue::Null => &empty,
        other => return Err(ctx.engine_shape(other)),
    };
    mesh_to_host_data(mesh, ctx.capabilities.empty_mesh).map(HostValue::Mesh)
}

fn mesh_to_engine(
    ctx: &PortContext<'_>,
    value: &HostValue,
    current: &GraphValue,
) -> Result<GraphValue, ConversionError> {
    if !ctx.is_array() {
        return single_mesh_to_engine(ctx, value, current);
    }
    boxed_to_engine(ctx, value, current, "PolygonMesh", single_mesh_to_engine)
}

fn mesh_to_host(ctx: &PortContext<'_>, value: &GraphValue) -> Result<HostValue, ConversionError> {
    if !ctx.is_array() {
        return single_mesh_to_host(ctx, value);
    }
    boxed_to_host(ctx, value, single_mesh_to_host)
}

fn single_lines_to_engine(
    ctx: &PortContext<'_>,
    value: &HostValue,
    _current: &GraphValue,
) -> Result<GraphValue, ConversionError> {
    let data = match value {
        HostValue::Curve(data) => data,
        HostValue::Empty => return Ok(GraphValue::Lines(Lines::default())),
        other => return Err(ctx.host_shape(other)),
    };
    let flat: Vec<i32> = data.segments.iter().flat_map(|s| s.iter().copied()).collect();
    let lines = Lines {
        points: data
            .points
            .iter()
            .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
            .collect(),
        indices: to_indices(&flat, "segment index")?,
    };
    lines.validate().map_err(ConversionError::Geometry)?;
    Ok(GraphValue::Lines(lines))
}

fn single_lines_to_host(ctx: &PortContext<'_>, value: &GraphValue) -> Result<HostValue, ConversionError> {
    let empty = Lines::default();
    let lines = match value {
        GraphValue::Lines(lines) => lines,
        GraphValue::Null => &empty,
        other => return Err(ctx.engine_shape(other)),
    };
    lines.validate().map_err(ConversionError::Geometry)?;
    let flat = from_indices(&lines.indices, "segment index")?;
    Ok(HostValue::Curve(CurveData {
        points: lines
            .points
            .iter()
            .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2]), 1.0])
            .collect(),
        segments: flat.chunks_exact(2).map(|s| [s[0], s[1]]).collect(),
    }))
}

fn lines_to_engine(
    ctx: &PortContext<'_>,
    value: &HostValue,
    current: &GraphValue,
) -> Result<GraphValue, ConversionError> {
    if !ctx.is_array() {
        return single_lines_to_engine(ctx, value, current);
    }
    boxed_to_engine(ctx, value, current, "Lines", single_lines_to_engine)
}

fn lines_to_host(ctx: &PortContext<'_>, value: &GraphValue) -> Result<HostValue, ConversionError> {
    if !ctx.is_array() {
        return single_lines_to_host(ctx, value);
    }
    boxed_to_host(ctx, value, single_lines_to_host)
}

fn boxed_to_engine(
    ctx: &PortContext<'_>,
    value: &HostValue,
    current: &GraphValue,
    element_type: &str,
    convert: super::ToEngineFn,
) -> Result<GraphValue, ConversionError> {
    let items = match value {
        HostValue::Multi(items) => items.as_slice(),
        HostValue::Empty => &[],
        other => return Err(ctx.host_shape(other)),
    };
    let element = ctx.attribute.element();
    let ectx = ctx.with_attribute(&element, ctx.element_type());
    let items = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let existing = match current {
                GraphValue::Array(array) => array.get(i).unwrap_or_default(),
                _ => GraphValue::Null,
            };
            convert(&ectx, item, &existing)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(GraphValue::Array(GraphArray::Boxed {
        element_type: element_type.to_string(),
        items,
    }))
}

fn boxed_to_host(
    ctx: &PortContext<'_>,
    value: &GraphValue,
    convert: super::ToHostFn,
) -> Result<HostValue, ConversionError> {
    let items = match value {
        GraphValue::Array(GraphArray::Boxed { items, .. }) => items.as_slice(),
        GraphValue::Null => &[],
        other => return Err(ctx.engine_shape(other)),
    };
    let element = ctx.attribute.element();
    let ectx = ctx.with_attribute(&element, ctx.element_type());
    items
        .iter()
        .map(|item| convert(&ectx, item))
        .collect::<Result<Vec<_>, _>>()
        .map(HostValue::Multi)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::ConverterRegistry;
    use super::*;
    use crate::host::{AttributeType, DataKind, HostCapabilities};

    fn quad() -> MeshData {
        MeshData {
            points: vec![
                [0.0, 0.0, 0.0, 1.0],
                [1.0, 0.0, 0.0, 1.0],
                [1.0, 1.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 1.0],
            ],
            counts: vec![4],
            indices: vec![0, 1, 2, 3],
            normals: vec![[0.0, 0.0, 1.0]],
            normal_ids: vec![0, 0, 0, 0],
            u: vec![0.0, 1.0],
            v: vec![0.0, 1.0],
            uv_ids: vec![0, 1, 1, 0],
            colors: Vec::new(),
        }
    }

    #[test]
    fn test_indexed_channels_expand_per_face_vertex() {
        let mesh = mesh_from_host(&quad(), None).unwrap();
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.normals, vec![[0.0, 0.0, 1.0]; 4]);
        assert_eq!(mesh.uvs, vec![[0.0, 0.0], [1.0, 1.0], [1.0, 1.0], [0.0, 0.0]]);
        assert!(mesh.colors.is_empty());
    }

    #[test]
    fn test_topology_reused_when_counts_match() {
        let first = mesh_from_host(&quad(), None).unwrap();
        let mut moved = quad();
        moved.points[0] = [5.0, 0.0, 0.0, 1.0];
        // same counts, different winding: the engine keeps its topology
        moved.indices = vec![3, 2, 1, 0];
        let second = mesh_from_host(&moved, Some(&first)).unwrap();
        assert_eq!(second.indices, vec![0, 1, 2, 3]);
        assert_eq!(second.points[0], [5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_bad_ids_are_errors() {
        let mut data = quad();
        data.normal_ids = vec![0, 0, 9, 0];
        assert!(matches!(
            mesh_from_host(&data, None),
            Err(ConversionError::Geometry(_))
        ));
        let mut data = quad();
        data.indices[0] = -1;
        assert!(mesh_from_host(&data, None).is_err());
    }

    #[test]
    fn test_empty_mesh_degenerate_fallback() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("PolygonMesh");
        let attr = leaf("mesh", AttributeType::Data(DataKind::Mesh));
        let caps = HostCapabilities {
            empty_mesh: false,
            ..HostCapabilities::default()
        };
        let ctx = PortContext::new(&p, &attr, &graph, &registry, caps);
        let host = (MESH.to_host)(&ctx, &GraphValue::PolygonMesh(PolygonMesh::default())).unwrap();
        assert_eq!(host, HostValue::Mesh(MeshData::degenerate()));

        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let host = (MESH.to_host)(&ctx, &GraphValue::Null).unwrap();
        assert_eq!(host, HostValue::Mesh(MeshData::default()));
    }

    #[test]
    fn test_mesh_round_trip_keeps_channels() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("PolygonMesh");
        let attr = leaf("mesh", AttributeType::Data(DataKind::Mesh));
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let engine = (MESH.to_engine)(&ctx, &HostValue::Mesh(quad()), &GraphValue::Null).unwrap();
        let HostValue::Mesh(back) = (MESH.to_host)(&ctx, &engine).unwrap() else {
            panic!("expected mesh");
        };
        assert_eq!(back.points, quad().points);
        assert_eq!(back.counts, vec![4]);
        assert_eq!(back.normals.len(), 4);
        assert_eq!(back.uv_ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_lines_round_trip() {
        let registry = ConverterRegistry::new();
        let graph = StubGraph::default();
        let p = port("Lines");
        let attr = leaf("curve", AttributeType::Data(DataKind::Curve));
        let ctx = PortContext::new(&p, &attr, &graph, &registry, HostCapabilities::default());
        let curve = CurveData {
            points: vec![[0.0, 0.0, 0.0, 1.0], [0.0, 2.0, 0.0, 1.0]],
            segments: vec![[0, 1]],
        };
        let engine = (LINES.to_engine)(&ctx, &HostValue::Curve(curve.clone()), &GraphValue::Null)
            .unwrap();
        assert_eq!(engine.type_name(), "Lines");
        assert_eq!((LINES.to_host)(&ctx, &engine).unwrap(), HostValue::Curve(curve));
    }
}

//! # Prebaked Meshes
//!
//! Models drawn by `DrawType::Mesh` nodes. A model is a list of buffers;
//! buffer `i` is textured with tile `i` of the node. Models are authored in
//! node units around the node center and stored as JSON:
//!
//! ```json
//! {"buffers": [{"positions": [[-0.5, -0.5, 0.0], ...],
//!               "normals": [[0.0, 0.0, -1.0], ...],
//!               "uvs": [[0.0, 1.0], ...],
//!               "indices": [0, 1, 2, 2, 3, 0]}]}
//! ```
//!
//! Normals are optional and recomputed from the triangles when missing.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{bail, Context, Result};
use cgmath::{InnerSpace, Vector3};
use log::{debug, warn};
use serde::Deserialize;

use crate::engine_state::voxels::block::block_side::NodeRotation;

use super::content_mapblock::rotate_xz_by;

/// One material's worth of a prebaked model.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct PrebakedBuffer {
    /// Vertex positions
    pub positions: Vec<[f32; 3]>,
    /// Vertex normals, one per position
    #[serde(default)]
    pub normals: Vec<[f32; 3]>,
    /// Texture coordinates, one per position
    pub uvs: Vec<[f32; 2]>,
    /// Triangle list indices into the vertex arrays
    pub indices: Vec<u32>,
}

impl PrebakedBuffer {
    fn validate(&self) -> Result<()> {
        let count = self.positions.len();
        if self.uvs.len() != count {
            bail!("{} positions but {} uvs", count, self.uvs.len());
        }
        if !self.normals.is_empty() && self.normals.len() != count {
            bail!("{} positions but {} normals", count, self.normals.len());
        }
        if self.indices.len() % 3 != 0 {
            bail!("index count {} is not a multiple of 3", self.indices.len());
        }
        if let Some(i) = self.indices.iter().find(|i| **i as usize >= count) {
            bail!("index {i} out of range for {count} vertices");
        }
        Ok(())
    }

    /// Recomputes normals as the area-weighted average of adjacent triangles.
    fn recalculate_normals(&mut self) {
        let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let p = |k: usize| Vector3::from(self.positions[tri[k] as usize]);
            let n = (p(1) - p(0)).cross(p(2) - p(0));
            for i in tri {
                normals[*i as usize] += n;
            }
        }
        self.normals = normals
            .into_iter()
            .map(|n| {
                if n.magnitude2() > 0.0 {
                    n.normalize().into()
                } else {
                    [0.0, 0.0, 0.0]
                }
            })
            .collect();
    }

    fn transform(&mut self, f: impl Fn(Vector3<f32>) -> Vector3<f32>) {
        for p in self.positions.iter_mut() {
            *p = f(Vector3::from(*p)).into();
        }
        for n in self.normals.iter_mut() {
            *n = f(Vector3::from(*n)).into();
        }
    }
}

/// A model in node units.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct PrebakedMesh {
    /// Buffers in tile order
    pub buffers: Vec<PrebakedBuffer>,
}

impl PrebakedMesh {
    /// Parses and validates a model.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut mesh: PrebakedMesh =
            serde_json::from_str(json).context("mesh is not valid JSON")?;
        for (i, buffer) in mesh.buffers.iter_mut().enumerate() {
            buffer
                .validate()
                .with_context(|| format!("mesh buffer {i} is malformed"))?;
            if buffer.normals.is_empty() {
                buffer.recalculate_normals();
            }
        }
        Ok(mesh)
    }

    /// Reads a model from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading mesh {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Copy with every position multiplied by `s`.
    pub fn scaled(&self, s: f32) -> Self {
        let mut mesh = self.clone();
        for buffer in mesh.buffers.iter_mut() {
            for p in buffer.positions.iter_mut() {
                *p = (Vector3::from(*p) * s).into();
            }
        }
        mesh
    }

    /// Copy turned by an orthogonal node rotation.
    pub fn rotated(&self, rotation: &NodeRotation) -> Self {
        let mut mesh = self.clone();
        for buffer in mesh.buffers.iter_mut() {
            buffer.transform(|v| rotation.apply_f32(v));
        }
        mesh
    }

    /// Copy turned about the vertical axis.
    pub fn rotated_y(&self, degrees: f32) -> Self {
        let mut mesh = self.clone();
        for buffer in mesh.buffers.iter_mut() {
            buffer.transform(|v| rotate_xz_by(v, degrees));
        }
        mesh
    }

    /// Total number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.buffers.iter().map(|b| b.indices.len() / 3).sum()
    }
}

/// Model lookup consumed by the mesh builder.
pub trait MeshSource: Send + Sync {
    /// Model registered under `name`, in node units.
    fn get_mesh(&self, name: &str) -> Option<Arc<PrebakedMesh>>;
}

/// Models held in memory, optionally loaded on demand from a directory.
#[derive(Debug, Default)]
pub struct MeshRegistry {
    root: Option<PathBuf>,
    meshes: Mutex<HashMap<String, Option<Arc<PrebakedMesh>>>>,
}

impl MeshRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that loads unknown names from files under `root`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        MeshRegistry {
            root: Some(root.as_ref().to_path_buf()),
            meshes: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a model.
    pub fn insert(&self, name: &str, mesh: PrebakedMesh) {
        let mut meshes = self.meshes.lock().unwrap_or_else(|e| e.into_inner());
        meshes.insert(name.to_owned(), Some(Arc::new(mesh)));
    }
}

impl MeshSource for MeshRegistry {
    fn get_mesh(&self, name: &str) -> Option<Arc<PrebakedMesh>> {
        if name.is_empty() {
            return None;
        }
        let mut meshes = self.meshes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = meshes.get(name) {
            return entry.clone();
        }
        let root = self.root.as_ref()?;
        // Failed loads are remembered so a missing file is reported once.
        let loaded = match PrebakedMesh::load(root.join(name)) {
            Ok(mesh) => {
                debug!("Loaded mesh `{name}` ({} triangles)", mesh.triangle_count());
                Some(Arc::new(mesh))
            }
            Err(err) => {
                warn!("Mesh `{name}` unavailable: {err:#}");
                None
            }
        };
        meshes.insert(name.to_owned(), loaded.clone());
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = r#"{"buffers": [{
        "positions": [[-0.5, -0.5, 0.0], [0.5, -0.5, 0.0], [0.5, 0.5, 0.0], [-0.5, 0.5, 0.0]],
        "uvs": [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]],
        "indices": [0, 1, 2, 2, 3, 0]
    }]}"#;

    #[test]
    fn missing_normals_are_computed() {
        let mesh = PrebakedMesh::from_json(QUAD).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        for n in &mesh.buffers[0].normals {
            assert!((n[2] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn malformed_buffers_are_rejected() {
        let bad = QUAD.replace("[0, 1, 2, 2, 3, 0]", "[0, 1, 7]");
        assert!(PrebakedMesh::from_json(&bad).is_err());
        let short = QUAD.replace("[0.0, 1.0], ", "");
        assert!(PrebakedMesh::from_json(&short).is_err());
    }

    #[test]
    fn rotation_turns_normals_too() {
        let mesh = PrebakedMesh::from_json(QUAD).unwrap().scaled(10.0).rotated_y(90.0);
        let p = mesh.buffers[0].positions[1];
        assert!((p[0]).abs() < 1e-4 && (p[2] - 5.0).abs() < 1e-4);
        let n = mesh.buffers[0].normals[0];
        assert!((n[0] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn registry_remembers_missing_files() {
        let registry = MeshRegistry::with_root("/nonexistent/meshes");
        assert!(registry.get_mesh("chair.json").is_none());
        assert!(registry.get_mesh("chair.json").is_none());
        registry.insert("chair.json", PrebakedMesh::from_json(QUAD).unwrap());
        assert!(registry.get_mesh("chair.json").is_some());
    }
}

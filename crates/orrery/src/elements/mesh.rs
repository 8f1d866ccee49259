//! Shared mesh geometry

use crate::foundation::math::{Vec2, Vec3};

/// Indexed triangle geometry shared between parts
///
/// Meshes are immutable once loaded; parts hold them behind an `Arc` so
/// the render snapshot can reference the same buffers without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    /// Normalized resource name this mesh was cached under
    pub name: String,

    /// Vertex positions
    pub positions: Vec<Vec3>,

    /// Per-vertex normals (parallel to `positions`, may be empty)
    pub normals: Vec<Vec3>,

    /// Per-vertex texture coordinates (parallel to `positions`, may be empty)
    pub texcoords: Vec<Vec2>,

    /// Triangle index list into `positions`
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Whether the mesh carries no drawable geometry
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }

    /// Check index bounds and buffer parallelism
    ///
    /// Returns a description of the first inconsistency found, if any.
    pub fn validate(&self) -> Result<(), String> {
        let count = self.positions.len();
        if !self.normals.is_empty() && self.normals.len() != count {
            return Err(format!(
                "normal count {} does not match position count {}",
                self.normals.len(),
                count
            ));
        }
        if !self.texcoords.is_empty() && self.texcoords.len() != count {
            return Err(format!(
                "texcoord count {} does not match position count {}",
                self.texcoords.len(),
                count
            ));
        }
        if let Some(&bad) = self.indices.iter().find(|&&i| i as usize >= count) {
            return Err(format!("index {bad} out of bounds for {count} vertices"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshData {
        MeshData {
            name: "triangle".to_string(),
            positions: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            normals: Vec::new(),
            texcoords: Vec::new(),
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn test_valid_mesh_passes_validation() {
        assert!(triangle().validate().is_ok());
    }

    #[test]
    fn test_out_of_bounds_index_is_rejected() {
        let mut mesh = triangle();
        mesh.indices.push(7);
        assert!(mesh.validate().is_err());
    }
}

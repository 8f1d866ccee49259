//! Wavefront OBJ mesh source

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::assets::{AssetError, MeshSource};
use crate::elements::MeshData;
use crate::foundation::math::{Vec2, Vec3};

/// Default mesh source parsing Wavefront OBJ files
///
/// Supports `v`, `vn`, `vt` and `f` records; faces with more than three
/// vertices are fan-triangulated. Each face corner becomes its own vertex
/// in the output buffers, so the parallel position/normal/texcoord arrays
/// always line up.
#[derive(Debug, Default)]
pub struct ObjMeshSource;

impl MeshSource for ObjMeshSource {
    fn load_mesh(&self, path: &Path, name: &str) -> Result<MeshData, AssetError> {
        log::debug!("loading mesh '{name}' from {}", path.display());

        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut positions: Vec<Vec3> = Vec::new();
        let mut normals: Vec<Vec3> = Vec::new();
        let mut texcoords: Vec<Vec2> = Vec::new();

        let mut out_positions: Vec<Vec3> = Vec::new();
        let mut out_normals: Vec<Vec3> = Vec::new();
        let mut out_texcoords: Vec<Vec2> = Vec::new();
        let mut out_indices: Vec<u32> = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts[0] {
                "v" if parts.len() >= 4 => {
                    positions.push(Vec3::new(
                        parse_f32(parts[1], "vertex x")?,
                        parse_f32(parts[2], "vertex y")?,
                        parse_f32(parts[3], "vertex z")?,
                    ));
                }
                "vn" if parts.len() >= 4 => {
                    normals.push(Vec3::new(
                        parse_f32(parts[1], "normal x")?,
                        parse_f32(parts[2], "normal y")?,
                        parse_f32(parts[3], "normal z")?,
                    ));
                }
                "vt" if parts.len() >= 3 => {
                    texcoords.push(Vec2::new(
                        parse_f32(parts[1], "tex coord u")?,
                        parse_f32(parts[2], "tex coord v")?,
                    ));
                }
                "f" if parts.len() >= 4 => {
                    let mut face_indices = Vec::with_capacity(parts.len() - 1);

                    for corner in &parts[1..] {
                        let refs: Vec<&str> = corner.split('/').collect();

                        let pos_idx = parse_index(refs[0], "position index")?;
                        let position = *positions.get(pos_idx).ok_or_else(|| {
                            AssetError::InvalidFormat("position index out of bounds".to_string())
                        })?;

                        let texcoord = refs
                            .get(1)
                            .filter(|s| !s.is_empty())
                            .and_then(|s| s.parse::<usize>().ok())
                            .and_then(|i| texcoords.get(i - 1))
                            .copied()
                            .unwrap_or_else(Vec2::zeros);

                        let normal = refs
                            .get(2)
                            .filter(|s| !s.is_empty())
                            .and_then(|s| s.parse::<usize>().ok())
                            .and_then(|i| normals.get(i - 1))
                            .copied()
                            .unwrap_or_else(|| Vec3::new(0.0, 1.0, 0.0));

                        out_positions.push(position);
                        out_texcoords.push(texcoord);
                        out_normals.push(normal);
                        face_indices.push(u32::try_from(out_positions.len() - 1).map_err(
                            |_| AssetError::InvalidFormat("mesh exceeds index range".to_string()),
                        )?);
                    }

                    // Fan triangulation for quads and larger faces
                    for i in 1..(face_indices.len() - 1) {
                        out_indices.push(face_indices[0]);
                        out_indices.push(face_indices[i]);
                        out_indices.push(face_indices[i + 1]);
                    }
                }
                _ => {
                    // Ignore other records (groups, materials, smoothing)
                }
            }
        }

        if out_positions.is_empty() {
            return Err(AssetError::InvalidFormat(format!(
                "no faces found in {}",
                path.display()
            )));
        }

        let mesh = MeshData {
            name: name.to_string(),
            positions: out_positions,
            normals: out_normals,
            texcoords: out_texcoords,
            indices: out_indices,
        };
        mesh.validate().map_err(AssetError::InvalidFormat)?;

        log::debug!(
            "loaded mesh '{name}': {} vertices, {} triangles",
            mesh.positions.len(),
            mesh.indices.len() / 3
        );
        Ok(mesh)
    }
}

fn parse_f32(text: &str, what: &str) -> Result<f32, AssetError> {
    text.parse()
        .map_err(|_| AssetError::Parse(format!("invalid {what}: '{text}'")))
}

fn parse_index(text: &str, what: &str) -> Result<usize, AssetError> {
    let idx: usize = text
        .parse()
        .map_err(|_| AssetError::Parse(format!("invalid {what}: '{text}'")))?;
    if idx == 0 {
        return Err(AssetError::Parse(format!("{what} must be 1-based")));
    }
    Ok(idx - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CUBE_FACE: &str = "\
# one quad
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vn 0.0 0.0 1.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    fn write_fixture(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_quad_is_fan_triangulated() {
        let path = write_fixture("orrery_obj_quad_test.obj", CUBE_FACE);
        let mesh = ObjMeshSource.load_mesh(&path, "quad").unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.normals.len(), mesh.positions.len());
        assert_eq!(mesh.texcoords.len(), mesh.positions.len());
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let path = write_fixture("orrery_obj_empty_test.obj", "# nothing\n");
        let result = ObjMeshSource.load_mesh(&path, "empty");
        fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(AssetError::InvalidFormat(_))));
    }

    #[test]
    fn test_out_of_bounds_face_is_rejected() {
        let path = write_fixture("orrery_obj_oob_test.obj", "v 0 0 0\nf 1 2 3\n");
        let result = ObjMeshSource.load_mesh(&path, "oob");
        fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }
}

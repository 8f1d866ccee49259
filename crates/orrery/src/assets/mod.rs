//! Resource loading: source traits, default loaders, name normalization
//!
//! The engine never decodes files itself; it funnels every load through
//! the [`MeshSource`] / [`TextureSource`] seams. The default
//! implementations parse Wavefront OBJ geometry and decode images through
//! the `image` crate. Loads always run *outside* the universe data lock;
//! the caller re-validates the cache after reacquiring it.

mod obj;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::elements::{MeshData, TextureImage};

pub use obj::ObjMeshSource;

/// Errors reported by resource sources
#[derive(Debug, Error)]
pub enum AssetError {
    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File content could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// File parsed but described no usable resource
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

/// Loads mesh geometry from a path
pub trait MeshSource: Send + Sync {
    /// Load and decode the mesh at `path`, caching it under `name`
    fn load_mesh(&self, path: &Path, name: &str) -> Result<MeshData, AssetError>;
}

/// Loads and decodes image files
pub trait TextureSource: Send + Sync {
    /// Load and decode the image at `path` into RGBA pixels
    fn load_image(&self, path: &Path) -> Result<TextureImage, AssetError>;
}

/// Default texture source backed by the `image` crate
#[derive(Debug, Default)]
pub struct ImageTextureSource;

impl TextureSource for ImageTextureSource {
    fn load_image(&self, path: &Path) -> Result<TextureImage, AssetError> {
        log::debug!("loading image from {}", path.display());

        let img = image::open(path)
            .map_err(|e| AssetError::Parse(format!("failed to decode {}: {e}", path.display())))?;

        // RGBA8 is the one layout the pipeline upload accepts
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::debug!("loaded image {width}x{height} from {}", path.display());

        Ok(TextureImage {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

/// Strip the configured extension from a resource identifier
///
/// `"hull.obj"` with extension `"obj"` becomes `"hull"`; names without
/// the extension pass through unchanged. Cache keys are always the
/// stripped form, so the same resource named with or without its
/// extension resolves to one cache entry.
pub fn normalize_resource_name(name: &str, extension: &str) -> String {
    if extension.is_empty() {
        return name.to_string();
    }
    let suffix = format!(".{extension}");
    name.strip_suffix(&suffix).unwrap_or(name).to_string()
}

/// Resolve a normalized resource name to its on-disk path
pub fn resource_path(dir: &Path, name: &str, extension: &str) -> PathBuf {
    if extension.is_empty() {
        dir.join(name)
    } else {
        dir.join(format!("{name}.{extension}"))
    }
}

/// List files under `dir` carrying the given extension
///
/// With `recursive`, subdirectories are walked as well. Paths are
/// returned in a stable sorted order.
pub fn files_with_extension(
    dir: &Path,
    extension: &str,
    recursive: bool,
) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_files(dir, extension, recursive, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_files(
    dir: &Path,
    extension: &str,
    recursive: bool,
    found: &mut Vec<PathBuf>,
) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, extension, recursive, found)?;
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            found.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_known_extension() {
        assert_eq!(normalize_resource_name("hull.obj", "obj"), "hull");
        assert_eq!(normalize_resource_name("hull", "obj"), "hull");
        // Other extensions are left alone
        assert_eq!(normalize_resource_name("hull.png", "obj"), "hull.png");
    }

    #[test]
    fn test_resource_path_appends_extension() {
        let path = resource_path(Path::new("meshes"), "hull", "obj");
        assert_eq!(path, PathBuf::from("meshes/hull.obj"));
    }

    #[test]
    fn test_files_with_extension_walks_directories() {
        let dir = std::env::temp_dir().join("orrery_asset_walk_test");
        let sub = dir.join("sub");
        fs::create_dir_all(&sub).unwrap();
        fs::write(dir.join("a.obj"), "# empty").unwrap();
        fs::write(dir.join("b.png"), "").unwrap();
        fs::write(sub.join("c.obj"), "# empty").unwrap();

        let flat = files_with_extension(&dir, "obj", false).unwrap();
        assert_eq!(flat.len(), 1);

        let deep = files_with_extension(&dir, "obj", true).unwrap();
        assert_eq!(deep.len(), 2);

        fs::remove_dir_all(&dir).unwrap();
    }
}

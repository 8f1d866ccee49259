//! Shared surface materials

use crate::foundation::math::{rgb, rgba, Color};
use crate::versioned::Versioned;

/// Fixed-function material color set
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialParams {
    /// Ambient reflectance
    pub ambient: Color,
    /// Diffuse reflectance
    pub diffuse: Color,
    /// Specular reflectance
    pub specular: Color,
    /// Emitted color
    pub emission: Color,
    /// Specular exponent
    pub shininess: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            ambient: rgb(0.2, 0.2, 0.2),
            diffuse: rgb(0.8, 0.8, 0.8),
            specular: rgba(0.0, 0.0, 0.0, 1.0),
            emission: rgba(0.0, 0.0, 0.0, 1.0),
            shininess: 0.0,
        }
    }
}

/// A material shared between any number of parts
///
/// Materials are owned by the registry; a part references its material by
/// key. When a product batch is removed, materials referenced only by the
/// removed batch are garbage-collected by a usage scan (the associated
/// texture is never removed that way, since textures may be shared
/// independently of material lifetime).
#[derive(Debug)]
pub struct Material {
    params: Versioned<MaterialParams>,
    /// Normalized name of the diffuse texture, if any
    texture: Option<String>,
}

impl Material {
    /// Create a material with default colors and an optional diffuse texture
    pub fn new(texture: Option<String>) -> Self {
        Self {
            params: Versioned::new(MaterialParams::default()),
            texture,
        }
    }

    /// Stage new color parameters
    pub fn set_params(&mut self, params: MaterialParams) -> bool {
        self.params.set_if_changed(params)
    }

    /// Committed color parameters
    pub fn params(&self) -> &MaterialParams {
        self.params.pure()
    }

    /// Staged color parameters
    pub fn staged_params(&self) -> &MaterialParams {
        self.params.staged()
    }

    /// Name of the associated diffuse texture, if any
    pub fn texture(&self) -> Option<&str> {
        self.texture.as_deref()
    }

    /// Commit staged attributes; returns whether anything changed
    pub fn commit(&mut self) -> bool {
        self.params.update()
    }
}

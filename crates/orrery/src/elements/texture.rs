//! Shared texture resources

use std::sync::Arc;

use crate::render::pipeline::TextureHandle;

/// Role a texture plays in rendering, derived from its directory prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// Surface color texture applied through a material
    Diffuse,
    /// Screen-space texture used by labels and overlays
    Interface,
    /// Normal map
    Normal,
}

/// Decoded RGBA image data ready for pipeline upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Raw RGBA pixel data, `width * height * 4` bytes
    pub pixels: Vec<u8>,
}

impl TextureImage {
    /// Whether both dimensions are non-zero powers of two
    ///
    /// The fixed-function backend only accepts power-of-two textures;
    /// anything else is rejected at load time.
    pub fn has_power_of_two_dimensions(&self) -> bool {
        self.width != 0
            && self.height != 0
            && self.width.is_power_of_two()
            && self.height.is_power_of_two()
    }
}

/// A cached texture: decoded image plus its committed pipeline handle
///
/// The handle is assigned by the render thread when the pending upload is
/// flushed during a synchronization pass; until then the texture exists
/// but cannot be bound.
#[derive(Debug, Clone)]
pub struct Texture {
    /// Normalized resource name this texture was cached under
    pub name: String,
    /// Role of this texture
    pub kind: TextureKind,
    /// Decoded image data
    pub image: Arc<TextureImage>,
    /// Pipeline handle, present once uploaded
    pub handle: Option<TextureHandle>,
}

impl Texture {
    /// Create a texture awaiting upload
    pub fn new(name: impl Into<String>, kind: TextureKind, image: TextureImage) -> Self {
        Self {
            name: name.into(),
            kind,
            image: Arc::new(image),
            handle: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two_check() {
        let image = TextureImage {
            width: 64,
            height: 128,
            pixels: vec![0; 64 * 128 * 4],
        };
        assert!(image.has_power_of_two_dimensions());

        let odd = TextureImage {
            width: 100,
            height: 64,
            pixels: vec![0; 100 * 64 * 4],
        };
        assert!(!odd.has_power_of_two_dimensions());
    }
}

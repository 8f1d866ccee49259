//! Labels: screen-space billboards positioned in world space

use crate::elements::ProductKey;
use crate::foundation::math::{rgb, Color, Vec2, Vec3};
use crate::versioned::Versioned;

/// A fixed-size 2D billboard drawn at the projected position of a 3D point
///
/// Labels optionally carry an interface texture and may be anchored to a
/// product, following the product's composed matrix.
#[derive(Debug)]
pub struct Label {
    name: String,
    size: Vec2,
    position: Versioned<Vec3>,
    color: Versioned<Color>,
    visible: Versioned<bool>,
    /// Normalized name of the interface texture, if any
    texture: Option<String>,
    /// Product whose composed matrix bases this label, if anchored
    pub(crate) anchor: Option<ProductKey>,
}

impl Label {
    /// Create a visible label of the given pixel size
    pub fn new(name: impl Into<String>, size: Vec2, texture: Option<String>) -> Self {
        Self {
            name: name.into(),
            size,
            position: Versioned::new(Vec3::zeros()),
            color: Versioned::new(rgb(1.0, 1.0, 1.0)),
            visible: Versioned::new(true),
            texture,
            anchor: None,
        }
    }

    /// Label name (not required to be unique)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pixel size of the billboard
    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// Stage a new anchor-relative position
    pub fn set_position(&mut self, position: Vec3) -> bool {
        self.position.set_if_changed(position)
    }

    /// Stage a new modulation color
    pub fn set_color(&mut self, color: Color) -> bool {
        self.color.set_if_changed(color)
    }

    /// Stage visibility
    pub fn set_visible(&mut self, visible: bool) -> bool {
        self.visible.set_if_changed(visible)
    }

    /// Committed position
    pub fn position(&self) -> Vec3 {
        *self.position.pure()
    }

    /// Committed modulation color
    pub fn color(&self) -> Color {
        *self.color.pure()
    }

    /// Committed visibility
    pub fn visible(&self) -> bool {
        *self.visible.pure()
    }

    /// Name of the interface texture, if any
    pub fn texture(&self) -> Option<&str> {
        self.texture.as_deref()
    }

    /// Product anchor, if any
    pub fn anchor(&self) -> Option<ProductKey> {
        self.anchor
    }

    /// Commit staged attributes; returns whether anything changed
    pub fn commit(&mut self) -> bool {
        let mut changed = self.position.update();
        changed |= self.color.update();
        changed |= self.visible.update();
        changed
    }
}

//! Rendering worlds

use crate::elements::ElementId;
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::versioned::Versioned;

/// Window-relative viewport rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Horizontal position of the lower-left corner
    pub x: i32,
    /// Vertical position of the lower-left corner
    pub y: i32,
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
}

impl Viewport {
    /// Width over height; 1.0 for degenerate viewports
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Projection parameters handed to the pipeline each frame
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        /// Half-height of the visible volume in world units
        scale: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Self::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Camera placement
#[derive(Debug, Clone, PartialEq)]
pub struct CameraView {
    /// Camera position
    pub eye: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// Up direction
    pub up: Vec3,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 10.0),
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
        }
    }
}

impl CameraView {
    /// Right-handed view matrix for this placement
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(
            &Point3::from(self.eye),
            &Point3::from(self.target),
            &self.up,
        )
    }
}

/// A named rendering context with its own viewport and camera
///
/// A world holds ordered references into the element registry: the
/// elements created in it plus any elements referred into it from other
/// worlds. It never owns element data; removing an element from the
/// registry removes it from every world that references it.
#[derive(Debug)]
pub struct World {
    name: String,
    viewport: Versioned<Viewport>,
    projection: Versioned<Projection>,
    camera: Versioned<CameraView>,
    /// Ordered references this world renders
    pub(crate) items: Vec<ElementId>,
}

impl World {
    /// Create a world covering the given viewport
    pub fn new(name: impl Into<String>, viewport: Viewport) -> Self {
        Self {
            name: name.into(),
            viewport: Versioned::new(viewport),
            projection: Versioned::new(Projection::default()),
            camera: Versioned::new(CameraView::default()),
            items: Vec::new(),
        }
    }

    /// World name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this world references the given element
    pub fn contains(&self, id: ElementId) -> bool {
        self.items.contains(&id)
    }

    /// Append an element reference; rejects duplicates
    pub fn add_item(&mut self, id: ElementId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.items.push(id);
        true
    }

    /// Remove an element reference if present
    pub fn remove_item(&mut self, id: ElementId) -> bool {
        if let Some(pos) = self.items.iter().position(|&x| x == id) {
            self.items.remove(pos);
            true
        } else {
            false
        }
    }

    /// Ordered element references
    pub fn items(&self) -> &[ElementId] {
        &self.items
    }

    /// Stage a new viewport
    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        self.viewport.set_if_changed(viewport)
    }

    /// Stage new projection parameters
    pub fn set_projection(&mut self, projection: Projection) -> bool {
        self.projection.set_if_changed(projection)
    }

    /// Stage a new camera placement
    pub fn set_camera(&mut self, camera: CameraView) -> bool {
        self.camera.set_if_changed(camera)
    }

    /// Committed viewport
    pub fn viewport(&self) -> Viewport {
        *self.viewport.pure()
    }

    /// Committed projection parameters
    pub fn projection(&self) -> &Projection {
        self.projection.pure()
    }

    /// Committed camera placement
    pub fn camera(&self) -> &CameraView {
        self.camera.pure()
    }

    /// Commit staged attributes; returns whether anything changed
    pub fn commit(&mut self) -> bool {
        let mut changed = self.viewport.update();
        changed |= self.projection.update();
        changed |= self.camera.update();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::LampKey;
    use slotmap::Key;

    #[test]
    fn test_add_item_rejects_duplicates() {
        let mut world = World::new(
            "main",
            Viewport {
                x: 0,
                y: 0,
                width: 640,
                height: 480,
            },
        );
        let id = ElementId::Lamp(LampKey::null());
        assert!(world.add_item(id));
        assert!(!world.add_item(id));
        assert_eq!(world.items().len(), 1);
    }

    #[test]
    fn test_remove_item() {
        let mut world = World::new(
            "main",
            Viewport {
                x: 0,
                y: 0,
                width: 640,
                height: 480,
            },
        );
        let id = ElementId::Lamp(LampKey::null());
        world.add_item(id);
        assert!(world.remove_item(id));
        assert!(!world.remove_item(id));
        assert!(world.items().is_empty());
    }
}

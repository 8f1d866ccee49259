//! Figures: polyline and point-cloud objects

use crate::elements::ProductKey;
use crate::foundation::math::{rgb, Color, Transform, Vec3};
use crate::versioned::Versioned;

/// How a figure's point list is interpreted when drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureMode {
    /// Open line strip through the points
    Polyline,
    /// Closed loop through the points
    LineLoop,
    /// Isolated points
    Points,
}

/// A lightweight drawable defined by a list of points
///
/// Figures carry their own coordinate system and may be anchored to a
/// product, in which case they render at the product's composed matrix.
#[derive(Debug)]
pub struct Figure {
    name: String,
    points: Versioned<Vec<Vec3>>,
    mode: Versioned<FigureMode>,
    color: Versioned<Color>,
    line_width: Versioned<f32>,
    visible: Versioned<bool>,
    transform: Versioned<Transform>,
    /// Product whose composed matrix bases this figure, if anchored
    pub(crate) anchor: Option<ProductKey>,
}

impl Figure {
    /// Create an empty, visible polyline figure
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Versioned::new(Vec::new()),
            mode: Versioned::new(FigureMode::Polyline),
            color: Versioned::new(rgb(1.0, 1.0, 1.0)),
            line_width: Versioned::new(1.0),
            visible: Versioned::new(true),
            transform: Versioned::new(Transform::identity()),
            anchor: None,
        }
    }

    /// Figure name (not required to be unique)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage a new point list
    pub fn set_points(&mut self, points: Vec<Vec3>) {
        self.points.set(points);
    }

    /// Stage a new drawing mode
    pub fn set_mode(&mut self, mode: FigureMode) -> bool {
        self.mode.set_if_changed(mode)
    }

    /// Stage a new color
    pub fn set_color(&mut self, color: Color) -> bool {
        self.color.set_if_changed(color)
    }

    /// Stage a new line width
    pub fn set_line_width(&mut self, width: f32) -> bool {
        self.line_width.set_if_changed(width)
    }

    /// Stage visibility
    pub fn set_visible(&mut self, visible: bool) -> bool {
        self.visible.set_if_changed(visible)
    }

    /// Stage a new local transform
    pub fn set_transform(&mut self, transform: Transform) -> bool {
        self.transform.set_if_changed(transform)
    }

    /// Committed point list
    pub fn points(&self) -> &[Vec3] {
        self.points.pure()
    }

    /// Committed drawing mode
    pub fn mode(&self) -> FigureMode {
        *self.mode.pure()
    }

    /// Committed color
    pub fn color(&self) -> Color {
        *self.color.pure()
    }

    /// Committed line width
    pub fn line_width(&self) -> f32 {
        *self.line_width.pure()
    }

    /// Committed visibility
    pub fn visible(&self) -> bool {
        *self.visible.pure()
    }

    /// Committed local transform
    pub fn transform(&self) -> &Transform {
        self.transform.pure()
    }

    /// Product anchor, if any
    pub fn anchor(&self) -> Option<ProductKey> {
        self.anchor
    }

    /// Commit staged attributes; returns whether anything changed
    pub fn commit(&mut self) -> bool {
        let mut changed = self.points.update();
        changed |= self.mode.update();
        changed |= self.color.update();
        changed |= self.line_width.update();
        changed |= self.visible.update();
        changed |= self.transform.update();
        changed
    }
}

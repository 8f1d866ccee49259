//! Light sources

use crate::elements::ProductKey;
use crate::foundation::math::{rgb, rgba, Color, Vec3};
use crate::versioned::Versioned;

/// Kind of light source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LampKind {
    /// Infinitely distant directional light (like sunlight)
    Celestial,
    /// Positioned light with a cone
    Spot,
    /// Light attached to the camera position
    Headlight,
}

/// Color and placement parameters of a lamp
#[derive(Debug, Clone, PartialEq)]
pub struct LampParams {
    /// Ambient contribution
    pub ambient: Color,
    /// Diffuse contribution
    pub diffuse: Color,
    /// Specular contribution
    pub specular: Color,
    /// Position for spot/headlight lamps, direction for celestial lamps
    pub position: Vec3,
    /// Cone axis for spot lamps
    pub spot_direction: Vec3,
    /// Cone half-angle in degrees for spot lamps (180 = omnidirectional)
    pub spot_angle: f32,
}

impl Default for LampParams {
    fn default() -> Self {
        Self {
            ambient: rgba(0.0, 0.0, 0.0, 1.0),
            diffuse: rgb(1.0, 1.0, 1.0),
            specular: rgb(1.0, 1.0, 1.0),
            position: Vec3::new(0.0, 0.0, 1.0),
            spot_direction: Vec3::new(0.0, 0.0, -1.0),
            spot_angle: 180.0,
        }
    }
}

/// A light source registered in the universe
///
/// The light-unit index is a scarce hardware resource. At creation a lamp
/// receives a count-based index, which may be transiently wrong after
/// removals; the synchronization pass totally reassigns contiguous units
/// `[0, lamp_count)` every time composition changes, so the render side
/// always sees a consistent assignment.
#[derive(Debug)]
pub struct Lamp {
    name: String,
    kind: LampKind,
    params: Versioned<LampParams>,
    /// Assigned light unit; written by the synchronization pass
    unit: u32,
    /// Product whose composed matrix positions this lamp, if anchored
    pub(crate) anchor: Option<ProductKey>,
}

impl Lamp {
    /// Create a lamp with default parameters and an initial unit guess
    pub fn new(name: impl Into<String>, kind: LampKind, unit: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            params: Versioned::new(LampParams::default()),
            unit,
            anchor: None,
        }
    }

    /// Lamp name (not required to be unique)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of this lamp
    pub fn kind(&self) -> LampKind {
        self.kind
    }

    /// Stage new parameters
    pub fn set_params(&mut self, params: LampParams) -> bool {
        self.params.set_if_changed(params)
    }

    /// Committed parameters
    pub fn params(&self) -> &LampParams {
        self.params.pure()
    }

    /// Currently assigned light unit
    pub fn unit(&self) -> u32 {
        self.unit
    }

    /// Reassign the light unit (synchronization pass only)
    pub(crate) fn assign_unit(&mut self, unit: u32) {
        self.unit = unit;
    }

    /// Product anchor, if any
    pub fn anchor(&self) -> Option<ProductKey> {
        self.anchor
    }

    /// Commit staged attributes; returns whether anything changed
    pub fn commit(&mut self) -> bool {
        self.params.update()
    }
}

//! Graphics pipeline abstraction
//!
//! The engine issues all drawing through this narrow trait; the actual
//! GL/Vulkan call sequencing lives in the implementing backend. State
//! setters are expected to be cheap when called redundantly: the backend
//! deduplicates transitions, so the traversal code does not track the
//! last applied state itself.

use crate::elements::{LampKind, Projection, TextureImage, Viewport};
use crate::foundation::math::{Color, Mat4, Vec2, Vec3, Vec4};

/// Handle to a texture resource stored in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Primitive topology for an indexed draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Triangle list
    Triangles,
    /// Open line strip
    LineStrip,
    /// Closed line loop
    LineLoop,
    /// Isolated points
    Points,
}

/// Static information reported by the backend at initialization
#[derive(Debug, Clone, Default)]
pub struct BackendInfo {
    /// Renderer identification string
    pub renderer: String,
    /// API version string
    pub version: String,
    /// Shading language version string
    pub shading_language: String,
    /// Supported extension list
    pub extensions: String,
    /// Number of hardware light units available
    pub max_light_units: u32,
}

/// Resolved per-frame state of one active lamp
#[derive(Debug, Clone, PartialEq)]
pub struct LampState {
    /// Light unit this lamp occupies
    pub unit: u32,
    /// Kind of lamp
    pub kind: LampKind,
    /// Ambient contribution
    pub ambient: Color,
    /// Diffuse contribution
    pub diffuse: Color,
    /// Specular contribution
    pub specular: Color,
    /// Homogeneous position: `w == 0` marks a directional light
    pub position: Vec4,
    /// Cone axis for spot lamps
    pub spot_direction: Vec3,
    /// Cone half-angle in degrees
    pub spot_angle: f32,
}

/// Resolved material state for one draw call
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialState {
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
    /// Bound diffuse texture, if any
    pub texture: Option<TextureHandle>,
}

/// The rendering backend seam
///
/// One implementation drives a real graphics API; [`RecordingPipeline`]
/// records the call stream for tests and headless use. All methods are
/// called from the render thread only.
pub trait Pipeline {
    /// Initialize backend state and report its capabilities
    fn initialize(&mut self) -> BackendInfo;

    /// Configure the viewport rectangle
    fn set_viewport(&mut self, viewport: Viewport);

    /// Set the clear color
    fn set_background_color(&mut self, color: Color);

    /// Clear color and depth for a new frame
    fn clear(&mut self);

    /// Configure the projection for the given aspect ratio
    fn set_projection(&mut self, projection: &Projection, aspect: f32);

    /// Set the camera view matrix
    fn set_view_matrix(&mut self, view: &Mat4);

    /// Apply one lamp to its light unit
    fn apply_lamp(&mut self, lamp: &LampState);

    /// Disable every light unit at or beyond `first_unit`
    fn disable_lamps_from(&mut self, first_unit: u32);

    /// Apply material colors and texture binding
    fn set_material(&mut self, material: &MaterialState);

    /// Set the flat drawing color (figures, labels)
    fn set_color(&mut self, color: Color);

    /// Set the line width for line topologies
    fn set_line_width(&mut self, width: f32);

    /// Set the model matrix for subsequent draws
    fn set_model_matrix(&mut self, model: &Mat4);

    /// Upload a decoded image and return its handle
    fn upload_texture(&mut self, image: &TextureImage) -> TextureHandle;

    /// Bind a texture for subsequent draws, or unbind with `None`
    fn bind_texture(&mut self, handle: Option<TextureHandle>);

    /// Draw indexed geometry
    ///
    /// `normals` and `texcoords` may be empty when the topology does not
    /// use them.
    fn draw_indexed(
        &mut self,
        topology: Topology,
        positions: &[Vec3],
        normals: &[Vec3],
        texcoords: &[Vec2],
        indices: &[u32],
    );

    /// Switch to a pixel-aligned orthographic overlay projection
    fn begin_screen_space(&mut self, width: u32, height: u32);

    /// Leave overlay projection
    fn end_screen_space(&mut self);

    /// Draw the loading indicator overlay
    ///
    /// `phase` alternates on the configured blink interval.
    fn draw_loading_overlay(&mut self, width: u32, height: u32, phase: bool);
}

/// One recorded pipeline call
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum PipelineCall {
    Initialize,
    SetViewport(Viewport),
    SetBackgroundColor(Color),
    Clear,
    SetProjection { aspect: f32 },
    SetViewMatrix,
    ApplyLamp(LampState),
    DisableLampsFrom(u32),
    SetMaterial(MaterialState),
    SetColor(Color),
    SetLineWidth(f32),
    SetModelMatrix,
    UploadTexture { width: u32, height: u32 },
    BindTexture(Option<TextureHandle>),
    DrawIndexed { topology: Topology, index_count: usize },
    BeginScreenSpace { width: u32, height: u32 },
    EndScreenSpace,
    DrawLoadingOverlay { phase: bool },
}

/// A pipeline that records its call stream instead of drawing
///
/// Used by the test suite to assert on traversal behavior, and usable as
/// a headless stand-in wherever no real backend is available.
#[derive(Debug)]
pub struct RecordingPipeline {
    /// Recorded calls in issue order
    pub calls: Vec<PipelineCall>,
    info: BackendInfo,
    next_texture: u64,
}

impl RecordingPipeline {
    /// Create a recording pipeline reporting 8 light units
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            info: BackendInfo {
                renderer: "recording".to_string(),
                version: "1.0".to_string(),
                shading_language: "none".to_string(),
                extensions: String::new(),
                max_light_units: 8,
            },
            next_texture: 0,
        }
    }

    /// Number of recorded draw calls
    pub fn draw_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, PipelineCall::DrawIndexed { .. }))
            .count()
    }

    /// Drop all recorded calls
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl Default for RecordingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline for RecordingPipeline {
    fn initialize(&mut self) -> BackendInfo {
        self.calls.push(PipelineCall::Initialize);
        self.info.clone()
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.calls.push(PipelineCall::SetViewport(viewport));
    }

    fn set_background_color(&mut self, color: Color) {
        self.calls.push(PipelineCall::SetBackgroundColor(color));
    }

    fn clear(&mut self) {
        self.calls.push(PipelineCall::Clear);
    }

    fn set_projection(&mut self, _projection: &Projection, aspect: f32) {
        self.calls.push(PipelineCall::SetProjection { aspect });
    }

    fn set_view_matrix(&mut self, _view: &Mat4) {
        self.calls.push(PipelineCall::SetViewMatrix);
    }

    fn apply_lamp(&mut self, lamp: &LampState) {
        self.calls.push(PipelineCall::ApplyLamp(lamp.clone()));
    }

    fn disable_lamps_from(&mut self, first_unit: u32) {
        self.calls.push(PipelineCall::DisableLampsFrom(first_unit));
    }

    fn set_material(&mut self, material: &MaterialState) {
        self.calls.push(PipelineCall::SetMaterial(material.clone()));
    }

    fn set_color(&mut self, color: Color) {
        self.calls.push(PipelineCall::SetColor(color));
    }

    fn set_line_width(&mut self, width: f32) {
        self.calls.push(PipelineCall::SetLineWidth(width));
    }

    fn set_model_matrix(&mut self, _model: &Mat4) {
        self.calls.push(PipelineCall::SetModelMatrix);
    }

    fn upload_texture(&mut self, image: &TextureImage) -> TextureHandle {
        self.calls.push(PipelineCall::UploadTexture {
            width: image.width,
            height: image.height,
        });
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        handle
    }

    fn bind_texture(&mut self, handle: Option<TextureHandle>) {
        self.calls.push(PipelineCall::BindTexture(handle));
    }

    fn draw_indexed(
        &mut self,
        topology: Topology,
        _positions: &[Vec3],
        _normals: &[Vec3],
        _texcoords: &[Vec2],
        indices: &[u32],
    ) {
        self.calls.push(PipelineCall::DrawIndexed {
            topology,
            index_count: indices.len(),
        });
    }

    fn begin_screen_space(&mut self, width: u32, height: u32) {
        self.calls
            .push(PipelineCall::BeginScreenSpace { width, height });
    }

    fn end_screen_space(&mut self) {
        self.calls.push(PipelineCall::EndScreenSpace);
    }

    fn draw_loading_overlay(&mut self, _width: u32, _height: u32, phase: bool) {
        self.calls.push(PipelineCall::DrawLoadingOverlay { phase });
    }
}

//! Render-safe frame snapshot
//!
//! The snapshot is the renderer-owned copy of all committed state needed
//! to draw a frame. It is rebuilt inside the try-lock window whenever the
//! synchronization pass reports a change, and reused untouched on frames
//! where the lock was contended or nothing changed. Draw calls therefore
//! never read the shared scene state.

use std::sync::Arc;

use crate::elements::{
    ElementId, FigureMode, MaterialParams, MeshData, ProductKey, ProductKind, Projection, Viewport,
};
use crate::foundation::math::{rgb, Color, Mat4, Point3, Vec2, Vec3, Vec4};
use crate::registry::ElementRegistry;
use crate::render::pipeline::{LampState, MaterialState, TextureHandle, Topology};

/// Everything needed to draw one frame
#[derive(Debug)]
pub(crate) struct FrameSnapshot {
    pub background: Color,
    pub loading: bool,
    pub worlds: Vec<WorldFrame>,
}

/// Per-world draw data
#[derive(Debug)]
pub(crate) struct WorldFrame {
    pub viewport: Viewport,
    pub projection: Projection,
    pub view: Mat4,
    pub lamps: Vec<LampState>,
    pub products: Vec<ProductFrame>,
    pub figures: Vec<FigureFrame>,
    pub labels: Vec<LabelFrame>,
}

/// One drawable part
#[derive(Debug)]
pub(crate) struct ProductFrame {
    pub mesh: Arc<MeshData>,
    pub model: Mat4,
    pub material: MaterialState,
}

/// One drawable figure
#[derive(Debug)]
pub(crate) struct FigureFrame {
    pub points: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub topology: Topology,
    pub color: Color,
    pub line_width: f32,
    pub model: Mat4,
}

/// One drawable label
#[derive(Debug)]
pub(crate) struct LabelFrame {
    pub position: Point3,
    pub size: Vec2,
    pub color: Color,
    pub texture: Option<TextureHandle>,
}

impl Default for FrameSnapshot {
    fn default() -> Self {
        Self {
            background: rgb(0.0, 0.0, 0.0),
            loading: false,
            worlds: Vec::new(),
        }
    }
}

impl FrameSnapshot {
    /// Build a snapshot from committed registry state
    ///
    /// Called with the data lock held, immediately after a
    /// synchronization pass; reads only committed values.
    pub fn build(
        registry: &ElementRegistry,
        background: Color,
        loading: bool,
        max_light_units: u32,
    ) -> Self {
        let mut worlds = Vec::with_capacity(registry.worlds.len());

        for (_, world) in &registry.worlds {
            let mut frame = WorldFrame {
                viewport: world.viewport(),
                projection: world.projection().clone(),
                view: world.camera().view_matrix(),
                lamps: Vec::new(),
                products: Vec::new(),
                figures: Vec::new(),
                labels: Vec::new(),
            };

            for &item in world.items() {
                match item {
                    ElementId::Lamp(key) => {
                        if let Some(lamp) = registry.lamps.get(key) {
                            if lamp.unit() < max_light_units {
                                frame.lamps.push(lamp_state(registry, key));
                            }
                        }
                    }
                    ElementId::Product(key) => {
                        if let Some(product) = registry.products.get(key) {
                            if product.kind() != ProductKind::Part || !product.visible() {
                                continue;
                            }
                            let Some(mesh) = product.mesh() else { continue };
                            frame.products.push(ProductFrame {
                                mesh: Arc::clone(mesh),
                                model: *product.composed(),
                                material: material_state(registry, product.material()),
                            });
                        }
                    }
                    ElementId::Figure(key) => {
                        if let Some(figure) = registry.figures.get(key) {
                            if !figure.visible() || figure.points().is_empty() {
                                continue;
                            }
                            let points = figure.points().to_vec();
                            let indices: Vec<u32> =
                                (0..u32::try_from(points.len()).unwrap_or(0)).collect();
                            frame.figures.push(FigureFrame {
                                points,
                                indices,
                                topology: figure_topology(figure.mode()),
                                color: figure.color(),
                                line_width: figure.line_width(),
                                model: anchor_matrix(registry, figure.anchor())
                                    * figure.transform().to_matrix(),
                            });
                        }
                    }
                    ElementId::Label(key) => {
                        if let Some(label) = registry.labels.get(key) {
                            if !label.visible() {
                                continue;
                            }
                            let base = anchor_matrix(registry, label.anchor());
                            let position = base.transform_point(&Point3::from(label.position()));
                            frame.labels.push(LabelFrame {
                                position,
                                size: label.size(),
                                color: label.color(),
                                texture: label
                                    .texture()
                                    .and_then(|name| registry.texture(name))
                                    .and_then(|t| t.handle),
                            });
                        }
                    }
                    // Worlds and materials never appear in a world's list
                    _ => {}
                }
            }

            worlds.push(frame);
        }

        Self {
            background,
            loading,
            worlds,
        }
    }
}

/// Composed matrix of an anchored product, identity when unanchored
fn anchor_matrix(registry: &ElementRegistry, anchor: Option<ProductKey>) -> Mat4 {
    anchor
        .and_then(|key| registry.products.get(key))
        .map_or_else(Mat4::identity, |product| *product.composed())
}

fn lamp_state(registry: &ElementRegistry, key: crate::elements::LampKey) -> LampState {
    let lamp = &registry.lamps[key];
    let params = lamp.params();
    let base = anchor_matrix(registry, lamp.anchor());

    let position = match lamp.kind() {
        crate::elements::LampKind::Celestial => {
            let dir = base.transform_vector(&params.position);
            Vec4::new(dir.x, dir.y, dir.z, 0.0)
        }
        _ => {
            let p = base.transform_point(&Point3::from(params.position));
            Vec4::new(p.x, p.y, p.z, 1.0)
        }
    };

    LampState {
        unit: lamp.unit(),
        kind: lamp.kind(),
        ambient: params.ambient,
        diffuse: params.diffuse,
        specular: params.specular,
        position,
        spot_direction: base.transform_vector(&params.spot_direction),
        spot_angle: params.spot_angle,
    }
}

fn material_state(
    registry: &ElementRegistry,
    material: Option<crate::elements::MaterialKey>,
) -> MaterialState {
    let (params, texture) = material
        .and_then(|key| registry.materials.get(key))
        .map_or_else(
            || (MaterialParams::default(), None),
            |m| {
                let handle = m
                    .texture()
                    .and_then(|name| registry.texture(name))
                    .and_then(|t| t.handle);
                (m.params().clone(), handle)
            },
        );

    MaterialState {
        ambient: params.ambient,
        diffuse: params.diffuse,
        specular: params.specular,
        emission: params.emission,
        shininess: params.shininess,
        texture,
    }
}

fn figure_topology(mode: FigureMode) -> Topology {
    match mode {
        FigureMode::Polyline => Topology::LineStrip,
        FigureMode::LineLoop => Topology::LineLoop,
        FigureMode::Points => Topology::Points,
    }
}

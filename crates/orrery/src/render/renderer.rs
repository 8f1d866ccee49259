//! The render-thread half of the universe
//!
//! Exactly one [`Renderer`] exists per [`crate::Universe`]; it is handed
//! to whichever thread drives the display refresh. Its entry points take
//! `&mut self`, so reentrancy and cross-thread sharing are ruled out at
//! compile time.

use std::sync::{Arc, Mutex};

use crate::config::UniverseConfig;
use crate::elements::Projection;
use crate::foundation::math::{Mat4, Point3, Vec2, Vec3};
use crate::foundation::time::Stopwatch;
use crate::registry::ChangeMask;
use crate::render::pipeline::{Pipeline, Topology};
use crate::render::snapshot::{FrameSnapshot, LabelFrame, WorldFrame};
use crate::universe::UniverseState;

/// Drives the per-frame synchronize-then-draw sequence
///
/// The frame entry point never blocks on mutator activity: it *tries* to
/// take the data lock, and when a mutation is mid-flight it simply draws
/// the previous committed snapshot again. A frame rendered from stale
/// state under contention is the designed trade-off, not an error.
pub struct Renderer {
    shared: Arc<Mutex<UniverseState>>,
    config: Arc<UniverseConfig>,
    snapshot: FrameSnapshot,
    blink: Stopwatch,
    blink_phase: bool,
}

impl Renderer {
    pub(crate) fn new(shared: Arc<Mutex<UniverseState>>, config: Arc<UniverseConfig>) -> Self {
        Self {
            shared,
            config,
            snapshot: FrameSnapshot::default(),
            blink: Stopwatch::start_new(),
            blink_phase: false,
        }
    }

    /// Query backend capabilities and publish them to the universe
    ///
    /// Call once from the render thread before the first frame. Takes the
    /// data lock unconditionally; initialization happens before any frame
    /// cadence exists, so blocking here is harmless.
    pub fn render_initialize(&mut self, pipeline: &mut dyn Pipeline) {
        let info = pipeline.initialize();
        log::info!(
            "render backend: {} {} ({} light units)",
            info.renderer,
            info.version,
            info.max_light_units
        );

        let mut state = self.shared.lock().unwrap();
        state.max_light_units = if info.max_light_units > 0 {
            self.config.max_light_units.min(info.max_light_units)
        } else {
            self.config.max_light_units
        };
        state.backend = Some(info);
        state.registry.mark_changed(ChangeMask::SETTINGS);
    }

    /// Render one frame
    ///
    /// Called once per display refresh by the external driver. If the
    /// data lock is free: runs the synchronization pass, flushes pending
    /// texture uploads, refreshes the retained snapshot, then releases
    /// the lock before issuing draw calls. If the lock is contended: draws
    /// the previous snapshot unchanged.
    pub fn render_frame(&mut self, pipeline: &mut dyn Pipeline, width: u32, height: u32) {
        if let Ok(mut state) = self.shared.try_lock() {
            let changed = state.synchronize();
            let uploaded = state.upload_pending_textures(pipeline);
            if changed || uploaded {
                self.snapshot = FrameSnapshot::build(
                    &state.registry,
                    *state.background.pure(),
                    *state.loading.pure(),
                    state.max_light_units,
                );
            }
        } else {
            log::trace!("scene lock contended; redrawing previous snapshot");
        }

        self.draw(pipeline, width, height);
    }

    // ========================================================================
    // Draw traversal (committed snapshot only)
    // ========================================================================

    fn draw(&mut self, pipeline: &mut dyn Pipeline, width: u32, height: u32) {
        pipeline.set_background_color(self.snapshot.background);
        pipeline.clear();

        for world in &self.snapshot.worlds {
            Self::draw_world(pipeline, world);
        }

        if self.snapshot.loading && self.config.show_loading_overlay {
            if self.blink.elapsed_millis() >= self.config.loading_blink_interval_ms {
                self.blink_phase = !self.blink_phase;
                self.blink.restart();
            }
            pipeline.draw_loading_overlay(width, height, self.blink_phase);
        }
    }

    fn draw_world(pipeline: &mut dyn Pipeline, world: &WorldFrame) {
        pipeline.set_viewport(world.viewport);
        pipeline.set_projection(&world.projection, world.viewport.aspect());
        pipeline.set_view_matrix(&world.view);

        for lamp in &world.lamps {
            pipeline.apply_lamp(lamp);
        }
        pipeline.disable_lamps_from(u32::try_from(world.lamps.len()).unwrap_or(u32::MAX));

        for product in &world.products {
            pipeline.set_model_matrix(&product.model);
            pipeline.set_material(&product.material);
            pipeline.draw_indexed(
                Topology::Triangles,
                &product.mesh.positions,
                &product.mesh.normals,
                &product.mesh.texcoords,
                &product.mesh.indices,
            );
        }

        for figure in &world.figures {
            pipeline.bind_texture(None);
            pipeline.set_color(figure.color);
            pipeline.set_line_width(figure.line_width);
            pipeline.set_model_matrix(&figure.model);
            pipeline.draw_indexed(figure.topology, &figure.points, &[], &[], &figure.indices);
        }

        if !world.labels.is_empty() {
            Self::draw_labels(pipeline, world);
        }
    }

    /// Draw labels as screen-space quads at their projected positions
    fn draw_labels(pipeline: &mut dyn Pipeline, world: &WorldFrame) {
        let view_projection =
            projection_matrix(&world.projection, world.viewport.aspect()) * world.view;

        pipeline.begin_screen_space(world.viewport.width, world.viewport.height);
        for label in &world.labels {
            if let Some(screen) = project_to_screen(
                &view_projection,
                label.position,
                world.viewport.width,
                world.viewport.height,
            ) {
                Self::draw_label_quad(pipeline, label, screen);
            }
        }
        pipeline.end_screen_space();
    }

    fn draw_label_quad(pipeline: &mut dyn Pipeline, label: &LabelFrame, screen: Vec2) {
        let half_w = label.size.x * 0.5;
        let half_h = label.size.y * 0.5;
        let positions = [
            Vec3::new(screen.x - half_w, screen.y - half_h, 0.0),
            Vec3::new(screen.x + half_w, screen.y - half_h, 0.0),
            Vec3::new(screen.x + half_w, screen.y + half_h, 0.0),
            Vec3::new(screen.x - half_w, screen.y + half_h, 0.0),
        ];
        let texcoords = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        let indices = [0u32, 1, 2, 2, 3, 0];

        pipeline.set_color(label.color);
        pipeline.bind_texture(label.texture);
        pipeline.draw_indexed(Topology::Triangles, &positions, &[], &texcoords, &indices);
    }
}

/// Projection matrix matching what the backend derives from the same
/// parameters; used only for label screen projection
fn projection_matrix(projection: &Projection, aspect: f32) -> Mat4 {
    match *projection {
        Projection::Perspective { fov_y, near, far } => {
            Mat4::new_perspective(aspect, fov_y, near, far)
        }
        Projection::Orthographic { scale, near, far } => {
            Mat4::new_orthographic(-scale * aspect, scale * aspect, -scale, scale, near, far)
        }
    }
}

/// Project a world-space point to viewport pixel coordinates
///
/// Returns `None` for points behind the camera.
fn project_to_screen(
    view_projection: &Mat4,
    position: Point3,
    width: u32,
    height: u32,
) -> Option<Vec2> {
    let clip = view_projection * position.to_homogeneous();
    if clip.w <= 0.0 {
        return None;
    }
    let ndc_x = clip.x / clip.w;
    let ndc_y = clip.y / clip.w;
    Some(Vec2::new(
        (ndc_x * 0.5 + 0.5) * width as f32,
        (ndc_y * 0.5 + 0.5) * height as f32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_center_point_lands_mid_viewport() {
        let projection = Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 100.0,
        };
        let vp = projection_matrix(&projection, 1.0);
        // A point straight ahead of an origin camera looking down -Z
        let screen = project_to_screen(&vp, Point3::new(0.0, 0.0, -10.0), 800, 600)
            .expect("point ahead of camera must project");
        assert_relative_eq!(screen.x, 400.0, epsilon = 0.5);
        assert_relative_eq!(screen.y, 300.0, epsilon = 0.5);
    }

    #[test]
    fn test_project_rejects_points_behind_camera() {
        let projection = Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 100.0,
        };
        let vp = projection_matrix(&projection, 1.0);
        assert!(project_to_screen(&vp, Point3::new(0.0, 0.0, 10.0), 800, 600).is_none());
    }
}

//! # Orrery
//!
//! A thread-safe retained-mode 3D scene graph engine.
//!
//! ## Features
//!
//! - **Hierarchical scene model**: assemblies, parts, lamps, figures and
//!   labels organized into one or more independently rendered worlds
//! - **Writer/reader decoupling**: every render-relevant property is
//!   double-buffered so mutator threads and the render thread never
//!   observe each other's partial state
//! - **Non-blocking rendering**: the render thread try-locks the scene;
//!   if a mutation is in flight it redraws the previous committed frame
//! - **Shared resources**: meshes and textures are cached by name and
//!   shared between parts without duplication
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orrery::prelude::*;
//!
//! fn main() -> Result<(), UniverseError> {
//!     let (universe, mut renderer) = Universe::new(UniverseConfig::default());
//!
//!     let world = universe.add_world("main", 0, 0, 800, 600)?;
//!     let lamp = universe.add_lamp("sun", world, LampKind::Celestial)?;
//!     let root = universe.add_assembly("chassis", world, None)?;
//!
//!     // On the render thread, once per display refresh:
//!     let mut pipeline = RecordingPipeline::new();
//!     renderer.render_initialize(&mut pipeline);
//!     renderer.render_frame(&mut pipeline, 800, 600);
//!
//!     let _ = (lamp, root);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod elements;
pub mod foundation;
pub mod render;

mod error;
mod registry;
mod universe;
mod versioned;

pub use error::{UniverseError, UniverseResult};
pub use universe::Universe;
pub use versioned::Versioned;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{MeshSource, TextureSource},
        config::{Config, UniverseConfig},
        elements::{
            ElementId, FigureKey, FigureMode, LampKey, LampKind, LabelKey, MaterialKey,
            MaterialParams, ProductKey, ProductKind, Projection, Viewport, WorldKey,
        },
        foundation::math::{Color, Mat4, Transform, Vec2, Vec3, Vec4},
        render::{BackendInfo, Pipeline, RecordingPipeline, Renderer},
        Universe, UniverseError, UniverseResult,
    };
}

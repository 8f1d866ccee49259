//! Render-side half of the engine: pipeline seam, frame snapshot, renderer

pub mod pipeline;
pub mod renderer;

pub(crate) mod snapshot;

pub use pipeline::{
    BackendInfo, LampState, MaterialState, Pipeline, PipelineCall, RecordingPipeline,
    TextureHandle, Topology,
};
pub use renderer::Renderer;

//! Renderer crate for wayshaders, a layered GLSL compositor.
//!
//! A directory of `shader<n>.frag` (plus optional `shader<n>.vert`) files becomes an
//! ordered stack of layers. Layers that sample themselves keep a pair of offscreen
//! targets and accumulate into them every frame; every enabled layer is then blended
//! onto the window in ascending order.
//!
//! ```text
//!   discover_sources ──▶ LayerRegistry::build ──▶ FrameExecutor::run_frame
//!          │                 │ compile / lookup / link     │ plan_frame
//!          │                 │ allocate target pairs       ▼
//!          └── RendererConfig┘                    LayerBackend::submit_frame
//! ```
//!
//! The registry and executor are generic over [`LayerBackend`]; [`gpu::WgpuBackend`]
//! is the `wgpu` implementation used by [`Renderer::run`].

mod backend;
mod compile;
mod discovery;
mod executor;
pub mod gpu;
mod interface;
mod layer;
mod registry;
mod runtime;
mod types;
mod window;

use anyhow::Result;

pub use backend::{BackendLayer, FrameError, LayerBackend, ProgramLayout, TargetError, TargetSpec};
pub use compile::{
    check_stage, wrap_program, ProgramError, ProgramSource, StageKind, WrappedProgram,
    DEFAULT_VERTEX_BODY,
};
pub use discovery::{discover_sources, fragment_file_name, vertex_file_name, LayerSource};
pub use executor::{
    plan_frame, AccumulatePass, ChannelInput, ChannelSource, CompositeDraw, FrameExecutor,
    FramePlan, TargetRef,
};
pub use interface::{
    channel_uniform_name, parse_channel_name, FrameType, ShaderInterface, FRAME_UNIFORM,
    RESOLUTION_UNIFORM, TIME_UNIFORM,
};
pub use layer::{
    ChannelSet, FrameUniforms, Layer, TargetPair, UniformLocation, UniformLocations,
    UniformWrites,
};
pub use registry::{LayerRegistry, RegistryError};
pub use runtime::{BoxedTimeSource, FixedTimeSource, FramePacer, SystemTimeSource, TimeSource};
pub use types::{
    LayerOptions, RendererConfig, SurfaceAlpha, SurfaceSize, WrapMode, WrapModes,
};

/// Entry point for the window renderer.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Blocks until the window is closed or rendering fails.
    pub fn run(&mut self) -> Result<()> {
        window::run(&self.config)
    }
}

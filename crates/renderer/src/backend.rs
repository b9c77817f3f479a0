//! Seam between the backend-independent layer logic and a concrete GPU API.

use crate::compile::{ProgramError, ProgramSource};
use crate::executor::FramePlan;
use crate::layer::{ChannelSet, Layer, UniformLocation};
use crate::types::{SurfaceSize, WrapModes};

/// What a program's channel bindings look like once probing is done.
#[derive(Debug, Clone, Copy)]
pub struct ProgramLayout<'a> {
    pub layer: usize,
    pub channels: &'a ChannelSet,
    /// True when the program renders into offscreen targets rather than the surface.
    pub feedback: bool,
}

/// Storage request for one slot of a layer's target pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    pub layer: usize,
    pub slot: usize,
    pub size: SurfaceSize,
    pub wrap: WrapModes,
}

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("layer {layer} target {slot}: {size} exceeds the device limit of {limit}px")]
    TooLarge {
        layer: usize,
        slot: usize,
        size: SurfaceSize,
        limit: u32,
    },
    #[error("layer {layer} target {slot} is incomplete: {reason}")]
    Incomplete {
        layer: usize,
        slot: usize,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("surface lost or outdated")]
    SurfaceLost,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("out of memory while acquiring the next surface texture")]
    OutOfMemory,
    #[error("surface error: {0}")]
    Surface(String),
    #[error(transparent)]
    Resize(#[from] TargetError),
}

pub type BackendLayer<B> = Layer<<B as LayerBackend>::Program, <B as LayerBackend>::Target>;

/// GPU operations the registry and executor need.
pub trait LayerBackend {
    type Program;
    type Target;

    fn compile_program(&mut self, source: &ProgramSource<'_>)
        -> Result<Self::Program, ProgramError>;

    /// Resolves a uniform by name. `None` means the program does not use it.
    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<UniformLocation>;

    /// Fixes channel `c` to texture unit `c` and finalises the program.
    fn link_program(
        &mut self,
        program: &mut Self::Program,
        layout: &ProgramLayout<'_>,
    ) -> Result<(), ProgramError>;

    fn create_target(&mut self, spec: &TargetSpec) -> Result<Self::Target, TargetError>;

    /// Completeness check; failures are diagnostics, not fatal.
    fn check_target(&self, target: &Self::Target) -> Result<(), TargetError>;

    /// Recreates the storage behind an existing target at `spec.size`.
    fn resize_target(
        &mut self,
        target: &mut Self::Target,
        spec: &TargetSpec,
    ) -> Result<(), TargetError>;

    fn resize_surface(&mut self, size: SurfaceSize);

    /// Encodes and presents one frame. Backend validation errors are logged, not returned.
    fn submit_frame(
        &mut self,
        layers: &[Layer<Self::Program, Self::Target>],
        plan: &FramePlan,
    ) -> Result<(), FrameError>;
}

//! `wgpu` implementation of the layer backend.
//!
//! - `context` owns instance/device/surface wiring and rebuilds swapchain state on
//!   resize.
//! - `targets` allocates the double-buffered offscreen textures and their samplers,
//!   plus the transparent placeholder used for reads of target-less layers.
//! - `pipeline` builds layer pipelines (offscreen or surface-blended) and the shared
//!   blit used to composite feedback layers.
//! - `uniforms` mirrors the std140 block injected by the program compiler.
//! - `backend` glues everything together behind `LayerBackend`.

mod backend;
mod context;
mod pipeline;
mod targets;
mod uniforms;

pub use backend::{WgpuBackend, WgpuProgram};
pub use targets::WgpuTarget;

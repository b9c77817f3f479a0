use bytemuck::{Pod, Zeroable};

use crate::interface::{FRAME_UNIFORM, RESOLUTION_UNIFORM, TIME_UNIFORM};
use crate::layer::{FrameUniforms, UniformWrites};

/// CPU mirror of the `WayshadersLayer` std140 block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct LayerUniformBlock {
    pub resolution: [f32; 2],
    pub time: f32,
    pub frame: f32,
}

impl LayerUniformBlock {
    /// Time and frame stay zero unless declared. Resolution is always written: the
    /// wrapped fragment stage flips `gl_FragCoord` with it.
    pub fn from_writes(writes: &UniformWrites, frame: &FrameUniforms) -> Self {
        Self {
            resolution: frame.resolution.as_vec2(),
            time: writes.time.unwrap_or_default(),
            frame: writes.frame.unwrap_or_default(),
        }
    }

    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// Byte offset of a standard uniform inside the block.
pub(crate) fn block_offset(name: &str) -> Option<u32> {
    match name {
        RESOLUTION_UNIFORM => Some(0),
        TIME_UNIFORM => Some(8),
        FRAME_UNIFORM => Some(12),
        _ => None,
    }
}

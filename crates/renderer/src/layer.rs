//! Per-layer state: the program, what it reads, and its feedback targets.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::types::{SurfaceSize, WrapModes};

/// Backend-specific handle for a resolved uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Locations of the standard uniforms; each may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniformLocations {
    pub resolution: Option<UniformLocation>,
    pub time: Option<UniformLocation>,
    pub frame: Option<UniformLocation>,
}

impl UniformLocations {
    /// Values to upload this frame; uniforms the program lacks are skipped.
    pub fn writes(&self, frame: &FrameUniforms) -> UniformWrites {
        UniformWrites {
            resolution: self.resolution.map(|_| frame.resolution.as_vec2()),
            time: self.time.map(|_| frame.time),
            frame: self.frame.map(|_| frame.frame as f32),
        }
    }
}

/// Uniform values shared by every layer within one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub resolution: SurfaceSize,
    pub time: f32,
    pub frame: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UniformWrites {
    pub resolution: Option<[f32; 2]>,
    pub time: Option<f32>,
    pub frame: Option<f32>,
}

/// Channels a layer samples, bounded above by the layer's own index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    owner: usize,
    channels: BTreeSet<usize>,
}

impl ChannelSet {
    pub fn new(owner: usize) -> Self {
        Self {
            owner,
            channels: BTreeSet::new(),
        }
    }

    /// Records `channel`. Channels above the owner are refused.
    pub fn insert(&mut self, channel: usize) -> bool {
        if channel > self.owner {
            return false;
        }
        self.channels.insert(channel)
    }

    pub fn owner(&self) -> usize {
        self.owner
    }

    pub fn contains(&self, channel: usize) -> bool {
        self.channels.contains(&channel)
    }

    /// Ascending, which is also texture-unit order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.channels.iter().copied()
    }

    /// Channels that read other (lower) layers.
    pub fn cross_layer(&self) -> impl Iterator<Item = usize> + '_ {
        self.iter().filter(move |&c| c != self.owner)
    }

    pub fn has_feedback(&self) -> bool {
        self.contains(self.owner)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Double-buffered render targets. The front holds the last completed output, the
/// back receives the next one.
#[derive(Debug)]
pub struct TargetPair<T> {
    targets: [T; 2],
    active: usize,
}

impl<T> TargetPair<T> {
    pub fn new(first: T, second: T) -> Self {
        Self {
            targets: [first, second],
            active: 0,
        }
    }

    pub fn front_slot(&self) -> usize {
        self.active
    }

    pub fn back_slot(&self) -> usize {
        1 - self.active
    }

    pub fn front(&self) -> &T {
        &self.targets[self.active]
    }

    pub fn back(&self) -> &T {
        &self.targets[self.back_slot()]
    }

    pub fn get(&self, slot: usize) -> Option<&T> {
        self.targets.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.targets.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.targets.iter_mut().enumerate()
    }

    /// Promotes the freshly written back target to front.
    pub fn flip(&mut self) {
        self.active = self.back_slot();
    }
}

/// One shader's runtime unit at a fixed stack position.
#[derive(Debug)]
pub struct Layer<P, T> {
    pub(crate) index: usize,
    pub(crate) source_path: PathBuf,
    pub(crate) program: P,
    pub(crate) uniforms: UniformLocations,
    pub(crate) channels: ChannelSet,
    pub(crate) targets: Option<TargetPair<T>>,
    pub(crate) enabled: bool,
    pub(crate) wrap: WrapModes,
}

impl<P, T> Layer<P, T> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn program(&self) -> &P {
        &self.program
    }

    pub fn uniforms(&self) -> &UniformLocations {
        &self.uniforms
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// True iff the layer samples its own previous output.
    pub fn feedback_enabled(&self) -> bool {
        self.channels.has_feedback()
    }

    pub fn targets(&self) -> Option<&TargetPair<T>> {
        self.targets.as_ref()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn wrap(&self) -> WrapModes {
        self.wrap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_set_refuses_channels_above_owner() {
        let mut channels = ChannelSet::new(1);
        assert!(channels.insert(0));
        assert!(channels.insert(1));
        assert!(!channels.insert(2));
        assert!(!channels.insert(0));
        assert_eq!(channels.iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(channels.cross_layer().collect::<Vec<_>>(), vec![0]);
        assert!(channels.has_feedback());
    }

    #[test]
    fn flip_twice_restores_front() {
        let mut pair = TargetPair::new("a", "b");
        assert_eq!(*pair.front(), "a");
        assert_eq!(*pair.back(), "b");
        pair.flip();
        assert_eq!(*pair.front(), "b");
        assert_eq!(pair.back_slot(), 0);
        pair.flip();
        assert_eq!(*pair.front(), "a");
        assert_eq!(pair.front_slot(), 0);
    }

    #[test]
    fn absent_uniforms_are_skipped() {
        let locations = UniformLocations {
            resolution: Some(UniformLocation(0)),
            time: None,
            frame: Some(UniformLocation(3)),
        };
        let writes = locations.writes(&FrameUniforms {
            resolution: SurfaceSize::new(800, 600),
            time: 1.5,
            frame: 42,
        });
        assert_eq!(writes.resolution, Some([800.0, 600.0]));
        assert_eq!(writes.time, None);
        assert_eq!(writes.frame, Some(42.0));
    }
}

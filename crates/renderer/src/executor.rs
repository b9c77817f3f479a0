//! Per-frame scheduling: the accumulate phase followed by the composite phase.
//!
//! ```text
//!   pending resize ─▶ accumulate (feedback layers, ascending) ─▶ composite (all enabled)
//!                         │ write back, read fronts, flip              │ blend onto surface
//!                         ▼                                            ▼
//!                      FramePlan ──────────────▶ LayerBackend::submit_frame ─▶ present
//! ```
//!
//! Planning is pure bookkeeping over the layer stack; flips happen while planning so
//! every recorded slot is absolute. The backend only encodes what the plan says.

use crate::backend::{FrameError, LayerBackend};
use crate::layer::{FrameUniforms, Layer};
use crate::registry::LayerRegistry;
use crate::runtime::BoxedTimeSource;
use crate::types::SurfaceSize;

/// One slot of a layer's target pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetRef {
    pub layer: usize,
    pub slot: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSource {
    Target(TargetRef),
    /// The sampled layer has no targets; bind a transparent texture instead.
    Placeholder,
}

/// Texture unit `unit` (== channel index) and what it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInput {
    pub unit: usize,
    pub source: ChannelSource,
}

/// Renders one feedback layer into its back target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatePass {
    pub layer: usize,
    pub destination: TargetRef,
    pub inputs: Vec<ChannelInput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeDraw {
    /// Blit a feedback layer's current front texture.
    Texture { layer: usize, source: TargetRef },
    /// Run a non-feedback layer's program directly onto the surface.
    Procedural {
        layer: usize,
        inputs: Vec<ChannelInput>,
    },
}

impl CompositeDraw {
    pub fn layer(&self) -> usize {
        match self {
            Self::Texture { layer, .. } | Self::Procedural { layer, .. } => *layer,
        }
    }
}

/// Everything the backend must encode for one frame, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub size: SurfaceSize,
    pub uniforms: FrameUniforms,
    pub accumulate: Vec<AccumulatePass>,
    pub composite: Vec<CompositeDraw>,
}

/// Builds the plan for one frame and advances every accumulated layer's front.
pub fn plan_frame<P, T>(layers: &mut [Layer<P, T>], uniforms: FrameUniforms) -> FramePlan {
    let mut accumulate = Vec::new();
    for index in 0..layers.len() {
        let layer = &layers[index];
        if !layer.enabled() {
            continue;
        }
        let Some(targets) = layer.targets() else {
            continue;
        };
        let destination = TargetRef {
            layer: index,
            slot: targets.back_slot(),
        };
        let inputs = resolve_inputs(layers, index);
        accumulate.push(AccumulatePass {
            layer: index,
            destination,
            inputs,
        });
        if let Some(targets) = layers[index].targets.as_mut() {
            targets.flip();
        }
    }

    let layers: &[Layer<P, T>] = layers;
    let composite = layers
        .iter()
        .filter(|layer| layer.enabled())
        .map(|layer| match layer.targets() {
            Some(targets) => CompositeDraw::Texture {
                layer: layer.index(),
                source: TargetRef {
                    layer: layer.index(),
                    slot: targets.front_slot(),
                },
            },
            None => CompositeDraw::Procedural {
                layer: layer.index(),
                inputs: resolve_inputs(layers, layer.index()),
            },
        })
        .collect();

    FramePlan {
        size: uniforms.resolution,
        uniforms,
        accumulate,
        composite,
    }
}

/// Maps each declared channel to the current front of the layer it names.
fn resolve_inputs<P, T>(layers: &[Layer<P, T>], index: usize) -> Vec<ChannelInput> {
    layers[index]
        .channels()
        .iter()
        .map(|channel| {
            let source = layers
                .get(channel)
                .and_then(Layer::targets)
                .map(|targets| {
                    ChannelSource::Target(TargetRef {
                        layer: channel,
                        slot: targets.front_slot(),
                    })
                })
                .unwrap_or(ChannelSource::Placeholder);
            ChannelInput {
                unit: channel,
                source,
            }
        })
        .collect()
}

/// Drives frames: applies pending resizes, plans, submits, counts presented frames.
pub struct FrameExecutor {
    time: BoxedTimeSource,
    frames_presented: u64,
}

impl FrameExecutor {
    pub fn new(mut time: BoxedTimeSource) -> Self {
        time.reset();
        Self {
            time,
            frames_presented: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Runs one frame to completion. `u_frame` only advances when presentation succeeds.
    pub fn run_frame<B: LayerBackend>(
        &mut self,
        registry: &mut LayerRegistry<B>,
        backend: &mut B,
    ) -> Result<FramePlan, FrameError> {
        registry.apply_pending_resize(backend)?;

        let uniforms = FrameUniforms {
            resolution: registry.size(),
            time: self.time.seconds(),
            frame: self.frames_presented,
        };
        let plan = plan_frame(registry.layers_mut(), uniforms);
        backend.submit_frame(registry.layers(), &plan)?;
        self.frames_presented += 1;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::layer::{ChannelSet, TargetPair, UniformLocations};
    use crate::types::WrapModes;

    fn layer(index: usize, channels: &[usize], enabled: bool) -> Layer<(), &'static str> {
        let mut set = ChannelSet::new(index);
        for &channel in channels {
            set.insert(channel);
        }
        let targets = set.has_feedback().then(|| TargetPair::new("a", "b"));
        Layer {
            index,
            source_path: PathBuf::from(format!("shader{index}.frag")),
            program: (),
            uniforms: UniformLocations::default(),
            channels: set,
            targets,
            enabled,
            wrap: WrapModes::default(),
        }
    }

    fn uniforms() -> FrameUniforms {
        FrameUniforms {
            resolution: SurfaceSize::new(800, 600),
            time: 0.0,
            frame: 0,
        }
    }

    #[test]
    fn cross_reads_see_the_fresh_front() {
        let mut layers = vec![layer(0, &[0], true), layer(1, &[0, 1], true)];
        let plan = plan_frame(&mut layers, uniforms());

        assert_eq!(plan.accumulate.len(), 2);
        assert_eq!(plan.accumulate[0].destination, TargetRef { layer: 0, slot: 1 });
        assert_eq!(
            plan.accumulate[1].inputs,
            vec![
                ChannelInput {
                    unit: 0,
                    source: ChannelSource::Target(TargetRef { layer: 0, slot: 1 }),
                },
                ChannelInput {
                    unit: 1,
                    source: ChannelSource::Target(TargetRef { layer: 1, slot: 0 }),
                },
            ]
        );
        assert_eq!(
            plan.composite,
            vec![
                CompositeDraw::Texture {
                    layer: 0,
                    source: TargetRef { layer: 0, slot: 1 },
                },
                CompositeDraw::Texture {
                    layer: 1,
                    source: TargetRef { layer: 1, slot: 1 },
                },
            ]
        );
    }

    #[test]
    fn disabled_layers_skip_both_phases() {
        let mut layers = vec![layer(0, &[0], false), layer(1, &[0], true)];
        let plan = plan_frame(&mut layers, uniforms());
        assert!(plan.accumulate.is_empty());
        assert_eq!(plan.composite.len(), 1);
        assert_eq!(plan.composite[0].layer(), 1);
        assert_eq!(layers[0].targets().map(TargetPair::front_slot), Some(0));
        // Layer 1 keeps reading layer 0's frozen front.
        assert_eq!(
            plan.composite[0],
            CompositeDraw::Procedural {
                layer: 1,
                inputs: vec![ChannelInput {
                    unit: 0,
                    source: ChannelSource::Target(TargetRef { layer: 0, slot: 0 }),
                }],
            }
        );
    }

    #[test]
    fn reads_of_procedural_layers_use_placeholder() {
        let mut layers = vec![layer(0, &[], true), layer(1, &[0, 1], true)];
        let plan = plan_frame(&mut layers, uniforms());
        assert_eq!(plan.accumulate.len(), 1);
        assert_eq!(plan.accumulate[0].inputs[0].source, ChannelSource::Placeholder);
        assert!(matches!(plan.composite[0], CompositeDraw::Procedural { layer: 0, .. }));
    }
}

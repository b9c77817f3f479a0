use crate::backend::{BackendLayer, LayerBackend, ProgramLayout, TargetError, TargetSpec};
use crate::compile::{ProgramError, ProgramSource};
use crate::discovery::{fragment_file_name, LayerSource};
use crate::interface::{channel_uniform_name, FRAME_UNIFORM, RESOLUTION_UNIFORM, TIME_UNIFORM};
use crate::layer::{ChannelSet, Layer, TargetPair, UniformLocations};
use crate::types::{LayerOptions, SurfaceSize};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no shaders found; expected at least {first}")]
    Empty { first: String },
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Ordered layer stack plus the drawable size its targets are allocated at.
///
/// Built once at start-up; afterwards only resize and the per-layer `enabled` flag
/// change. Layer count, programs and channel bindings are fixed for its lifetime.
pub struct LayerRegistry<B: LayerBackend> {
    layers: Vec<BackendLayer<B>>,
    size: SurfaceSize,
    pending_resize: Option<SurfaceSize>,
}

impl<B: LayerBackend> LayerRegistry<B> {
    /// Compiles, inspects and links every layer, then allocates feedback targets.
    ///
    /// `options` is indexed by layer; missing entries fall back to defaults.
    pub fn build(
        backend: &mut B,
        sources: &[LayerSource],
        options: &[LayerOptions],
        size: SurfaceSize,
    ) -> Result<Self, RegistryError> {
        if sources.is_empty() {
            return Err(RegistryError::Empty {
                first: fragment_file_name(0),
            });
        }

        let mut layers = Vec::with_capacity(sources.len());
        for source in sources {
            let layer_options = options.get(source.index).copied().unwrap_or_default();
            layers.push(load_layer(backend, source, layer_options)?);
        }

        let mut registry = Self {
            layers,
            size: SurfaceSize::new(size.width.max(1), size.height.max(1)),
            pending_resize: None,
        };
        registry.allocate_targets(backend)?;
        registry.report_placeholder_reads();

        tracing::info!(
            layers = registry.layers.len(),
            feedback = registry.feedback_count(),
            size = %registry.size,
            "layer registry ready"
        );
        Ok(registry)
    }

    pub fn layers(&self) -> &[BackendLayer<B>] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [BackendLayer<B>] {
        &mut self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&BackendLayer<B>> {
        self.layers.get(index)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false once built; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn feedback_count(&self) -> usize {
        self.layers.iter().filter(|l| l.feedback_enabled()).count()
    }

    /// Toggles compositing for a layer. Returns false for unknown indices.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> bool {
        match self.layers.get_mut(index) {
            Some(layer) => {
                layer.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Records a drawable size change to apply before the next frame.
    pub fn request_resize(&mut self, size: SurfaceSize) {
        if size.is_empty() {
            tracing::debug!(%size, "ignoring resize to an empty surface");
            return;
        }
        self.pending_resize = Some(size);
    }

    pub fn pending_resize(&self) -> Option<SurfaceSize> {
        self.pending_resize
    }

    /// Applies the latest requested resize, if any. Returns whether one was applied.
    pub fn apply_pending_resize(&mut self, backend: &mut B) -> Result<bool, TargetError> {
        match self.pending_resize.take() {
            Some(size) => {
                self.resize(backend, size)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reallocates every feedback target at `size`, keeping each pair's front slot.
    pub fn resize(&mut self, backend: &mut B, size: SurfaceSize) -> Result<(), TargetError> {
        if size.is_empty() {
            tracing::debug!(%size, "ignoring resize to an empty surface");
            return Ok(());
        }

        backend.resize_surface(size);
        for layer in &mut self.layers {
            let index = layer.index;
            let wrap = layer.wrap;
            let Some(targets) = layer.targets.as_mut() else {
                continue;
            };
            for (slot, target) in targets.iter_mut() {
                let spec = TargetSpec {
                    layer: index,
                    slot,
                    size,
                    wrap,
                };
                backend.resize_target(target, &spec)?;
                if let Err(err) = backend.check_target(target) {
                    tracing::warn!(layer = index, slot, "{err}");
                }
            }
        }

        if size != self.size {
            tracing::debug!(from = %self.size, to = %size, "resized layer targets");
        }
        self.size = size;
        Ok(())
    }

    fn allocate_targets(&mut self, backend: &mut B) -> Result<(), TargetError> {
        let size = self.size;
        for layer in self.layers.iter_mut().filter(|l| l.feedback_enabled()) {
            let spec = |slot| TargetSpec {
                layer: layer.index,
                slot,
                size,
                wrap: layer.wrap,
            };
            let first = backend.create_target(&spec(0))?;
            let second = backend.create_target(&spec(1))?;
            for (slot, target) in [&first, &second].into_iter().enumerate() {
                if let Err(err) = backend.check_target(target) {
                    tracing::warn!(layer = layer.index, slot, "{err}");
                }
            }
            layer.targets = Some(TargetPair::new(first, second));
            tracing::debug!(layer = layer.index, %size, "allocated feedback targets");
        }
        Ok(())
    }

    /// Cross reads of layers without targets sample a transparent placeholder.
    fn report_placeholder_reads(&self) {
        for layer in &self.layers {
            for channel in layer.channels.cross_layer() {
                let has_targets = self
                    .layers
                    .get(channel)
                    .is_some_and(|source| source.targets.is_some());
                if !has_targets {
                    tracing::warn!(
                        layer = layer.index,
                        channel,
                        "u_sampler{channel} reads a layer without feedback; it will sample as transparent"
                    );
                }
            }
        }
    }
}

fn load_layer<B: LayerBackend>(
    backend: &mut B,
    source: &LayerSource,
    options: LayerOptions,
) -> Result<BackendLayer<B>, ProgramError> {
    let index = source.index;
    let mut program = backend.compile_program(&ProgramSource::from_layer(source))?;

    let uniforms = UniformLocations {
        resolution: backend.uniform_location(&program, RESOLUTION_UNIFORM),
        time: backend.uniform_location(&program, TIME_UNIFORM),
        frame: backend.uniform_location(&program, FRAME_UNIFORM),
    };

    // Probing stops at the layer's own index: nothing above it has been drawn yet.
    let mut channels = ChannelSet::new(index);
    for channel in 0..=index {
        if backend
            .uniform_location(&program, &channel_uniform_name(channel))
            .is_some()
        {
            channels.insert(channel);
        }
    }

    let feedback = channels.has_feedback();
    backend.link_program(
        &mut program,
        &ProgramLayout {
            layer: index,
            channels: &channels,
            feedback,
        },
    )?;

    tracing::debug!(
        layer = index,
        path = %source.fragment_path.display(),
        channels = ?channels.iter().collect::<Vec<_>>(),
        feedback,
        enabled = options.enabled,
        "layer ready"
    );

    Ok(Layer {
        index,
        source_path: source.fragment_path.clone(),
        program,
        uniforms,
        channels,
        targets: None,
        enabled: options.enabled,
        wrap: options.wrap,
    })
}

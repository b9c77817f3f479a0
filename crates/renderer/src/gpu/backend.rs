use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::{FrameError, LayerBackend, ProgramLayout, TargetError, TargetSpec};
use crate::compile::{check_stage, wrap_program, ProgramError, ProgramSource, StageKind};
use crate::executor::{AccumulatePass, ChannelInput, ChannelSource, CompositeDraw, FramePlan, TargetRef};
use crate::interface::{parse_channel_name, ShaderInterface};
use crate::layer::{Layer, UniformLocation};
use crate::types::{SurfaceAlpha, SurfaceSize};

use super::context::GpuContext;
use super::pipeline::{
    build_channel_layout_entries, create_glsl_module, create_render_pipeline,
    create_uniform_layout, BlitPipeline, PipelineTarget, QUAD_VERTEX_COUNT,
};
use super::targets::{Placeholder, WgpuTarget, TARGET_FORMAT};
use super::uniforms::{block_offset, LayerUniformBlock};

type GpuLayer = Layer<WgpuProgram, WgpuTarget>;

/// Compiled shader modules for one layer, plus its pipeline once linked.
pub struct WgpuProgram {
    layer: usize,
    interface: ShaderInterface,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    linked: Option<LinkedProgram>,
}

struct LinkedProgram {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    channel_layout: Option<wgpu::BindGroupLayout>,
}

impl WgpuProgram {
    pub fn interface(&self) -> &ShaderInterface {
        &self.interface
    }

    pub fn is_linked(&self) -> bool {
        self.linked.is_some()
    }
}

/// Owns the device and the resources shared by every layer.
pub struct WgpuBackend {
    context: GpuContext,
    uniform_layout: wgpu::BindGroupLayout,
    blit: BlitPipeline,
    placeholder: Placeholder,
}

impl WgpuBackend {
    pub fn new<T>(target: &T, size: SurfaceSize, alpha: SurfaceAlpha) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size, alpha)?;
        let uniform_layout = create_uniform_layout(&context.device);
        let blit = BlitPipeline::new(&context.device, context.surface_format);
        let placeholder = Placeholder::new(&context.device, &context.queue);
        Ok(Self {
            context,
            uniform_layout,
            blit,
            placeholder,
        })
    }

    pub fn surface_size(&self) -> SurfaceSize {
        self.context.size
    }

    /// Reconfigures the swapchain after `FrameError::SurfaceLost`.
    pub fn reconfigure_surface(&mut self) {
        self.context.reconfigure();
    }

    fn create_module(
        &self,
        layer: usize,
        stage: StageKind,
        source: String,
    ) -> Result<wgpu::ShaderModule, ProgramError> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = create_glsl_module(
            device,
            &format!("layer {layer} {stage}"),
            stage.naga_stage(),
            source,
        );
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(ProgramError::Compile {
                layer,
                stage,
                log: err.to_string(),
            }),
            None => Ok(module),
        }
    }

    fn write_uniforms(&self, layers: &[GpuLayer], plan: &FramePlan) {
        for layer in layers.iter().filter(|layer| layer.enabled()) {
            let Some(linked) = layer.program().linked.as_ref() else {
                continue;
            };
            let block = LayerUniformBlock::from_writes(
                &layer.uniforms().writes(&plan.uniforms),
                &plan.uniforms,
            );
            self.context
                .queue
                .write_buffer(&linked.uniform_buffer, 0, bytemuck::bytes_of(&block));
        }
    }

    fn resolve_target<'a>(layers: &'a [GpuLayer], target: TargetRef) -> Option<&'a WgpuTarget> {
        layers
            .get(target.layer)
            .and_then(Layer::targets)
            .and_then(|pair| pair.get(target.slot))
    }

    fn channel_bind_group(
        &self,
        layers: &[GpuLayer],
        linked: &LinkedProgram,
        layer: usize,
        inputs: &[ChannelInput],
    ) -> Option<wgpu::BindGroup> {
        let layout = linked.channel_layout.as_ref()?;
        let mut entries = Vec::with_capacity(inputs.len() * 2);
        for input in inputs {
            let target = match input.source {
                ChannelSource::Target(target) => Self::resolve_target(layers, target),
                ChannelSource::Placeholder => None,
            };
            let (view, sampler) = match target {
                Some(target) => (target.view(), target.sampler()),
                None => (&self.placeholder.view, &self.placeholder.sampler),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: (input.unit as u32) * 2,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: (input.unit as u32) * 2 + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        Some(
            self.context
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("layer {layer} channels")),
                    layout,
                    entries: &entries,
                }),
        )
    }

    fn encode_accumulate(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        layers: &[GpuLayer],
        pass: &AccumulatePass,
    ) {
        let Some(layer) = layers.get(pass.layer) else {
            return;
        };
        let Some(linked) = layer.program().linked.as_ref() else {
            tracing::warn!(layer = pass.layer, "skipping accumulate for unlinked program");
            return;
        };
        let Some(destination) = Self::resolve_target(layers, pass.destination) else {
            tracing::warn!(layer = pass.layer, "accumulate destination missing");
            return;
        };
        let channels = self.channel_bind_group(layers, linked, pass.layer, &pass.inputs);

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("accumulate pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: destination.view(),
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&linked.pipeline);
        render_pass.set_bind_group(0, &linked.uniform_bind_group, &[]);
        if let Some(channels) = channels.as_ref() {
            render_pass.set_bind_group(1, channels, &[]);
        }
        render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
    }

    fn encode_composite(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        layers: &[GpuLayer],
        plan: &FramePlan,
    ) {
        let device = &self.context.device;
        let mut draws = Vec::with_capacity(plan.composite.len());
        for draw in &plan.composite {
            match draw {
                CompositeDraw::Texture { layer, source } => {
                    let Some(target) = Self::resolve_target(layers, *source) else {
                        tracing::warn!(layer = *layer, "composite source missing");
                        continue;
                    };
                    let bind_group = self.blit.bind_group(device, target.view(), target.sampler());
                    draws.push((&self.blit.pipeline, None, Some(bind_group)));
                }
                CompositeDraw::Procedural { layer, inputs } => {
                    let Some(linked) = layers
                        .get(*layer)
                        .and_then(|layer| layer.program().linked.as_ref())
                    else {
                        tracing::warn!(layer = *layer, "skipping composite for unlinked program");
                        continue;
                    };
                    let channels = self.channel_bind_group(layers, linked, *layer, inputs);
                    draws.push((&linked.pipeline, Some(&linked.uniform_bind_group), channels));
                }
            }
        }

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("composite pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        for (pipeline, uniforms, channels) in &draws {
            render_pass.set_pipeline(pipeline);
            match (uniforms, channels) {
                // Layer programs: uniforms at 0, channels at 1.
                (Some(uniforms), channels) => {
                    render_pass.set_bind_group(0, *uniforms, &[]);
                    if let Some(channels) = channels {
                        render_pass.set_bind_group(1, channels, &[]);
                    }
                }
                // Blit: its texture is group 0.
                (None, Some(texture)) => render_pass.set_bind_group(0, texture, &[]),
                (None, None) => continue,
            }
            render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        }
    }

    /// Each error was already logged by the device's uncaptured error handler.
    fn report_frame_errors(&self) {
        let count = self.context.errors.take();
        if count > 0 {
            tracing::warn!(count, "frame raised GPU errors");
        }
    }
}

fn map_surface_error(err: wgpu::SurfaceError) -> FrameError {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => FrameError::SurfaceLost,
        wgpu::SurfaceError::Timeout => FrameError::Timeout,
        wgpu::SurfaceError::OutOfMemory => FrameError::OutOfMemory,
        other => FrameError::Surface(other.to_string()),
    }
}

impl LayerBackend for WgpuBackend {
    type Program = WgpuProgram;
    type Target = WgpuTarget;

    fn compile_program(&mut self, source: &ProgramSource<'_>) -> Result<WgpuProgram, ProgramError> {
        let layer = source.layer;
        let wrapped = wrap_program(source);
        check_stage(layer, StageKind::Vertex, &wrapped.vertex)?;
        check_stage(layer, StageKind::Fragment, &wrapped.fragment)?;

        let vertex = self.create_module(layer, StageKind::Vertex, wrapped.vertex)?;
        let fragment = self.create_module(layer, StageKind::Fragment, wrapped.fragment)?;
        Ok(WgpuProgram {
            layer,
            interface: wrapped.interface,
            vertex,
            fragment,
            linked: None,
        })
    }

    fn uniform_location(&self, program: &WgpuProgram, name: &str) -> Option<UniformLocation> {
        if !program.interface.declares(name) {
            return None;
        }
        block_offset(name)
            .or_else(|| parse_channel_name(name).map(|channel| (channel as u32) * 2))
            .map(UniformLocation)
    }

    fn link_program(
        &mut self,
        program: &mut WgpuProgram,
        layout: &ProgramLayout<'_>,
    ) -> Result<(), ProgramError> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let channel_layout = (!layout.channels.is_empty()).then(|| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("layer {} channel layout", layout.layer)),
                entries: &build_channel_layout_entries(layout.channels.iter()),
            })
        });
        let mut bind_group_layouts = vec![&self.uniform_layout];
        if let Some(channel_layout) = channel_layout.as_ref() {
            bind_group_layouts.push(channel_layout);
        }

        let target = if layout.feedback {
            PipelineTarget {
                format: TARGET_FORMAT,
                blend: None,
            }
        } else {
            PipelineTarget {
                format: self.context.surface_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            }
        };
        let pipeline = create_render_pipeline(
            device,
            &format!("layer {} pipeline", layout.layer),
            &bind_group_layouts,
            &program.vertex,
            &program.fragment,
            target,
        );

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("layer {} uniforms", layout.layer)),
            size: LayerUniformBlock::SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("layer {} uniform bind group", layout.layer)),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(ProgramError::Link {
                layer: program.layer,
                log: err.to_string(),
            });
        }

        program.linked = Some(LinkedProgram {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            channel_layout,
        });
        Ok(())
    }

    fn create_target(&mut self, spec: &TargetSpec) -> Result<WgpuTarget, TargetError> {
        WgpuTarget::create(&self.context, spec)
    }

    fn check_target(&self, target: &WgpuTarget) -> Result<(), TargetError> {
        match target.incomplete_reason() {
            Some(reason) => Err(TargetError::Incomplete {
                layer: target.layer(),
                slot: target.slot(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn resize_target(
        &mut self,
        target: &mut WgpuTarget,
        spec: &TargetSpec,
    ) -> Result<(), TargetError> {
        target.reallocate(&self.context, spec)
    }

    fn resize_surface(&mut self, size: SurfaceSize) {
        self.context.resize(size);
    }

    fn submit_frame(&mut self, layers: &[GpuLayer], plan: &FramePlan) -> Result<(), FrameError> {
        self.write_uniforms(layers, plan);

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("layer frame encoder"),
                });
        for pass in &plan.accumulate {
            self.encode_accumulate(&mut encoder, layers, pass);
        }

        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                // The plan already flipped the accumulated layers; keep their contents in step.
                self.context.queue.submit(std::iter::once(encoder.finish()));
                self.report_frame_errors();
                return Err(map_surface_error(err));
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.encode_composite(&mut encoder, &view, layers, plan);

        self.context.queue.submit(std::iter::once(encoder.finish()));
        self.report_frame_errors();
        frame.present();
        Ok(())
    }
}

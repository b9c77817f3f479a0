use std::borrow::Cow;

use wgpu::naga::ShaderStage;

/// Vertices in the full-surface triangle strip.
pub(crate) const QUAD_VERTEX_COUNT: u32 = 4;

/// Bind group 0: the per-layer uniform block.
pub(crate) fn create_uniform_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("layer uniform layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

/// Bind group 1: texture at `2c`, sampler at `2c + 1` for each channel `c`.
pub(crate) fn build_channel_layout_entries(
    channels: impl IntoIterator<Item = usize>,
) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::new();
    for channel in channels {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (channel as u32) * 2,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (channel as u32) * 2 + 1,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

pub(crate) fn create_glsl_module(
    device: &wgpu::Device,
    label: &str,
    stage: ShaderStage,
    source: String,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source),
            stage,
            defines: &[],
        },
    })
}

/// Everything that differs between an offscreen layer pipeline and a surface one.
pub(crate) struct PipelineTarget {
    pub format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
}

pub(crate) fn create_render_pipeline(
    device: &wgpu::Device,
    label: &str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    target: PipelineTarget,
) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: target.format,
                blend: target.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

/// Draws a feedback layer's front texture onto the surface, alpha blended.
pub(crate) struct BlitPipeline {
    pub pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

impl BlitPipeline {
    pub(crate) fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit layout"),
            entries: &build_channel_layout_entries([0]),
        });
        let vertex = create_glsl_module(
            device,
            "blit vertex",
            ShaderStage::Vertex,
            BLIT_VERTEX_GLSL.to_string(),
        );
        let fragment = create_glsl_module(
            device,
            "blit fragment",
            ShaderStage::Fragment,
            BLIT_FRAGMENT_GLSL.to_string(),
        );
        let pipeline = create_render_pipeline(
            device,
            "blit pipeline",
            &[&layout],
            &vertex,
            &fragment,
            PipelineTarget {
                format: surface_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            },
        );
        Self { pipeline, layout }
    }

    pub(crate) fn bind_group(
        &self,
        device: &wgpu::Device,
        view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit bind group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }
}

const BLIT_VERTEX_GLSL: &str = r"#version 450
const vec2 positions[4] = vec2[4](
    vec2(-1.0, -1.0),
    vec2(1.0, -1.0),
    vec2(-1.0, 1.0),
    vec2(1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    gl_Position = vec4(positions[vertex_index], 0.0, 1.0);
}
";

/// Targets always match the surface size, so texels map 1:1 onto fragments.
const BLIT_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) out vec4 out_color;
layout(set = 0, binding = 0) uniform texture2D blit_texture;
layout(set = 0, binding = 1) uniform sampler blit_sampler;

void main() {
    // Targets are stored bottom row first.
    ivec2 size = textureSize(sampler2D(blit_texture, blit_sampler), 0);
    ivec2 texel = ivec2(gl_FragCoord.xy);
    out_color = texelFetch(sampler2D(blit_texture, blit_sampler), ivec2(texel.x, size.y - 1 - texel.y), 0);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::naga::front::glsl::{Frontend, Options};

    #[test]
    fn channel_entries_use_paired_bindings() {
        let entries = build_channel_layout_entries([0, 2]);
        let bindings: Vec<u32> = entries.iter().map(|entry| entry.binding).collect();
        assert_eq!(bindings, vec![0, 1, 4, 5]);
    }

    #[test]
    fn blit_shaders_parse() {
        let mut frontend = Frontend::default();
        frontend
            .parse(&Options::from(ShaderStage::Vertex), BLIT_VERTEX_GLSL)
            .unwrap();
        frontend
            .parse(&Options::from(ShaderStage::Fragment), BLIT_FRAGMENT_GLSL)
            .unwrap();
    }

    #[test]
    fn blit_reads_targets_bottom_row_first() {
        assert!(BLIT_FRAGMENT_GLSL.contains("ivec2(texel.x, size.y - 1 - texel.y)"));
    }
}

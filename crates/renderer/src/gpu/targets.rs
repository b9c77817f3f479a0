use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::backend::{TargetError, TargetSpec};
use crate::types::{SurfaceSize, WrapMode, WrapModes};

use super::context::GpuContext;

/// Colour format of every offscreen layer target.
pub(crate) const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// One half of a feedback layer's target pair.
pub struct WgpuTarget {
    layer: usize,
    slot: usize,
    size: SurfaceSize,
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    incomplete: Option<String>,
}

impl WgpuTarget {
    pub(crate) fn create(context: &GpuContext, spec: &TargetSpec) -> Result<Self, TargetError> {
        let (texture, view, incomplete) = allocate(context, spec)?;
        let sampler = create_sampler(
            &context.device,
            spec.wrap,
            context.clamp_to_border,
            &format!("layer {} target {} sampler", spec.layer, spec.slot),
        );
        Ok(Self {
            layer: spec.layer,
            slot: spec.slot,
            size: spec.size,
            _texture: texture,
            view,
            sampler,
            incomplete,
        })
    }

    /// Replaces the storage; the sampler and slot identity are kept.
    pub(crate) fn reallocate(
        &mut self,
        context: &GpuContext,
        spec: &TargetSpec,
    ) -> Result<(), TargetError> {
        let (texture, view, incomplete) = allocate(context, spec)?;
        self._texture = texture;
        self.view = view;
        self.incomplete = incomplete;
        self.size = spec.size;
        Ok(())
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub(crate) fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub(crate) fn incomplete_reason(&self) -> Option<&str> {
        self.incomplete.as_deref()
    }
}

fn allocate(
    context: &GpuContext,
    spec: &TargetSpec,
) -> Result<(wgpu::Texture, wgpu::TextureView, Option<String>), TargetError> {
    let limit = context.max_texture_dimension;
    if spec.size.width > limit || spec.size.height > limit {
        return Err(TargetError::TooLarge {
            layer: spec.layer,
            slot: spec.slot,
            size: spec.size,
            limit,
        });
    }

    let device = &context.device;
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    // Fresh textures are zero-initialised, so new storage starts transparent.
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&format!("layer {} target {}", spec.layer, spec.slot)),
        size: wgpu::Extent3d {
            width: spec.size.width.max(1),
            height: spec.size.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let incomplete = pollster::block_on(device.pop_error_scope()).map(|err| err.to_string());
    Ok((texture, view, incomplete))
}

pub(crate) fn create_sampler(
    device: &wgpu::Device,
    wrap: WrapModes,
    clamp_to_border: bool,
    label: &str,
) -> wgpu::Sampler {
    let address_mode_u = address_mode(wrap.s, clamp_to_border);
    let address_mode_v = address_mode(wrap.t, clamp_to_border);
    let uses_border = address_mode_u == wgpu::AddressMode::ClampToBorder
        || address_mode_v == wgpu::AddressMode::ClampToBorder;
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u,
        address_mode_v,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        border_color: uses_border.then_some(wgpu::SamplerBorderColor::TransparentBlack),
        ..Default::default()
    })
}

fn address_mode(mode: WrapMode, clamp_to_border: bool) -> wgpu::AddressMode {
    match mode {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::ClampToBorder if clamp_to_border => wgpu::AddressMode::ClampToBorder,
        WrapMode::ClampToBorder => {
            tracing::warn!("clamp_to_border is not supported by this device; using clamp_to_edge");
            wgpu::AddressMode::ClampToEdge
        }
    }
}

/// 1×1 transparent texture bound for channels whose layer has no targets.
pub(crate) struct Placeholder {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Placeholder {
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let data = [0u8; 4];
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("placeholder channel texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &data,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("placeholder channel sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            _texture: texture,
            view,
            sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_modes_map_to_address_modes() {
        assert_eq!(address_mode(WrapMode::Repeat, false), wgpu::AddressMode::Repeat);
        assert_eq!(
            address_mode(WrapMode::MirroredRepeat, false),
            wgpu::AddressMode::MirrorRepeat
        );
        assert_eq!(
            address_mode(WrapMode::ClampToBorder, true),
            wgpu::AddressMode::ClampToBorder
        );
        assert_eq!(
            address_mode(WrapMode::ClampToBorder, false),
            wgpu::AddressMode::ClampToEdge
        );
    }
}

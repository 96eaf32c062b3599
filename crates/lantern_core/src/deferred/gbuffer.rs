//! G-Buffer textures and resources for deferred sprite lighting.
//!
//! The G-Buffer stores per-pixel surface data in multiple render targets:
//! - diffuse (RGBA8): RGB = albedo, A = coverage
//! - normal (RGBA8): RGB = normal packed into [0, 1]
//! - light (RGBA16F): RGB = accumulated light (sprite emission + point lights)
//!
//! These textures are created in the render world and managed via TextureCache.

use bevy::image::BevyDefault;
use bevy::prelude::*;
use bevy::render::{
    extract_component::ExtractComponent,
    render_resource::{
        Extent3d, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureView,
    },
    renderer::RenderDevice,
    texture::{CachedTexture, TextureCache},
    view::ViewTarget,
};

use crate::frag_output::ChannelRole;

/// Marker component for cameras that should use deferred sprite lighting.
///
/// The camera must render without MSAA (`Msaa::Off`). Its view target may be
/// SDR or `Hdr`; see [`view_target_formats`].
#[derive(Component, Default, Clone, ExtractComponent)]
pub struct DeferredCamera;

/// G-Buffer textures for a camera in the render world.
#[derive(Component)]
pub struct ViewGBufferTextures {
    /// RGB = albedo, A = coverage
    pub diffuse: CachedTexture,
    /// RGB = packed normal
    pub normal: CachedTexture,
    /// RGB = accumulated light
    pub light: CachedTexture,
    /// Depth buffer for the sprite pass
    pub depth: CachedTexture,
    pub size: Extent3d,
}

pub const GBUFFER_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
pub const GBUFFER_DIFFUSE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
pub const GBUFFER_NORMAL_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
pub const GBUFFER_LIGHT_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Reverse-Z: far plane clears to 0.
pub const GBUFFER_DEPTH_CLEAR: f32 = 0.0;

/// Encoded +Z normal, used where no sprite was drawn.
pub const NEUTRAL_NORMAL: [f32; 4] = [0.5, 0.5, 1.0, 1.0];

/// Texture format of a G-buffer channel. `Output` renders into the view
/// target, so it takes the view's format.
pub fn channel_format(role: ChannelRole, view_format: TextureFormat) -> TextureFormat {
    match role {
        ChannelRole::Output => view_format,
        ChannelRole::Diffuse => GBUFFER_DIFFUSE_FORMAT,
        ChannelRole::Normal => GBUFFER_NORMAL_FORMAT,
        ChannelRole::Light => GBUFFER_LIGHT_FORMAT,
    }
}

/// View target formats the passes writing the view target are compiled for:
/// the SDR default and the `Hdr` format.
pub fn view_target_formats() -> [TextureFormat; 2] {
    [TextureFormat::bevy_default(), ViewTarget::TEXTURE_FORMAT_HDR]
}

/// Whether a view target can be written by the deferred passes.
pub fn supports_view_target(format: TextureFormat, multisampled: bool) -> bool {
    !multisampled && view_target_formats().contains(&format)
}

/// Clear color of a G-buffer channel at the start of the sprite pass.
pub fn channel_clear(role: ChannelRole, output_clear: [f32; 4]) -> wgpu::Color {
    let [r, g, b, a] = match role {
        ChannelRole::Output => output_clear,
        ChannelRole::Diffuse => [0.0; 4],
        ChannelRole::Normal => NEUTRAL_NORMAL,
        ChannelRole::Light => [0.0, 0.0, 0.0, 1.0],
    };
    wgpu::Color {
        r: r as f64,
        g: g as f64,
        b: b as f64,
        a: a as f64,
    }
}

/// Pack a unit normal into the `[0, 1]` range stored by the normal channel.
pub fn encode_normal(normal: Vec3) -> [f32; 4] {
    let packed = normal.normalize_or(Vec3::Z) * 0.5 + Vec3::splat(0.5);
    [packed.x, packed.y, packed.z, 1.0]
}

/// Inverse of [`encode_normal`].
pub fn decode_normal(encoded: [f32; 4]) -> Vec3 {
    (Vec3::new(encoded[0], encoded[1], encoded[2]) * 2.0 - Vec3::ONE).normalize_or(Vec3::Z)
}

impl ViewGBufferTextures {
    /// Create G-buffer textures for a given size.
    pub fn new(
        render_device: &RenderDevice,
        texture_cache: &mut TextureCache,
        size: Extent3d,
    ) -> Self {
        let mut create = |label: &'static str, format: TextureFormat| {
            texture_cache.get(
                render_device,
                TextureDescriptor {
                    label: Some(label),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: TextureDimension::D2,
                    format,
                    usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                },
            )
        };

        let diffuse = create("gbuffer_diffuse", GBUFFER_DIFFUSE_FORMAT);
        let normal = create("gbuffer_normal", GBUFFER_NORMAL_FORMAT);
        let light = create("gbuffer_light", GBUFFER_LIGHT_FORMAT);
        let depth = create("gbuffer_depth", GBUFFER_DEPTH_FORMAT);

        Self {
            diffuse,
            normal,
            light,
            depth,
            size,
        }
    }

    /// Texture view for a G-buffer channel. `Output` has no G-buffer texture.
    pub fn channel_view(&self, role: ChannelRole) -> Option<&TextureView> {
        match role {
            ChannelRole::Output => None,
            ChannelRole::Diffuse => Some(&self.diffuse.default_view),
            ChannelRole::Normal => Some(&self.normal.default_view),
            ChannelRole::Light => Some(&self.light.default_view),
        }
    }
}

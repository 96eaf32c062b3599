//! Sprite G-buffer pipeline.
//!
//! One render pipeline is queued for [`GBufferTarget::Offscreen`] and one per
//! view target format for [`GBufferTarget::Screen`], whose attachment 0 is the
//! view target. All share the view and image bind group layouts. The color
//! targets come from the target's fragment output layout, so attachment order
//! always matches `FragOutput` in gbuffer_sprite.wgsl.

use bevy::platform::collections::HashMap;
use bevy::prelude::*;
use bevy::render::{
    render_asset::RenderAssets,
    render_resource::{
        BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingResource,
        BindingType, BufferBindingType, CachedRenderPipelineId, ColorTargetState, ColorWrites,
        CompareFunction, DepthStencilState, FragmentState, MultisampleState, PipelineCache,
        PrimitiveState, RenderPipelineDescriptor, SamplerBindingType, ShaderStages,
        StencilState, TextureFormat, TextureSampleType, TextureViewDimension, VertexState,
    },
    renderer::RenderDevice,
    texture::{FallbackImage, GpuImage},
};
use bevy::shader::ShaderDefVal;
use bytemuck::{Pod, Zeroable};

use super::gbuffer::{channel_format, view_target_formats, GBUFFER_DEPTH_FORMAT};
use super::lighting::GBufferTarget;
use super::sprite::{SpriteDrawData, SpriteVertex};
use crate::frag_output::OutputChannel;

/// View uniform shared by the sprite and light passes.
/// Must match `View` in the deferred shaders.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DeferredViewUniform {
    pub clip_from_world: [[f32; 4]; 4],
    pub world_from_clip: [[f32; 4]; 4],
}

impl DeferredViewUniform {
    pub fn new(clip_from_world: Mat4) -> Self {
        Self {
            clip_from_world: clip_from_world.to_cols_array_2d(),
            world_from_clip: clip_from_world.inverse().to_cols_array_2d(),
        }
    }
}

/// Color target states for a fragment output layout, in attachment order.
pub fn color_targets(
    channels: &[OutputChannel],
    view_format: TextureFormat,
) -> Vec<Option<ColorTargetState>> {
    channels
        .iter()
        .map(|channel| {
            Some(ColorTargetState {
                format: channel_format(channel.role, view_format),
                blend: None,
                write_mask: ColorWrites::ALL,
            })
        })
        .collect()
}

/// Shader defs enabling the fragment output struct of `target`.
pub fn target_shader_defs(target: GBufferTarget) -> Vec<ShaderDefVal> {
    target.shader_def().map(ShaderDefVal::from).into_iter().collect()
}

/// Resource containing the sprite G-buffer pipelines.
#[derive(Resource)]
pub struct SpriteGBufferPipeline {
    pub offscreen_pipeline_id: CachedRenderPipelineId,
    /// Keyed by view target format
    pub screen_pipeline_ids: HashMap<TextureFormat, CachedRenderPipelineId>,
    pub view_layout: BindGroupLayout,
    pub image_layout: BindGroupLayout,
}

impl SpriteGBufferPipeline {
    /// Pipeline for `target` writing a view of `view_format`.
    pub fn pipeline_id(
        &self,
        target: GBufferTarget,
        view_format: TextureFormat,
    ) -> Option<CachedRenderPipelineId> {
        match target {
            GBufferTarget::Offscreen => Some(self.offscreen_pipeline_id),
            GBufferTarget::Screen => self.screen_pipeline_ids.get(&view_format).copied(),
        }
    }
}

/// Bind group layout entry for a uniform buffer.
pub fn uniform_layout_entry(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// System to initialize the sprite G-buffer pipelines.
pub fn init_sprite_gbuffer_pipeline(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    pipeline_cache: Res<PipelineCache>,
    asset_server: Res<AssetServer>,
    existing: Option<Res<SpriteGBufferPipeline>>,
) {
    if existing.is_some() {
        return;
    }

    let view_layout = render_device.create_bind_group_layout(
        "sprite_gbuffer_view_layout",
        &[uniform_layout_entry(0, ShaderStages::VERTEX_FRAGMENT)],
    );

    let image_layout = render_device.create_bind_group_layout(
        "sprite_gbuffer_image_layout",
        &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
                count: None,
            },
        ],
    );

    let shader = asset_server.load("shaders/gbuffer_sprite.wgsl");

    let queue = |target: GBufferTarget, view_format: TextureFormat, label: &'static str| {
        pipeline_cache.queue_render_pipeline(RenderPipelineDescriptor {
            label: Some(label.into()),
            layout: vec![view_layout.clone(), image_layout.clone()],
            push_constant_ranges: vec![],
            vertex: VertexState {
                shader: shader.clone(),
                shader_defs: target_shader_defs(target),
                entry_point: Some("vertex".into()),
                buffers: vec![SpriteVertex::vertex_buffer_layout()],
            },
            primitive: PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Mirrored sprites flip winding
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(DepthStencilState {
                format: GBUFFER_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::GreaterEqual, // Reverse-Z
                stencil: StencilState::default(),
                bias: Default::default(),
            }),
            multisample: MultisampleState::default(),
            fragment: Some(FragmentState {
                shader: shader.clone(),
                shader_defs: target_shader_defs(target),
                entry_point: Some("fragment".into()),
                targets: color_targets(target.channels(), view_format),
            }),
            zero_initialize_workgroup_memory: false,
        })
    };

    // Offscreen never binds the view target, so its format is irrelevant
    let [sdr_format, _] = view_target_formats();
    let offscreen_pipeline_id = queue(
        GBufferTarget::Offscreen,
        sdr_format,
        "sprite_gbuffer_offscreen_pipeline",
    );
    let screen_pipeline_ids = view_target_formats()
        .into_iter()
        .map(|format| {
            let id = queue(GBufferTarget::Screen, format, "sprite_gbuffer_screen_pipeline");
            (format, id)
        })
        .collect();

    commands.insert_resource(SpriteGBufferPipeline {
        offscreen_pipeline_id,
        screen_pipeline_ids,
        view_layout,
        image_layout,
    });

    info!("SpriteGBufferPipeline initialized");
}

/// Image bind groups for the current frame's sprite batches.
#[derive(Resource, Default)]
pub struct SpriteImageBindGroups {
    /// White 1x1 texture for untextured sprites
    pub fallback: Option<BindGroup>,
    pub values: HashMap<AssetId<Image>, BindGroup>,
}

impl SpriteImageBindGroups {
    /// Bind group for a batch image. `None` while a texture is still loading.
    pub fn get(&self, image: Option<AssetId<Image>>) -> Option<&BindGroup> {
        match image {
            Some(id) => self.values.get(&id),
            None => self.fallback.as_ref(),
        }
    }
}

/// System to create a bind group for every image used by this frame's batches.
pub fn prepare_sprite_image_bind_groups(
    render_device: Res<RenderDevice>,
    pipeline: Option<Res<SpriteGBufferPipeline>>,
    draw_data: Res<SpriteDrawData>,
    gpu_images: Res<RenderAssets<GpuImage>>,
    fallback_image: Res<FallbackImage>,
    mut bind_groups: ResMut<SpriteImageBindGroups>,
) {
    let Some(pipeline) = pipeline else {
        return;
    };

    let create = |image: &GpuImage| {
        render_device.create_bind_group(
            "sprite_image_bind_group",
            &pipeline.image_layout,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&image.texture_view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&image.sampler),
                },
            ],
        )
    };

    if bind_groups.fallback.is_none() {
        bind_groups.fallback = Some(create(&fallback_image.d2));
    }

    bind_groups.values.clear();
    for id in draw_data.batches.iter().filter_map(|batch| batch.image) {
        if bind_groups.values.contains_key(&id) {
            continue;
        }
        if let Some(gpu_image) = gpu_images.get(id) {
            bind_groups.values.insert(id, create(gpu_image));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::gbuffer::{GBUFFER_DIFFUSE_FORMAT, GBUFFER_LIGHT_FORMAT};
    use bevy::render::view::ViewTarget;

    #[test]
    fn test_color_targets_follow_attachment_order() {
        let view_format = TextureFormat::Rgba8UnormSrgb;

        let offscreen = color_targets(GBufferTarget::Offscreen.channels(), view_format);
        assert_eq!(offscreen.len(), 3);
        assert_eq!(offscreen[0].as_ref().unwrap().format, GBUFFER_DIFFUSE_FORMAT);
        assert_eq!(offscreen[2].as_ref().unwrap().format, GBUFFER_LIGHT_FORMAT);

        let screen = color_targets(GBufferTarget::Screen.channels(), view_format);
        assert_eq!(screen.len(), 4);
        assert_eq!(screen[0].as_ref().unwrap().format, view_format);
        assert_eq!(screen[1].as_ref().unwrap().format, GBUFFER_DIFFUSE_FORMAT);
        assert_eq!(screen[3].as_ref().unwrap().format, GBUFFER_LIGHT_FORMAT);
    }

    #[test]
    fn test_screen_targets_follow_hdr_view() {
        let hdr = ViewTarget::TEXTURE_FORMAT_HDR;
        let screen = color_targets(GBufferTarget::Screen.channels(), hdr);
        assert_eq!(screen[0].as_ref().unwrap().format, hdr);
        assert!(view_target_formats().contains(&hdr));
    }

    #[test]
    fn test_shader_defs_per_target() {
        assert!(target_shader_defs(GBufferTarget::Offscreen).is_empty());
        assert_eq!(target_shader_defs(GBufferTarget::Screen).len(), 1);
    }

    #[test]
    fn test_uniform_layout_entry_is_uniform_buffer() {
        let entry = uniform_layout_entry(3, ShaderStages::FRAGMENT);
        assert_eq!(entry.binding, 3);
        assert!(matches!(
            entry.ty,
            BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: false,
                ..
            }
        ));
    }

    #[test]
    fn test_view_uniform_inverse() {
        let clip_from_world = Mat4::orthographic_rh(-100.0, 100.0, -50.0, 50.0, 0.1, 1000.0);
        let uniform = DeferredViewUniform::new(clip_from_world);
        let world_from_clip = Mat4::from_cols_array_2d(&uniform.world_from_clip);

        let corner = world_from_clip.project_point3(Vec3::new(1.0, 1.0, 0.5));
        assert!((corner.x - 100.0).abs() < 1e-3);
        assert!((corner.y - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_view_uniform_is_two_matrices() {
        assert_eq!(std::mem::size_of::<DeferredViewUniform>(), 128);
    }
}

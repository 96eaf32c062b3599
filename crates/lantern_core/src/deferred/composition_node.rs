//! Composition render graph node.
//!
//! Combines the G-buffer into the view target: `diffuse * (ambient + light)`.
//!
//! With `GBufferTarget::Offscreen` the pass samples the diffuse attachment
//! and alpha-blends the lit color over the clear color. With
//! `GBufferTarget::Screen` the view target already holds the unlit color, so
//! the pass outputs `ambient + light` and multiplies it into the target.

use bevy::platform::collections::HashMap;
use bevy::prelude::*;
use bevy::render::{
    camera::ExtractedCamera,
    render_graph::{NodeRunError, RenderGraphContext, ViewNode},
    render_resource::{
        BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingResource, BindingType,
        BlendComponent, BlendFactor, BlendOperation, BlendState, Buffer, BufferInitDescriptor,
        BufferUsages, CachedRenderPipelineId, ColorTargetState, ColorWrites, FilterMode,
        FragmentState, LoadOp, MultisampleState, Operations, PipelineCache, PrimitiveState,
        RenderPassColorAttachment, RenderPassDescriptor, RenderPipelineDescriptor, Sampler,
        SamplerBindingType, SamplerDescriptor, ShaderStages, StoreOp, TextureFormat,
        TextureSampleType, TextureViewDimension, VertexState,
    },
    renderer::{RenderContext, RenderDevice},
    view::ViewTarget,
};
use bytemuck::{Pod, Zeroable};

use super::gbuffer::{channel_clear, supports_view_target, view_target_formats, ViewGBufferTextures};
use super::lighting::{DeferredLightingConfig, GBufferTarget};
use super::sprite_pipeline::{target_shader_defs, uniform_layout_entry};
use crate::frag_output::ChannelRole;

/// `dst * src` on color, destination alpha kept.
pub const MULTIPLY_BLEND: BlendState = BlendState {
    color: BlendComponent {
        src_factor: BlendFactor::Dst,
        dst_factor: BlendFactor::Zero,
        operation: BlendOperation::Add,
    },
    alpha: BlendComponent {
        src_factor: BlendFactor::Zero,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Add,
    },
};

/// Composition uniform.
/// Must match `Composition` in composition.wgsl
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CompositionUniform {
    /// Linear RGBA ambient light
    pub ambient: [f32; 4],
}

/// Resource holding the composition uniform for the current frame.
#[derive(Resource)]
pub struct CompositionUniformBuffer {
    pub buffer: Buffer,
}

/// Render graph node that writes the lit image to the view target.
#[derive(Default)]
pub struct CompositionPassNode;

impl ViewNode for CompositionPassNode {
    type ViewQuery = (
        &'static ExtractedCamera,
        &'static ViewTarget,
        &'static ViewGBufferTextures,
    );

    fn run<'w>(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext<'w>,
        (camera, target, gbuffer): bevy::ecs::query::QueryItem<'w, '_, Self::ViewQuery>,
        world: &'w World,
    ) -> Result<(), NodeRunError> {
        let view_format = target.main_texture_format();
        if !supports_view_target(view_format, target.sampled_main_texture_view().is_some()) {
            return Ok(());
        }

        let pipeline_cache = world.resource::<PipelineCache>();
        let Some(composition_pipeline) = world.get_resource::<CompositionPipeline>() else {
            return Ok(());
        };
        let Some(uniform) = world.get_resource::<CompositionUniformBuffer>() else {
            return Ok(());
        };

        let config = world
            .get_resource::<DeferredLightingConfig>()
            .cloned()
            .unwrap_or_default();

        let Some(pipeline_id) = composition_pipeline.pipeline_id(config.target, view_format) else {
            return Ok(());
        };
        let Some(pipeline) = pipeline_cache.get_render_pipeline(pipeline_id) else {
            // Pipeline still compiling
            return Ok(());
        };

        let bind_group = render_context.render_device().create_bind_group(
            "composition_bind_group",
            &composition_pipeline.bind_group_layout,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&gbuffer.diffuse.default_view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::TextureView(&gbuffer.light.default_view),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::Sampler(&composition_pipeline.sampler),
                },
                BindGroupEntry {
                    binding: 3,
                    resource: uniform.buffer.as_entire_binding(),
                },
            ],
        );

        // Screen mode keeps the unlit color the sprite pass wrote
        let load = if config.target.writes_view_target() {
            LoadOp::Load
        } else {
            LoadOp::Clear(channel_clear(ChannelRole::Output, config.clear_color))
        };

        let mut render_pass = render_context.begin_tracked_render_pass(RenderPassDescriptor {
            label: Some("composition_pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: target.main_texture_view(),
                resolve_target: None,
                ops: Operations {
                    load,
                    store: StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if let Some(viewport) = &camera.viewport {
            render_pass.set_camera_viewport(viewport);
        }

        // Draw fullscreen triangle
        render_pass.set_render_pipeline(pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);

        Ok(())
    }
}

/// Pipeline resources for composition.
#[derive(Resource)]
pub struct CompositionPipeline {
    /// One pipeline per target and view target format
    pub pipeline_ids: HashMap<(GBufferTarget, TextureFormat), CachedRenderPipelineId>,
    pub bind_group_layout: BindGroupLayout,
    pub sampler: Sampler,
}

impl CompositionPipeline {
    pub fn pipeline_id(
        &self,
        target: GBufferTarget,
        view_format: TextureFormat,
    ) -> Option<CachedRenderPipelineId> {
        self.pipeline_ids.get(&(target, view_format)).copied()
    }
}

/// Every (target, view format) pair a composition pipeline is queued for.
pub fn composition_variants() -> Vec<(GBufferTarget, TextureFormat)> {
    [GBufferTarget::Offscreen, GBufferTarget::Screen]
        .into_iter()
        .flat_map(|target| view_target_formats().map(|format| (target, format)))
        .collect()
}

/// Blend state used to write the view target for `target`.
pub fn composition_blend(target: GBufferTarget) -> BlendState {
    if target.writes_view_target() {
        MULTIPLY_BLEND
    } else {
        BlendState::ALPHA_BLENDING
    }
}

/// System to prepare the composition uniform from the lighting config.
pub fn prepare_composition_uniform(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    config: Option<Res<DeferredLightingConfig>>,
) {
    let ambient = config
        .map(|c| c.ambient)
        .unwrap_or_else(|| DeferredLightingConfig::default().ambient);

    let buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("composition_uniform"),
        contents: bytemuck::bytes_of(&CompositionUniform { ambient }),
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
    });

    commands.insert_resource(CompositionUniformBuffer { buffer });
}

/// System to initialize the composition pipelines on first run.
pub fn init_composition_pipeline(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    pipeline_cache: Res<PipelineCache>,
    asset_server: Res<AssetServer>,
    existing: Option<Res<CompositionPipeline>>,
) {
    if existing.is_some() {
        return;
    }

    let texture_entry = |binding: u32| BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable: false },
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    let bind_group_layout = render_device.create_bind_group_layout(
        "composition_bind_group_layout",
        &[
            // diffuse
            texture_entry(0),
            // light
            texture_entry(1),
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::NonFiltering),
                count: None,
            },
            uniform_layout_entry(3, ShaderStages::FRAGMENT),
        ],
    );

    let sampler = render_device.create_sampler(&SamplerDescriptor {
        label: Some("composition_sampler"),
        mag_filter: FilterMode::Nearest,
        min_filter: FilterMode::Nearest,
        ..default()
    });

    let shader = asset_server.load("shaders/composition.wgsl");

    let queue = |target: GBufferTarget, view_format: TextureFormat| {
        pipeline_cache.queue_render_pipeline(RenderPipelineDescriptor {
            label: Some("composition_pipeline".into()),
            layout: vec![bind_group_layout.clone()],
            push_constant_ranges: vec![],
            vertex: VertexState {
                shader: shader.clone(),
                shader_defs: vec![],
                entry_point: Some("vs_main".into()),
                buffers: vec![],
            },
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: MultisampleState::default(),
            fragment: Some(FragmentState {
                shader: shader.clone(),
                shader_defs: target_shader_defs(target),
                entry_point: Some("fs_main".into()),
                targets: vec![Some(ColorTargetState {
                    format: view_format,
                    blend: Some(composition_blend(target)),
                    write_mask: ColorWrites::ALL,
                })],
            }),
            zero_initialize_workgroup_memory: false,
        })
    };

    let pipeline_ids = composition_variants()
        .into_iter()
        .map(|(target, format)| ((target, format), queue(target, format)))
        .collect();

    commands.insert_resource(CompositionPipeline {
        pipeline_ids,
        bind_group_layout,
        sampler,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_per_target() {
        assert_eq!(composition_blend(GBufferTarget::Offscreen), BlendState::ALPHA_BLENDING);
        assert_eq!(composition_blend(GBufferTarget::Screen), MULTIPLY_BLEND);
    }

    #[test]
    fn test_variants_cover_sdr_and_hdr() {
        let variants = composition_variants();
        assert_eq!(variants.len(), 4);
        for target in [GBufferTarget::Offscreen, GBufferTarget::Screen] {
            assert!(variants.contains(&(target, ViewTarget::TEXTURE_FORMAT_HDR)));
        }
    }

    #[test]
    fn test_uniform_size() {
        assert_eq!(std::mem::size_of::<CompositionUniform>(), 16);
    }
}

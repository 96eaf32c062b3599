//! Deferred light render graph node.
//!
//! Draws a fullscreen triangle that reads the normal attachment and adds the
//! contribution of every light into the light attachment. Sprite emission
//! written by the G-buffer pass is kept (`LoadOp::Load`, additive blend).

use bevy::prelude::*;
use bevy::render::{
    camera::ExtractedCamera,
    render_graph::{NodeRunError, RenderGraphContext, ViewNode},
    render_resource::{
        BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingResource, BindingType,
        BlendComponent, BlendFactor, BlendOperation, BlendState, BufferBindingType,
        CachedRenderPipelineId, ColorTargetState, ColorWrites, FilterMode, FragmentState, LoadOp,
        MultisampleState, Operations, PipelineCache, PrimitiveState, RenderPassColorAttachment,
        RenderPassDescriptor, RenderPipelineDescriptor, Sampler, SamplerBindingType,
        SamplerDescriptor, ShaderStages, StoreOp, TextureSampleType, TextureViewDimension,
        VertexState,
    },
    renderer::{RenderContext, RenderDevice},
};

use super::gbuffer::{ViewGBufferTextures, GBUFFER_LIGHT_FORMAT};
use super::light::LightsBuffer;
use super::prepare::ViewDeferredUniforms;
use super::sprite_pipeline::uniform_layout_entry;

/// `dst + src` on every channel.
pub const ADDITIVE_BLEND: BlendState = BlendState {
    color: BlendComponent {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Add,
    },
    alpha: BlendComponent {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Add,
    },
};

/// Render graph node that accumulates lights into the G-buffer light attachment.
#[derive(Default)]
pub struct LightPassNode;

impl ViewNode for LightPassNode {
    type ViewQuery = (
        &'static ExtractedCamera,
        &'static ViewGBufferTextures,
        &'static ViewDeferredUniforms,
    );

    fn run<'w>(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext<'w>,
        (camera, gbuffer, uniforms): bevy::ecs::query::QueryItem<'w, '_, Self::ViewQuery>,
        world: &'w World,
    ) -> Result<(), NodeRunError> {
        let Some(lights) = world.get_resource::<LightsBuffer>() else {
            return Ok(());
        };
        if lights.count == 0 {
            return Ok(());
        }

        let pipeline_cache = world.resource::<PipelineCache>();
        let Some(light_pipeline) = world.get_resource::<LightPassPipeline>() else {
            // Pipeline not ready yet
            return Ok(());
        };
        let Some(pipeline) = pipeline_cache.get_render_pipeline(light_pipeline.pipeline_id) else {
            // Pipeline still compiling
            return Ok(());
        };

        let gbuffer_bind_group = render_context.render_device().create_bind_group(
            "light_pass_gbuffer_bind_group",
            &light_pipeline.gbuffer_layout,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&gbuffer.normal.default_view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&light_pipeline.sampler),
                },
            ],
        );

        let lights_bind_group = render_context.render_device().create_bind_group(
            "light_pass_lights_bind_group",
            &light_pipeline.lights_layout,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: lights.buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: uniforms.buffer.as_entire_binding(),
                },
            ],
        );

        let mut render_pass = render_context.begin_tracked_render_pass(RenderPassDescriptor {
            label: Some("light_pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &gbuffer.light.default_view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Load,
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

        render_pass.set_render_pipeline(pipeline);
        render_pass.set_bind_group(0, &gbuffer_bind_group, &[]);
        render_pass.set_bind_group(1, &lights_bind_group, &[]);
        render_pass.draw(0..3, 0..1);

        Ok(())
    }
}

/// Pipeline resources for the light pass.
#[derive(Resource)]
pub struct LightPassPipeline {
    pub pipeline_id: CachedRenderPipelineId,
    pub gbuffer_layout: BindGroupLayout,
    pub lights_layout: BindGroupLayout,
    pub sampler: Sampler,
}

/// System to initialize the light pass pipeline on first run.
pub fn init_light_pipeline(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    pipeline_cache: Res<PipelineCache>,
    asset_server: Res<AssetServer>,
    existing: Option<Res<LightPassPipeline>>,
) {
    if existing.is_some() {
        return;
    }

    let gbuffer_layout = render_device.create_bind_group_layout(
        "light_pass_gbuffer_layout",
        &[
            // normal texture
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: false },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::NonFiltering),
                count: None,
            },
        ],
    );

    let lights_layout = render_device.create_bind_group_layout(
        "light_pass_lights_layout",
        &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            uniform_layout_entry(1, ShaderStages::FRAGMENT),
        ],
    );

    let sampler = render_device.create_sampler(&SamplerDescriptor {
        label: Some("light_pass_sampler"),
        mag_filter: FilterMode::Nearest,
        min_filter: FilterMode::Nearest,
        ..default()
    });

    let shader = asset_server.load("shaders/deferred_light2d.wgsl");

    let pipeline_id = pipeline_cache.queue_render_pipeline(RenderPipelineDescriptor {
        label: Some("deferred_light2d_pipeline".into()),
        layout: vec![gbuffer_layout.clone(), lights_layout.clone()],
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
            shader,
            shader_defs: vec![],
            entry_point: Some("fs_main".into()),
            targets: vec![Some(ColorTargetState {
                format: GBUFFER_LIGHT_FORMAT,
                blend: Some(ADDITIVE_BLEND),
                write_mask: ColorWrites::COLOR,
            })],
        }),
        zero_initialize_workgroup_memory: false,
    });

    commands.insert_resource(LightPassPipeline {
        pipeline_id,
        gbuffer_layout,
        lights_layout,
        sampler,
    });
}

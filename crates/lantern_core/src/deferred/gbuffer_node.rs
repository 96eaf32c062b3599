//! Sprite G-buffer render graph node.
//!
//! Renders every extracted sprite into the color attachments of the active
//! fragment output layout, one attachment per channel:
//! - `Offscreen`: diffuse, normal, light
//! - `Screen`: view target, diffuse, normal, light
//!
//! Sprites are drawn in batches that share an image, in depth order.

use bevy::prelude::*;
use bevy::render::{
    camera::ExtractedCamera,
    render_graph::{NodeRunError, RenderGraphContext, ViewNode},
    render_resource::{
        IndexFormat, LoadOp, Operations, PipelineCache, RenderPassColorAttachment,
        RenderPassDepthStencilAttachment, RenderPassDescriptor, StoreOp,
    },
    renderer::RenderContext,
    view::ViewTarget,
};

use super::gbuffer::{channel_clear, supports_view_target, ViewGBufferTextures, GBUFFER_DEPTH_CLEAR};
use super::lighting::DeferredLightingConfig;
use super::prepare::ViewDeferredUniforms;
use super::sprite::SpriteDrawData;
use super::sprite_pipeline::{SpriteGBufferPipeline, SpriteImageBindGroups};

/// Render graph node that renders sprites to the G-buffer.
///
/// The pass always runs so the attachments are cleared even before the
/// pipeline has finished compiling.
#[derive(Default)]
pub struct SpriteGBufferPassNode;

impl ViewNode for SpriteGBufferPassNode {
    type ViewQuery = (
        &'static ExtractedCamera,
        &'static ViewTarget,
        &'static ViewGBufferTextures,
        &'static ViewDeferredUniforms,
    );

    fn run<'w>(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext<'w>,
        (camera, target, gbuffer, uniforms): bevy::ecs::query::QueryItem<'w, '_, Self::ViewQuery>,
        world: &'w World,
    ) -> Result<(), NodeRunError> {
        let view_format = target.main_texture_format();
        if !supports_view_target(view_format, target.sampled_main_texture_view().is_some()) {
            warn_once!(
                "Deferred sprite lighting needs Msaa::Off and an SDR or HDR view target, got {:?}",
                view_format
            );
            return Ok(());
        }

        let config = world
            .get_resource::<DeferredLightingConfig>()
            .cloned()
            .unwrap_or_default();

        // One attachment per fragment output channel, in attachment order
        let color_attachments: Vec<Option<RenderPassColorAttachment>> = config
            .target
            .channels()
            .iter()
            .map(|channel| {
                let view = gbuffer
                    .channel_view(channel.role)
                    .unwrap_or_else(|| target.main_texture_view());
                Some(RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(channel_clear(channel.role, config.clear_color)),
                        store: StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();

        let mut render_pass = render_context.begin_tracked_render_pass(RenderPassDescriptor {
            label: Some("sprite_gbuffer_pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &gbuffer.depth.default_view,
                depth_ops: Some(Operations {
                    load: LoadOp::Clear(GBUFFER_DEPTH_CLEAR),
                    store: StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if let Some(viewport) = &camera.viewport {
            render_pass.set_camera_viewport(viewport);
        }

        let pipeline_cache = world.resource::<PipelineCache>();
        let Some(sprite_pipeline) = world.get_resource::<SpriteGBufferPipeline>() else {
            return Ok(());
        };
        let Some(pipeline_id) = sprite_pipeline.pipeline_id(config.target, view_format) else {
            return Ok(());
        };
        let Some(pipeline) = pipeline_cache.get_render_pipeline(pipeline_id) else {
            // Pipeline still compiling
            return Ok(());
        };
        let (Some(draw_data), Some(image_bind_groups)) = (
            world.get_resource::<SpriteDrawData>(),
            world.get_resource::<SpriteImageBindGroups>(),
        ) else {
            return Ok(());
        };
        let (Some(vertex_buffer), Some(index_buffer)) =
            (&draw_data.vertex_buffer, &draw_data.index_buffer)
        else {
            return Ok(());
        };

        render_pass.set_render_pipeline(pipeline);
        render_pass.set_bind_group(0, &uniforms.bind_group, &[]);
        render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        render_pass.set_index_buffer(index_buffer.slice(..), 0, IndexFormat::Uint16);

        for batch in &draw_data.batches {
            let Some(bind_group) = image_bind_groups.get(batch.image) else {
                // Image not uploaded yet
                continue;
            };
            render_pass.set_bind_group(1, bind_group, &[]);
            render_pass.draw_indexed(batch.indices.clone(), 0, 0..1);
        }

        Ok(())
    }
}

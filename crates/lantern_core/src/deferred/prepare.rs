//! Prepare phase systems for deferred sprite lighting.
//!
//! These systems run in the Render schedule's PrepareResources phase to set
//! up the per-view GPU resources used by every deferred pass.

use bevy::prelude::*;
use bevy::render::{
    camera::ExtractedCamera,
    render_resource::{BindGroup, BindGroupEntry, Buffer, BufferInitDescriptor, BufferUsages, Extent3d},
    renderer::RenderDevice,
    texture::TextureCache,
    view::ExtractedView,
};

use super::gbuffer::{DeferredCamera, ViewGBufferTextures};
use super::sprite_pipeline::{DeferredViewUniform, SpriteGBufferPipeline};

/// Per-view uniform buffer and bind group.
///
/// The light and composition passes bind `buffer` in their own layouts.
#[derive(Component)]
pub struct ViewDeferredUniforms {
    pub buffer: Buffer,
    pub bind_group: BindGroup,
}

/// System to create/resize G-buffer textures for deferred cameras.
pub fn prepare_gbuffer_textures(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    mut texture_cache: ResMut<TextureCache>,
    cameras: Query<(Entity, &ExtractedCamera), With<DeferredCamera>>,
    existing: Query<&ViewGBufferTextures>,
) {
    for (entity, camera) in cameras.iter() {
        let Some(physical_size) = camera.physical_viewport_size else {
            continue;
        };

        let size = Extent3d {
            width: physical_size.x,
            height: physical_size.y,
            depth_or_array_layers: 1,
        };

        // Check if we need to recreate (size changed or doesn't exist)
        let needs_create = match existing.get(entity) {
            Ok(existing_textures) => existing_textures.size != size,
            Err(_) => true,
        };

        if needs_create {
            debug!("Creating G-buffer textures {}x{}", size.width, size.height);
            let textures = ViewGBufferTextures::new(&render_device, &mut texture_cache, size);
            commands.entity(entity).insert(textures);
        }
    }
}

/// System to prepare view uniforms for each deferred camera.
pub fn prepare_deferred_view_uniforms(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    pipeline: Option<Res<SpriteGBufferPipeline>>,
    cameras: Query<(Entity, &ExtractedCamera, &ExtractedView), With<DeferredCamera>>,
) {
    let Some(pipeline) = pipeline else {
        return;
    };

    for (entity, camera, view) in cameras.iter() {
        if camera.physical_viewport_size.is_none() {
            continue;
        }

        let view_from_world = view.world_from_view.to_matrix().inverse();
        let clip_from_world = view
            .clip_from_world
            .unwrap_or(view.clip_from_view * view_from_world);

        let view_uniform = DeferredViewUniform::new(clip_from_world);

        let buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("deferred_view_uniform"),
            contents: bytemuck::bytes_of(&view_uniform),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        let bind_group = render_device.create_bind_group(
            Some("deferred_view_bind_group"),
            &pipeline.view_layout,
            &[BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        );

        commands
            .entity(entity)
            .insert(ViewDeferredUniforms { buffer, bind_group });
    }
}

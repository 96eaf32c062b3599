//! Deferred lighting plugin for Bevy.
//!
//! Registers extraction, prepare systems and render graph nodes for the
//! sprite G-buffer, light and composition passes.

use bevy::core_pipeline::core_3d::graph::{Core3d, Node3d};
use bevy::prelude::*;
use bevy::render::{
    extract_component::ExtractComponentPlugin,
    extract_resource::ExtractResourcePlugin,
    render_graph::{RenderGraphExt, ViewNodeRunner},
    ExtractSchedule, Render, RenderApp, RenderSystems,
};

use super::composition_node::{
    init_composition_pipeline, prepare_composition_uniform, CompositionPassNode,
};
use super::gbuffer::DeferredCamera;
use super::gbuffer_node::SpriteGBufferPassNode;
use super::labels::DeferredLabel;
use super::light::{extract_lights, prepare_lights};
use super::light_node::{init_light_pipeline, LightPassNode};
use super::lighting::DeferredLightingConfig;
use super::prepare::{prepare_deferred_view_uniforms, prepare_gbuffer_textures};
use super::sprite::{extract_sprites, prepare_sprites, SpriteDrawData};
use super::sprite_pipeline::{
    init_sprite_gbuffer_pipeline, prepare_sprite_image_bind_groups, SpriteImageBindGroups,
};

/// Plugin that enables deferred lighting for [`DeferredSprite`](super::DeferredSprite)s.
///
/// ## Usage
///
/// ```rust,ignore
/// app.add_plugins(DeferredLightingPlugin);
///
/// // Mark cameras for deferred lighting
/// commands.spawn((
///     Camera3d::default(),
///     DeferredCamera,
/// ));
/// ```
pub struct DeferredLightingPlugin;

impl Plugin for DeferredLightingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DeferredLightingConfig>();

        app.add_plugins(ExtractComponentPlugin::<DeferredCamera>::default());

        // Config can change at runtime (ambient, target layout)
        app.add_plugins(ExtractResourcePlugin::<DeferredLightingConfig>::default());

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            warn!("RenderApp not found - deferred lighting disabled");
            return;
        };

        render_app
            .init_resource::<SpriteDrawData>()
            .init_resource::<SpriteImageBindGroups>();

        render_app.add_systems(ExtractSchedule, (extract_sprites, extract_lights));

        // Pipeline initialization systems
        render_app.add_systems(
            Render,
            (
                init_sprite_gbuffer_pipeline.in_set(RenderSystems::Prepare),
                init_light_pipeline.in_set(RenderSystems::Prepare),
                init_composition_pipeline.in_set(RenderSystems::Prepare),
            ),
        );

        render_app.add_systems(
            Render,
            (
                prepare_gbuffer_textures.in_set(RenderSystems::PrepareResources),
                prepare_deferred_view_uniforms
                    .in_set(RenderSystems::PrepareResources)
                    .after(init_sprite_gbuffer_pipeline),
                prepare_sprites.in_set(RenderSystems::PrepareResources),
                prepare_sprite_image_bind_groups
                    .in_set(RenderSystems::PrepareResources)
                    .after(prepare_sprites)
                    .after(init_sprite_gbuffer_pipeline),
                prepare_lights.in_set(RenderSystems::PrepareResources),
                prepare_composition_uniform.in_set(RenderSystems::PrepareResources),
            ),
        );

        render_app
            .add_render_graph_node::<ViewNodeRunner<SpriteGBufferPassNode>>(
                Core3d,
                DeferredLabel::SpriteGBufferPass,
            )
            .add_render_graph_node::<ViewNodeRunner<LightPassNode>>(
                Core3d,
                DeferredLabel::LightPass,
            )
            .add_render_graph_node::<ViewNodeRunner<CompositionPassNode>>(
                Core3d,
                DeferredLabel::CompositionPass,
            );

        // Sprites run after the opaque pass so its clear does not wipe the
        // unlit color written in Screen mode
        render_app.add_render_graph_edges(
            Core3d,
            (
                Node3d::MainOpaquePass,
                DeferredLabel::SpriteGBufferPass,
                DeferredLabel::LightPass,
                DeferredLabel::CompositionPass,
                Node3d::MainTransparentPass,
            ),
        );

        info!("DeferredLightingPlugin initialized");
    }
}

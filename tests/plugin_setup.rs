use bevy::prelude::*;
use lantern_core::{
    DeferredLight2d, DeferredLightingConfig, DeferredLightingPlugin, DeferredSprite, GBufferTarget,
};

#[test]
fn test_plugin_without_renderer_inits_config() {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);

    // No RenderApp: the plugin only registers main world state
    app.add_plugins(DeferredLightingPlugin);
    app.update();

    let config = app.world().resource::<DeferredLightingConfig>();
    assert_eq!(config, &DeferredLightingConfig::default());
    assert_eq!(config.target, GBufferTarget::Offscreen);
}

#[test]
fn test_sprites_and_lights_get_transforms() {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);

    let sprite = app
        .world_mut()
        .spawn(DeferredSprite::new(Color::WHITE, Vec2::splat(16.0)))
        .id();
    let light = app
        .world_mut()
        .spawn(DeferredLight2d::new(Color::WHITE, 1.0, 100.0))
        .id();

    assert!(app.world().get::<Transform>(sprite).is_some());
    assert!(app.world().get::<Visibility>(sprite).is_some());
    assert!(app.world().get::<Transform>(light).is_some());
}

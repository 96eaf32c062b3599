//! Fragment output layouts against the public API and the sprite shader.

use lantern_core::deferred::{DeferredViewUniform, SpriteVertex, MAX_LIGHTS};
use lantern_core::{
    same_layout, validate_layout, wgsl_struct, ChannelRole, FragOutput, FragmentOutputLayout,
    GBufferOutput, GBufferTarget, ScreenGBufferOutput,
};

const SPRITE_SHADER: &str = include_str!("../assets/shaders/gbuffer_sprite.wgsl");
const LIGHT_SHADER: &str = include_str!("../assets/shaders/deferred_light2d.wgsl");

#[test]
fn test_builtin_layouts_are_valid() {
    assert_eq!(validate_layout::<GBufferOutput>(), Ok(()));
    assert_eq!(validate_layout::<ScreenGBufferOutput>(), Ok(()));
    assert!(same_layout::<FragOutput, GBufferOutput>());
    assert!(!same_layout::<GBufferOutput, ScreenGBufferOutput>());
}

#[test]
fn test_screen_layout_writes_view_target_first() {
    assert_eq!(ScreenGBufferOutput::attachment_for(ChannelRole::Output), Some(0));
    assert_eq!(GBufferOutput::attachment_for(ChannelRole::Output), None);

    for role in [ChannelRole::Diffuse, ChannelRole::Normal, ChannelRole::Light] {
        let offscreen = GBufferOutput::attachment_for(role).unwrap();
        let screen = ScreenGBufferOutput::attachment_for(role).unwrap();
        assert_eq!(screen, offscreen + 1, "{:?}", role);
    }
}

#[test]
fn test_value_lands_in_attachment_slots() {
    let gbuffer = GBufferOutput {
        diffuse: [1.0, 0.5, 0.25, 1.0],
        normal: [0.5, 0.5, 1.0, 1.0],
        light: [0.0, 0.0, 0.0, 1.0],
    };
    let screen = ScreenGBufferOutput::from_gbuffer([0.2, 0.2, 0.2, 1.0], gbuffer);

    assert_eq!(gbuffer.attachment(0), Some(gbuffer.diffuse));
    assert_eq!(screen.attachment(0), Some([0.2, 0.2, 0.2, 1.0]));
    assert_eq!(screen.attachment(1), Some(gbuffer.diffuse));
    assert_eq!(screen.attachment_bytes(3), gbuffer.attachment_bytes(2));
    assert_eq!(screen.attachment(4), None);
}

#[test]
fn test_targets_select_layouts() {
    assert_eq!(GBufferTarget::Offscreen.channels(), GBufferOutput::CHANNELS);
    assert_eq!(GBufferTarget::Screen.channels(), ScreenGBufferOutput::CHANNELS);
    assert_eq!(
        GBufferTarget::Screen.shader_def(),
        ScreenGBufferOutput::SHADER_DEF
    );
}

#[test]
fn test_sprite_shader_declares_both_layouts() {
    let offscreen = wgsl_struct::<GBufferOutput>("FragOutput");
    let screen = wgsl_struct::<ScreenGBufferOutput>("FragOutput");

    assert!(SPRITE_SHADER.contains(&offscreen), "missing:\n{}", offscreen);
    assert!(SPRITE_SHADER.contains(&screen), "missing:\n{}", screen);

    // The screen struct is the one behind the shader def
    let def = ScreenGBufferOutput::SHADER_DEF.unwrap();
    let guarded = format!("#ifdef {}\n{}", def, screen);
    assert!(SPRITE_SHADER.contains(&guarded));
}

#[test]
fn test_light_shader_capacity_matches() {
    let declared = format!("const MAX_LIGHTS: u32 = {}u;", MAX_LIGHTS);
    assert!(LIGHT_SHADER.contains(&declared));
}

fn view_struct(shader: &str) -> &str {
    let start = shader.find("struct View {").expect("View struct");
    let end = start + shader[start..].find('}').expect("closing brace");
    &shader[start..=end]
}

#[test]
fn test_shaders_share_view_uniform() {
    let sprite_view = view_struct(SPRITE_SHADER);
    assert_eq!(sprite_view, view_struct(LIGHT_SHADER));
    assert_eq!(sprite_view.matches("mat4x4<f32>").count(), 2);
    assert_eq!(std::mem::size_of::<DeferredViewUniform>(), 2 * 64);
}

#[test]
fn test_sprite_shader_samples_texture() {
    let attributes = SpriteVertex::vertex_buffer_layout().attributes;
    for attribute in &attributes {
        let location = format!("@location({})", attribute.shader_location);
        assert!(SPRITE_SHADER.contains(&location), "{}", location);
    }
    assert!(SPRITE_SHADER.contains("@location(1) uv: vec2<f32>"));
    assert!(SPRITE_SHADER.contains("@group(1) @binding(0) var sprite_texture: texture_2d<f32>;"));
    assert!(SPRITE_SHADER.contains("textureSample(sprite_texture, sprite_sampler, in.uv) * in.color"));
}

//! Deferred lighting configuration.

use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use serde::{Deserialize, Serialize};

use crate::frag_output::{
    ChannelRole, FragmentOutputLayout, GBufferOutput, OutputChannel, ScreenGBufferOutput,
};

/// Which fragment output layout the sprite pass writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GBufferTarget {
    /// [`GBufferOutput`]: diffuse, normal and light go to offscreen textures.
    /// Composition samples diffuse and writes the view target.
    #[default]
    Offscreen,
    /// [`ScreenGBufferOutput`]: the unlit color also goes straight to the view
    /// target at attachment 0. Composition multiplies lighting into it.
    Screen,
}

impl GBufferTarget {
    pub fn channels(self) -> &'static [OutputChannel] {
        match self {
            GBufferTarget::Offscreen => GBufferOutput::CHANNELS,
            GBufferTarget::Screen => ScreenGBufferOutput::CHANNELS,
        }
    }

    pub fn shader_def(self) -> Option<&'static str> {
        match self {
            GBufferTarget::Offscreen => GBufferOutput::SHADER_DEF,
            GBufferTarget::Screen => ScreenGBufferOutput::SHADER_DEF,
        }
    }

    /// Whether the sprite pass writes the view target itself.
    pub fn writes_view_target(self) -> bool {
        self.channels()
            .iter()
            .any(|channel| channel.role == ChannelRole::Output)
    }
}

/// Configuration for deferred lighting.
///
/// Colors are linear RGBA.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize, ExtractResource)]
#[serde(default)]
pub struct DeferredLightingConfig {
    /// Light every surface receives before point lights are added
    pub ambient: [f32; 4],
    /// View target clear color where no sprite was drawn
    pub clear_color: [f32; 4],
    /// Fragment output layout for the sprite pass
    pub target: GBufferTarget,
}

impl Default for DeferredLightingConfig {
    fn default() -> Self {
        Self {
            ambient: [0.1, 0.1, 0.12, 1.0],
            clear_color: [0.0, 0.0, 0.0, 1.0],
            target: GBufferTarget::Offscreen,
        }
    }
}

impl DeferredLightingConfig {
    pub fn with_target(mut self, target: GBufferTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_ambient(mut self, color: Color) -> Self {
        let linear = color.to_linear();
        self.ambient = [linear.red, linear.green, linear.blue, linear.alpha];
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target_is_offscreen() {
        let config = DeferredLightingConfig::default();
        assert_eq!(config.target, GBufferTarget::Offscreen);
        assert!(!config.target.writes_view_target());
        assert_eq!(config.target.shader_def(), None);
    }

    #[test]
    fn test_screen_target_selects_screen_layout() {
        let target = GBufferTarget::Screen;
        assert!(target.writes_view_target());
        assert_eq!(target.channels().len(), 4);
        assert_eq!(target.shader_def(), Some("SCREEN_OUTPUT"));
    }

    #[test]
    fn test_builder_helpers() {
        let config = DeferredLightingConfig::default()
            .with_target(GBufferTarget::Screen)
            .with_ambient(Color::linear_rgba(0.2, 0.3, 0.4, 1.0));
        assert_eq!(config.target, GBufferTarget::Screen);
        assert_eq!(config.ambient, [0.2, 0.3, 0.4, 1.0]);
    }
}

//! Render graph labels for the deferred sprite lighting pipeline.

use bevy::render::render_graph::RenderLabel;

/// Labels for deferred rendering nodes in the render graph.
#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub enum DeferredLabel {
    /// Sprite pass: renders sprites to the fragment output attachments (MRT)
    SpriteGBufferPass,
    /// Light pass: fullscreen triangle accumulating point lights into the light attachment
    LightPass,
    /// Composition pass: diffuse * (ambient + light) into the view target
    CompositionPass,
}

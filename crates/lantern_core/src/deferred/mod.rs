//! Deferred 2D lighting for sprites.
//!
//! This module adds three passes to the `Core3d` render graph:
//!
//! ## Pipeline Overview
//!
//! ```text
//! ┌─────────────────────┐
//! │ Sprite G-Buffer Pass│  ← Sprites to MRT (diffuse, normal, light)
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │     Light Pass      │  ← Fullscreen triangle, adds point lights into light
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │  Composition Pass   │  ← diffuse * (ambient + light) into the ViewTarget
//! └─────────────────────┘
//! ```
//!
//! ## G-Buffer Layout
//!
//! - **diffuse** (RGBA8): sprite color, alpha = coverage
//! - **normal** (RGBA8): surface normal packed into `[0, 1]`, A = 1
//! - **light** (RGBA16F): emission from the sprite pass plus light accumulation
//!
//! With [`GBufferTarget::Screen`] the sprite pass also writes the unlit color
//! to the view target at attachment 0 (see [`crate::frag_output`]).
//!
//! ## Usage
//!
//! ```rust,ignore
//! app.add_plugins(DeferredLightingPlugin);
//!
//! commands.spawn((Camera3d::default(), DeferredCamera));
//! commands.spawn(DeferredSprite::new(Color::WHITE, Vec2::splat(32.0)));
//! commands.spawn(DeferredLight2d::new(Color::srgb(1.0, 0.8, 0.5), 2.0, 200.0));
//! ```

mod composition_node;
mod gbuffer;
mod gbuffer_node;
mod labels;
mod light;
mod light_node;
mod lighting;
mod plugin;
mod prepare;
mod sprite;
mod sprite_pipeline;

pub use composition_node::*;
pub use gbuffer::*;
pub use gbuffer_node::*;
pub use labels::*;
pub use light::*;
pub use light_node::*;
pub use lighting::*;
pub use plugin::*;
pub use prepare::*;
pub use sprite::*;
pub use sprite_pipeline::*;

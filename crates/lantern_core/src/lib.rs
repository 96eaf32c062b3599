//! Core types and rendering for Lantern.
//!
//! This crate provides:
//! - Fragment output layouts shared by the Rust and WGSL sides of the G-buffer pass
//! - Deferred 2D lighting for sprites (G-buffer, light and composition passes)
//! - Lighting configuration persistence

pub mod config;
pub mod deferred;
pub mod frag_output;

pub use config::{load_lighting_config, save_lighting_config, ConfigError, ConfigResult};
pub use deferred::{
    DeferredCamera, DeferredLabel, DeferredLight2d, DeferredLightingConfig, DeferredLightingPlugin,
    DeferredSprite, GBufferTarget,
};
pub use frag_output::{
    same_layout, validate_layout, wgsl_struct, ChannelRole, FragOutput, FragmentOutputLayout,
    GBufferOutput, LayoutError, OutputChannel, ScreenGBufferOutput,
};

//! Sprites rendered into the G-buffer.
//!
//! A sprite is a quad tinted by `color`. With an `image` the texture is
//! sampled and multiplied by the tint; without one a white texel is used.
//!
//! ## Usage
//!
//! ```rust,ignore
//! commands.spawn((
//!     DeferredSprite::new(Color::srgb(0.8, 0.3, 0.2), Vec2::splat(32.0)),
//!     Transform::from_xyz(0.0, 0.0, 1.0),
//! ));
//!
//! commands.spawn((
//!     DeferredSprite::from_image(asset_server.load("crate.png"), Vec2::splat(64.0)),
//!     Transform::from_xyz(80.0, 0.0, 2.0),
//! ));
//! ```

use std::ops::Range;

use bevy::prelude::*;
use bevy::render::{
    render_resource::{Buffer, BufferInitDescriptor, BufferUsages},
    renderer::RenderDevice,
    Extract,
};
use bevy_mesh::{VertexBufferLayout, VertexFormat};
use bytemuck::{Pod, Zeroable};

use super::gbuffer::encode_normal;

/// Largest sprite count addressable with `u16` indices (4 vertices per quad).
pub const MAX_SPRITES: usize = (u16::MAX as usize + 1) / VERTICES_PER_QUAD;

pub const VERTICES_PER_QUAD: usize = 4;
pub const INDICES_PER_QUAD: usize = 6;

/// Texture coordinates of the quad corners, in [`ExtractedSprite::vertices`]
/// order. Image rows run top to bottom, so the bottom edge samples `v = 1`.
pub const QUAD_UVS: [[f32; 2]; VERTICES_PER_QUAD] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

/// A quad lit by deferred lights, optionally textured.
#[derive(Component, Clone, Debug)]
#[require(Transform, Visibility)]
pub struct DeferredSprite {
    /// Tint multiplied with the image (or used as is without one).
    pub color: Color,
    /// Quad size in world units, centered on the transform.
    pub size: Vec2,
    /// Surface normal in local space. `Vec3::Z` faces the camera.
    pub normal: Vec3,
    /// How much of the diffuse color is written to the light channel as self-illumination.
    pub emissive: f32,
    pub image: Option<Handle<Image>>,
}

impl Default for DeferredSprite {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            size: Vec2::ONE,
            normal: Vec3::Z,
            emissive: 0.0,
            image: None,
        }
    }
}

impl DeferredSprite {
    pub fn new(color: Color, size: Vec2) -> Self {
        Self {
            color,
            size,
            ..default()
        }
    }

    /// Textured sprite with a white tint.
    pub fn from_image(image: Handle<Image>, size: Vec2) -> Self {
        Self {
            size,
            image: Some(image),
            ..default()
        }
    }

    pub fn with_image(mut self, image: Handle<Image>) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_normal(mut self, normal: Vec3) -> Self {
        self.normal = normal;
        self
    }

    pub fn with_emissive(mut self, emissive: f32) -> Self {
        self.emissive = emissive;
        self
    }
}

/// Vertex format for the sprite G-buffer pass.
/// Must match `VertexInput` in gbuffer_sprite.wgsl
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
    /// Packed normal (xyz), w = emissive
    pub normal_emissive: [f32; 4],
}

impl SpriteVertex {
    pub fn vertex_buffer_layout() -> VertexBufferLayout {
        VertexBufferLayout::from_vertex_formats(
            wgpu::VertexStepMode::Vertex,
            [
                VertexFormat::Float32x3, // Position
                VertexFormat::Float32x2, // UV
                VertexFormat::Float32x4, // Color
                VertexFormat::Float32x4, // Normal + emissive
            ],
        )
    }
}

/// Index list for `count` quads: `(0, 1, 2, 2, 3, 0)` per quad, offset by
/// four vertices each.
pub fn quad_indices(count: usize) -> Vec<u16> {
    let count = count.min(MAX_SPRITES);
    let mut indices = Vec::with_capacity(count * INDICES_PER_QUAD);
    for quad in 0..count {
        let base = (quad * VERTICES_PER_QUAD) as u16;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    indices
}

/// Extracted sprite data in the render world.
#[derive(Clone, Debug)]
pub struct ExtractedSprite {
    pub world_from_local: Mat4,
    pub size: Vec2,
    /// Linear RGBA
    pub color: [f32; 4],
    pub normal: Vec3,
    pub emissive: f32,
    /// `None` draws with the white fallback texture.
    pub image: Option<AssetId<Image>>,
}

impl ExtractedSprite {
    fn depth(&self) -> f32 {
        self.world_from_local.w_axis.z
    }

    /// Four corners counter-clockwise from bottom-left.
    pub fn vertices(&self) -> [SpriteVertex; VERTICES_PER_QUAD] {
        let half = self.size * 0.5;
        let world_normal = self
            .world_from_local
            .transform_vector3(self.normal)
            .normalize_or(Vec3::Z);
        let mut normal_emissive = encode_normal(world_normal);
        normal_emissive[3] = self.emissive;

        let corner = |x: f32, y: f32, uv: [f32; 2]| SpriteVertex {
            position: self
                .world_from_local
                .transform_point3(Vec3::new(x, y, 0.0))
                .to_array(),
            uv,
            color: self.color,
            normal_emissive,
        };

        [
            corner(-half.x, -half.y, QUAD_UVS[0]),
            corner(half.x, -half.y, QUAD_UVS[1]),
            corner(half.x, half.y, QUAD_UVS[2]),
            corner(-half.x, half.y, QUAD_UVS[3]),
        ]
    }
}

/// Resource holding the sprites extracted for the current frame.
#[derive(Resource, Default)]
pub struct ExtractedSprites {
    pub sprites: Vec<ExtractedSprite>,
}

/// Consecutive quads drawn with the same image.
#[derive(Clone, Debug, PartialEq)]
pub struct SpriteBatch {
    pub image: Option<AssetId<Image>>,
    /// Range into the shared quad index buffer
    pub indices: Range<u32>,
}

/// Build the vertex list for a frame, far sprites first, and split it into
/// batches wherever the image changes.
///
/// Draw order is kept: two sprites with the same image separated in depth by
/// a different image land in separate batches.
pub fn build_sprite_batches(sprites: &[ExtractedSprite]) -> (Vec<SpriteVertex>, Vec<SpriteBatch>) {
    let mut ordered: Vec<&ExtractedSprite> = sprites.iter().take(MAX_SPRITES).collect();
    ordered.sort_by(|a, b| a.depth().total_cmp(&b.depth()));

    let mut vertices = Vec::with_capacity(ordered.len() * VERTICES_PER_QUAD);
    let mut batches: Vec<SpriteBatch> = Vec::new();

    for (quad, sprite) in ordered.into_iter().enumerate() {
        vertices.extend_from_slice(&sprite.vertices());

        let end = ((quad + 1) * INDICES_PER_QUAD) as u32;
        match batches.last_mut() {
            Some(batch) if batch.image == sprite.image => batch.indices.end = end,
            _ => batches.push(SpriteBatch {
                image: sprite.image,
                indices: (quad * INDICES_PER_QUAD) as u32..end,
            }),
        }
    }

    (vertices, batches)
}

/// GPU buffers for the current frame's sprites.
#[derive(Resource, Default)]
pub struct SpriteDrawData {
    pub vertex_buffer: Option<Buffer>,
    pub index_buffer: Option<Buffer>,
    /// Quads the index buffer can address
    pub index_capacity: usize,
    pub batches: Vec<SpriteBatch>,
}

/// System to extract visible sprites from main world to render world.
pub fn extract_sprites(
    mut commands: Commands,
    sprites_query: Extract<Query<(&GlobalTransform, &DeferredSprite, &InheritedVisibility)>>,
) {
    let mut extracted = ExtractedSprites::default();

    for (transform, sprite, visibility) in sprites_query.iter() {
        if !visibility.get() {
            continue;
        }

        let color = sprite.color.to_linear();
        extracted.sprites.push(ExtractedSprite {
            world_from_local: transform.to_matrix(),
            size: sprite.size,
            color: [color.red, color.green, color.blue, color.alpha],
            normal: sprite.normal,
            emissive: sprite.emissive,
            image: sprite.image.as_ref().map(|handle| handle.id()),
        });
    }

    commands.insert_resource(extracted);
}

/// System to upload sprite vertices and grow the shared index buffer.
pub fn prepare_sprites(
    render_device: Res<RenderDevice>,
    extracted: Option<Res<ExtractedSprites>>,
    mut draw_data: ResMut<SpriteDrawData>,
) {
    let sprites = extracted.as_ref().map(|e| e.sprites.as_slice()).unwrap_or(&[]);

    if sprites.len() > MAX_SPRITES {
        warn_once!(
            "Too many deferred sprites ({} > {}), extras ignored",
            sprites.len(),
            MAX_SPRITES
        );
    }

    let (vertices, batches) = build_sprite_batches(sprites);
    let quad_count = vertices.len() / VERTICES_PER_QUAD;
    draw_data.batches = batches;

    if quad_count == 0 {
        draw_data.vertex_buffer = None;
        return;
    }

    draw_data.vertex_buffer = Some(render_device.create_buffer_with_data(
        &BufferInitDescriptor {
            label: Some("sprite_vertex_buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: BufferUsages::VERTEX,
        },
    ));

    // Indices only depend on the quad count, so the buffer is reused until it is too small
    if draw_data.index_buffer.is_none() || draw_data.index_capacity < quad_count {
        let capacity = quad_count.next_power_of_two().min(MAX_SPRITES);
        draw_data.index_buffer = Some(render_device.create_buffer_with_data(
            &BufferInitDescriptor {
                label: Some("sprite_index_buffer"),
                contents: bytemuck::cast_slice(&quad_indices(capacity)),
                usage: BufferUsages::INDEX,
            },
        ));
        draw_data.index_capacity = capacity;
        debug!("Sprite index buffer sized for {} quads", capacity);
    }
}

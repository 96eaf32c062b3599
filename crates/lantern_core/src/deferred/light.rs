//! 2D point lights for deferred sprite lighting.
//!
//! Lights are added as Bevy components and extracted to the render world,
//! where they're packed into a storage buffer read by the light pass.
//!
//! ## Usage
//!
//! ```rust,ignore
//! commands.spawn((
//!     DeferredLight2d {
//!         color: Color::srgb(1.0, 0.6, 0.3),
//!         intensity: 2.0,
//!         radius: 200.0,
//!         height: 40.0,
//!     },
//!     Transform::from_xyz(50.0, 20.0, 0.0),
//! ));
//! ```

use bevy::prelude::*;
use bevy::render::{
    render_resource::{Buffer, BufferInitDescriptor, BufferUsages},
    renderer::RenderDevice,
    Extract,
};
use bytemuck::{Pod, Zeroable};

/// Maximum number of lights supported by the shader.
/// This must match MAX_LIGHTS in deferred_light2d.wgsl
pub const MAX_LIGHTS: usize = 256;

/// Point light in the sprite plane.
#[derive(Component, Clone, Debug)]
#[require(Transform)]
pub struct DeferredLight2d {
    pub color: Color,
    pub intensity: f32,
    /// Light falls off to zero at this distance.
    pub radius: f32,
    /// Distance above the sprite plane; flattens lighting on normals facing the camera.
    pub height: f32,
}

impl Default for DeferredLight2d {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 1.0,
            radius: 100.0,
            height: 20.0,
        }
    }
}

impl DeferredLight2d {
    pub fn new(color: Color, intensity: f32, radius: f32) -> Self {
        Self {
            color,
            intensity,
            radius,
            ..default()
        }
    }
}

/// Extracted light data in render world.
#[derive(Clone, Debug)]
pub struct ExtractedLight2d {
    pub position: Vec2,
    /// Linear RGB
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub height: f32,
}

/// GPU-side light data.
/// Must match `Light2d` in deferred_light2d.wgsl
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuLight2d {
    /// xy = position, z = height, w = radius
    pub position_height_radius: [f32; 4],
    /// rgb = color, w = intensity
    pub color_intensity: [f32; 4],
}

impl From<&ExtractedLight2d> for GpuLight2d {
    fn from(light: &ExtractedLight2d) -> Self {
        Self {
            position_height_radius: [
                light.position.x,
                light.position.y,
                light.height,
                light.radius,
            ],
            color_intensity: [light.color.x, light.color.y, light.color.z, light.intensity],
        }
    }
}

/// Storage buffer header containing the light count.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct LightsHeader {
    /// Number of active lights (x), padding (yzw)
    pub count: [u32; 4],
}

/// CPU mirror of the light storage buffer.
#[derive(Clone, Default)]
pub struct LightsStorage {
    pub header: LightsHeader,
    pub lights: Vec<GpuLight2d>,
}

impl LightsStorage {
    /// Pack up to [`MAX_LIGHTS`] lights.
    pub fn from_lights(lights: &[ExtractedLight2d]) -> Self {
        let lights: Vec<GpuLight2d> = lights.iter().take(MAX_LIGHTS).map(GpuLight2d::from).collect();
        Self {
            header: LightsHeader {
                count: [lights.len() as u32, 0, 0, 0],
            },
            lights,
        }
    }

    /// Convert to bytes for GPU upload.
    /// Layout: [header (16 bytes)] [lights (32 bytes each)], always sized for
    /// MAX_LIGHTS so the buffer size is stable across frames.
    pub fn to_bytes(&self) -> Vec<u8> {
        let light_size = std::mem::size_of::<GpuLight2d>();
        let mut bytes = Vec::with_capacity(16 + MAX_LIGHTS * light_size);
        bytes.extend_from_slice(bytemuck::bytes_of(&self.header));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.lights));
        bytes.resize(16 + MAX_LIGHTS * light_size, 0);
        bytes
    }
}

/// Light added to a surface at `surface_pos` with `surface_normal`.
///
/// Same falloff as deferred_light2d.wgsl: `(1 - d/r)^2 * intensity * max(N.L, 0)`
/// where `d` is the distance in the sprite plane and `L` points from the
/// surface to the light lifted by its height.
pub fn light_contribution(light: &ExtractedLight2d, surface_pos: Vec2, surface_normal: Vec3) -> Vec3 {
    let offset = light.position - surface_pos;
    let distance = offset.length();
    if light.radius <= 0.0 || distance >= light.radius {
        return Vec3::ZERO;
    }

    let falloff = (1.0 - distance / light.radius).powi(2);
    let to_light = offset.extend(light.height).normalize_or(Vec3::Z);
    let lambert = surface_normal.dot(to_light).max(0.0);

    light.color * light.intensity * falloff * lambert
}

/// Resource holding the light buffer for the current frame.
#[derive(Resource)]
pub struct LightsBuffer {
    pub buffer: Buffer,
    pub count: u32,
}

/// Resource to store extracted lights for the current frame.
#[derive(Resource, Default)]
pub struct ExtractedLights {
    pub lights: Vec<ExtractedLight2d>,
}

/// System to extract lights from main world to render world.
pub fn extract_lights(
    mut commands: Commands,
    lights_query: Extract<Query<(&GlobalTransform, &DeferredLight2d, Option<&InheritedVisibility>)>>,
) {
    let mut extracted = ExtractedLights::default();

    for (transform, light, visibility) in lights_query.iter() {
        if visibility.is_some_and(|v| !v.get()) {
            continue;
        }

        let color = light.color.to_linear();
        extracted.lights.push(ExtractedLight2d {
            position: transform.translation().truncate(),
            color: Vec3::new(color.red, color.green, color.blue),
            intensity: light.intensity,
            radius: light.radius,
            height: light.height,
        });
    }

    commands.insert_resource(extracted);
}

/// System to prepare the light storage buffer.
pub fn prepare_lights(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    extracted_lights: Option<Res<ExtractedLights>>,
) {
    let lights = extracted_lights
        .as_ref()
        .map(|e| e.lights.as_slice())
        .unwrap_or(&[]);

    if lights.len() > MAX_LIGHTS {
        warn_once!(
            "Too many deferred lights ({} > {}), extras ignored",
            lights.len(),
            MAX_LIGHTS
        );
    }

    let storage = LightsStorage::from_lights(lights);
    let count = storage.header.count[0];

    let buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("deferred_lights_storage"),
        contents: &storage.to_bytes(),
        usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
    });

    commands.insert_resource(LightsBuffer { buffer, count });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(position: Vec2, radius: f32) -> ExtractedLight2d {
        ExtractedLight2d {
            position,
            color: Vec3::ONE,
            intensity: 2.0,
            radius,
            height: 0.0,
        }
    }

    #[test]
    fn test_storage_layout() {
        let lights = [light(Vec2::new(1.0, 2.0), 10.0)];
        let storage = LightsStorage::from_lights(&lights);
        let bytes = storage.to_bytes();

        assert_eq!(std::mem::size_of::<GpuLight2d>(), 32);
        assert_eq!(bytes.len(), 16 + MAX_LIGHTS * 32);
        assert_eq!(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 1);

        let first: [f32; 8] = bytemuck::pod_read_unaligned(&bytes[16..48]);
        assert_eq!(first, [1.0, 2.0, 0.0, 10.0, 1.0, 1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_storage_caps_light_count() {
        let lights = vec![light(Vec2::ZERO, 1.0); MAX_LIGHTS + 5];
        let storage = LightsStorage::from_lights(&lights);
        assert_eq!(storage.header.count[0], MAX_LIGHTS as u32);
        assert_eq!(storage.to_bytes().len(), 16 + MAX_LIGHTS * 32);
    }

    #[test]
    fn test_light_contribution_falloff() {
        let l = light(Vec2::ZERO, 10.0);
        let facing_light = Vec3::new(-1.0, 0.0, 0.0);

        // Half way to the radius: (1 - 0.5)^2 * 2.0 = 0.5
        let lit = light_contribution(&l, Vec2::new(5.0, 0.0), facing_light);
        assert!((lit - Vec3::splat(0.5)).length() < 1e-5);

        // Outside the radius
        assert_eq!(light_contribution(&l, Vec2::new(10.0, 0.0), facing_light), Vec3::ZERO);
    }

    #[test]
    fn test_light_contribution_ignores_back_faces() {
        let l = light(Vec2::ZERO, 10.0);
        let facing_away = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(light_contribution(&l, Vec2::new(5.0, 0.0), facing_away), Vec3::ZERO);
    }

    #[test]
    fn test_light_height_lights_flat_surfaces() {
        let mut l = light(Vec2::ZERO, 10.0);
        assert_eq!(light_contribution(&l, Vec2::new(5.0, 0.0), Vec3::Z), Vec3::ZERO);

        l.height = 5.0;
        let lit = light_contribution(&l, Vec2::new(5.0, 0.0), Vec3::Z);
        // N.L = cos(45deg)
        let expected = 0.5 * std::f32::consts::FRAC_1_SQRT_2;
        assert!((lit.x - expected).abs() < 1e-5);
    }
}

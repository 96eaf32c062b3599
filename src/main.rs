use bevy::asset::RenderAssetUsages;
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use lantern_core::{
    load_lighting_config, DeferredCamera, DeferredLight2d, DeferredLightingConfig,
    DeferredLightingPlugin, DeferredSprite, GBufferTarget,
};
use rand::Rng;

const GRID_COLUMNS: i32 = 16;
const GRID_ROWS: i32 = 9;
const TILE_SIZE: f32 = 48.0;
const CHECKER_SIZE: u32 = 8;

/// Marks a light that circles `center`.
#[derive(Component)]
struct Orbit {
    center: Vec2,
    radius: f32,
    speed: f32,
    phase: f32,
}

fn main() {
    let config = lighting_config_from_args();

    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(DeferredLightingPlugin)
        .insert_resource(config)
        .add_systems(Startup, setup)
        .add_systems(Update, (orbit_lights, toggle_target))
        .run();
}

/// Parse command-line arguments.
///
/// Supported args:
/// - `--config <path>` - Load lighting config from a JSON file
/// - `--screen` - Write the unlit color straight to the view target
fn lighting_config_from_args() -> DeferredLightingConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = DeferredLightingConfig::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if let Some(path) = args.get(i + 1) {
                    match load_lighting_config(path) {
                        Ok(loaded) => config = loaded,
                        Err(e) => eprintln!("Warning: failed to load lighting config {}: {}", path, e),
                    }
                    i += 2;
                } else {
                    eprintln!("Warning: --config requires a path argument");
                    i += 1;
                }
            }
            "--screen" => {
                config = config.with_target(GBufferTarget::Screen);
                i += 1;
            }
            other => {
                eprintln!("Warning: unknown argument {}", other);
                i += 1;
            }
        }
    }

    config
}

fn setup(mut commands: Commands, mut images: ResMut<Assets<Image>>) {
    commands.spawn((
        Camera3d::default(),
        Projection::from(OrthographicProjection::default_2d()),
        Transform::from_xyz(0.0, 0.0, 100.0).looking_at(Vec3::ZERO, Vec3::Y),
        Msaa::Off,
        DeferredCamera,
    ));

    let mut rng = rand::thread_rng();
    let origin = Vec2::new(
        -(GRID_COLUMNS as f32 - 1.0) * TILE_SIZE * 0.5,
        -(GRID_ROWS as f32 - 1.0) * TILE_SIZE * 0.5,
    );

    for row in 0..GRID_ROWS {
        for column in 0..GRID_COLUMNS {
            let position = origin + Vec2::new(column as f32, row as f32) * TILE_SIZE;
            let shade = rng.gen_range(0.55..0.9);
            // Tilted normals so the tiles catch light unevenly
            let normal = Vec3::new(rng.gen_range(-0.4..0.4), rng.gen_range(-0.4..0.4), 1.0);

            commands.spawn((
                DeferredSprite::new(
                    Color::srgb(shade, shade, shade * 0.95),
                    Vec2::splat(TILE_SIZE - 4.0),
                )
                .with_normal(normal),
                Transform::from_translation(position.extend(0.0)),
            ));
        }
    }

    // A few glowing markers in front of the tiles
    for i in 0..4 {
        let x = (i as f32 - 1.5) * TILE_SIZE * 4.0;
        commands.spawn((
            DeferredSprite::new(Color::srgb(1.0, 0.6, 0.2), Vec2::splat(12.0)).with_emissive(2.0),
            Transform::from_xyz(x, 0.0, 1.0),
        ));
    }

    // Textured crates tinted by their sprite color
    let checker = images.add(checker_image());
    for i in 0..3 {
        let x = (i as f32 - 1.0) * TILE_SIZE * 2.0;
        commands.spawn((
            DeferredSprite::from_image(checker.clone(), Vec2::splat(TILE_SIZE))
                .with_normal(Vec3::new(0.0, 0.3, 1.0)),
            Transform::from_xyz(x, -TILE_SIZE * 2.0, 1.0),
        ));
    }

    let palette = [
        Color::srgb(1.0, 0.75, 0.4),
        Color::srgb(0.4, 0.7, 1.0),
        Color::srgb(0.9, 0.3, 0.6),
        Color::srgb(0.5, 1.0, 0.5),
    ];
    for (i, color) in palette.into_iter().enumerate() {
        commands.spawn((
            DeferredLight2d {
                height: 40.0,
                ..DeferredLight2d::new(color, 1.5, 260.0)
            },
            Orbit {
                center: Vec2::ZERO,
                radius: rng.gen_range(120.0..320.0),
                speed: rng.gen_range(0.3..0.8),
                phase: i as f32 * std::f32::consts::FRAC_PI_2,
            },
            Transform::default(),
        ));
    }

    info!("Spawned {} sprites", GRID_COLUMNS * GRID_ROWS + 7);
}

/// Two-tone checker texture with transparent corners.
fn checker_image() -> Image {
    let mut data = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
    let last = CHECKER_SIZE - 1;
    for y in 0..CHECKER_SIZE {
        for x in 0..CHECKER_SIZE {
            let corner = (x == 0 || x == last) && (y == 0 || y == last);
            let texel: [u8; 4] = if corner {
                [0, 0, 0, 0]
            } else if (x + y) % 2 == 0 {
                [200, 150, 90, 255]
            } else {
                [120, 80, 40, 255]
            };
            data.extend_from_slice(&texel);
        }
    }

    Image::new(
        Extent3d {
            width: CHECKER_SIZE,
            height: CHECKER_SIZE,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        data,
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::RENDER_WORLD,
    )
}

fn orbit_lights(time: Res<Time>, mut lights: Query<(&Orbit, &mut Transform)>) {
    let t = time.elapsed_secs();
    for (orbit, mut transform) in lights.iter_mut() {
        let angle = orbit.phase + t * orbit.speed;
        let offset = Vec2::new(angle.cos(), angle.sin()) * orbit.radius;
        transform.translation = (orbit.center + offset).extend(2.0);
    }
}

/// Space switches between the offscreen and screen output layouts.
fn toggle_target(keys: Res<ButtonInput<KeyCode>>, mut config: ResMut<DeferredLightingConfig>) {
    if keys.just_pressed(KeyCode::Space) {
        config.target = match config.target {
            GBufferTarget::Offscreen => GBufferTarget::Screen,
            GBufferTarget::Screen => GBufferTarget::Offscreen,
        };
        info!("G-buffer target: {:?}", config.target);
    }
}

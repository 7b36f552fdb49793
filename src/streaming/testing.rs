// src/streaming/testing.rs
//! Headless app harness for streaming tests: a 1-row grid of 100-unit chunks on z ∈ [0, 100].

use std::time::{Duration, Instant};

use bevy::prelude::*;

use super::core::{ChunkOffset, Player, Prefab, RestPose, TemplateId};
use super::grid::{build_world, BuildSummary, TemplateLibrary};
use super::layout::AxisBounds;
use super::materialize::{ObjectSpawner, PendingSpawns, StreamingSpawner};
use super::plugin::{ChunkStreamingPlugin, StreamingSettings};
use super::queue::LoadQueue;
use super::scene::{ChunkSettings, SpawnGroup, WorldSceneConfig};

pub const CHUNK: f32 = 100.0;

/// Placements of `template` at the given x positions (z = 10).
pub fn group(template: &str, xs: &[f32]) -> SpawnGroup {
    SpawnGroup {
        template: TemplateId::new(template),
        placements: xs.iter().map(|&x| RestPose::at(Vec3::new(x, 0.0, 10.0))).collect(),
    }
}

pub fn scene(chunks_x: u32, mask: Vec<ChunkOffset>, groups: Vec<SpawnGroup>) -> WorldSceneConfig {
    WorldSceneConfig {
        x_bounds: AxisBounds::new(0.0, CHUNK * chunks_x as f32),
        z_bounds: AxisBounds::new(0.0, CHUNK),
        chunks: ChunkSettings { chunk_size: CHUNK, load_mask: mask },
        spawn_objects: groups,
    }
}

pub fn app(spawner: impl ObjectSpawner, settings: StreamingSettings) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .insert_resource(settings)
        .add_plugins(ChunkStreamingPlugin)
        .insert_resource(StreamingSpawner::new(spawner));
    app
}

/// Register a prefab entity for `template` carrying `bundle`.
pub fn prefab(app: &mut App, template: &str, bundle: impl Bundle) -> Entity {
    let entity = app.world_mut().spawn((Prefab, bundle)).id();
    app.world_mut()
        .resource_mut::<TemplateLibrary>()
        .insert(TemplateId::new(template), entity);
    entity
}

pub fn build(app: &mut App, scene: &WorldSceneConfig) -> BuildSummary {
    build_world(app.world_mut(), scene).expect("world builds")
}

pub fn spawn_player(app: &mut App, x: f32) -> Entity {
    app.world_mut()
        .spawn((Player, Transform::from_xyz(x, 0.0, 10.0)))
        .id()
}

pub fn move_player(app: &mut App, player: Entity, x: f32) {
    app.world_mut().get_mut::<Transform>(player).expect("player exists").translation.x = x;
}

/// One simulation step.
pub fn step(app: &mut App) {
    app.world_mut().run_schedule(FixedUpdate);
}

/// Step until the queue is drained and every issued spawn has resolved.
pub fn settle(app: &mut App) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        step(app);
        let world = app.world();
        if world.resource::<LoadQueue>().is_empty() && world.resource::<PendingSpawns>().is_idle() {
            return;
        }
        assert!(Instant::now() < deadline, "spawns did not resolve in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Events written so far (nothing in these apps rotates event buffers).
pub fn events<E: Event + Clone>(app: &App) -> Vec<E> {
    app.world()
        .resource::<Events<E>>()
        .iter_current_update_events()
        .cloned()
        .collect()
}

use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;

use chasma_streaming::attributes::{AttributeValue, CharacteristicKind, Characteristics};
use chasma_streaming::streaming::{
    ChunkGrid, LocalSpawner, Player, Prefab, StreamingSet, StreamingSettings, StreamingSpawner,
    TemplateId, TemplateLibrary,
};
use chasma_streaming::streaming::residency::LoadedChunks;
use chasma_streaming::streaming::materialize::PendingSpawns;
use chasma_streaming::world_creator::WorldCreator;
use chasma_streaming::StreamingStackPlugin;

/// Walks a player around a closed loop of waypoints.
#[derive(Component)]
struct Patrol {
    waypoints: Vec<Vec3>,
    next: usize,
}

fn main() {
    let settings = StreamingSettings::default();
    let frame = Duration::from_secs_f64(1.0 / f64::from(settings.tick_rate));

    App::new()
        // headless: no window, no renderer
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(frame)))
        .add_plugins(LogPlugin::default())
        .add_plugins(AssetPlugin::default())
        .insert_resource(settings)
        .add_plugins(StreamingStackPlugin)
        .insert_resource(StreamingSpawner::new(LocalSpawner::new()))
        .add_systems(Startup, (register_prefabs, spawn_world_creator, spawn_players))
        .add_systems(FixedUpdate, patrol_players.before(StreamingSet))
        .add_systems(Update, log_residency)
        .run();
}

/// Startup: template entities the scene refers to.
fn register_prefabs(mut commands: Commands, mut library: ResMut<TemplateLibrary>) {
    use CharacteristicKind::*;

    let tree = commands.spawn((Prefab, Name::new("tree"))).id();
    let rock = commands.spawn((Prefab, Name::new("rock"))).id();
    let wolf = commands
        .spawn((
            Prefab,
            Name::new("wolf"),
            Characteristics::default()
                .with(Health, AttributeValue::new(0, 60, 60.0))
                .with(Stamina, AttributeValue::new(0, 40, 40.0))
                .with(Agility, AttributeValue::new(0, 20, 14.5)),
        ))
        .id();

    library.insert(TemplateId::new("tree"), tree);
    library.insert(TemplateId::new("rock"), rock);
    library.insert(TemplateId::new("wolf"), wolf);
}

fn spawn_world_creator(mut commands: Commands) {
    commands.spawn((WorldCreator::default(), Name::new("world creator")));
}

fn spawn_players(mut commands: Commands) {
    let loops = [
        vec![Vec3::new(-300.0, 0.0, -300.0), Vec3::new(300.0, 0.0, -300.0), Vec3::new(300.0, 0.0, 300.0)],
        vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(-350.0, 0.0, 200.0)],
        vec![Vec3::new(250.0, 0.0, 250.0), Vec3::new(250.0, 0.0, -250.0), Vec3::new(-250.0, 0.0, 0.0)],
    ];
    for (i, waypoints) in loops.into_iter().enumerate() {
        commands.spawn((
            Player,
            Name::new(format!("player {i}")),
            Transform::from_translation(waypoints[0]),
            Patrol { waypoints, next: 1 },
        ));
    }
}

/// Moves each player toward its next waypoint, x/z only.
fn patrol_players(time: Res<Time>, mut query: Query<(&mut Transform, &mut Patrol), With<Player>>) {
    const SPEED: f32 = 40.0;
    let step = SPEED * time.delta_secs();

    for (mut tf, mut patrol) in &mut query {
        if patrol.waypoints.is_empty() { continue; }
        let goal = patrol.waypoints[patrol.next % patrol.waypoints.len()];
        let to_goal = Vec3::new(goal.x - tf.translation.x, 0.0, goal.z - tf.translation.z);

        if to_goal.length() <= step {
            tf.translation.x = goal.x;
            tf.translation.z = goal.z;
            patrol.next = (patrol.next + 1) % patrol.waypoints.len();
        } else {
            tf.translation += to_goal.normalize_or_zero() * step;
        }
    }
}

/// Update: one status line every few seconds.
fn log_residency(
    time: Res<Time>,
    mut timer: Local<Option<Timer>>,
    grid: Res<ChunkGrid>,
    loaded: Res<LoadedChunks>,
    pending: Res<PendingSpawns>,
) {
    let timer = timer.get_or_insert_with(|| Timer::from_seconds(5.0, TimerMode::Repeating));
    if !timer.tick(time.delta()).just_finished() || !grid.is_built() { return; }

    info!(
        "{} of {} chunks resident, {} orphaned spawns in flight",
        loaded.occupied().count(),
        grid.chunk_count(),
        pending.orphan_count()
    );
}

// src/streaming/systems.rs
use bevy::log::warn_once;
use bevy::prelude::*;

use super::core::{ChunkCoord, Player, RestPose};
use super::grid::ChunkGrid;
use super::materialize::{issue_chunk_spawns, PendingSpawns, StreamingSpawner, UnloadChunk};
use super::plugin::{ChunkLoadCancelled, ChunkLoadQueued, ChunkLoadStarted, StreamingSettings};
use super::queue::{take_batch, LoadQueue, LoadThrottle, StreamingClock};
use super::residency::{plan_player_move, release_player, ChunkPlan, LoadedChunks, PlayerChunks};

pub fn advance_clock(mut clock: ResMut<StreamingClock>) {
    clock.tick += 1;
}

/// Per step: recompute each player's cell and diff only when it changed.
pub fn track_players(
    mut commands: Commands,
    grid: Res<ChunkGrid>,
    mut loaded: ResMut<LoadedChunks>,
    mut players: ResMut<PlayerChunks>,
    mut queue: ResMut<LoadQueue>,
    q_players: Query<(Entity, &Transform), With<Player>>,
    mut ev_queued: EventWriter<ChunkLoadQueued>,
    mut ev_cancelled: EventWriter<ChunkLoadCancelled>,
) {
    let Some(layout) = grid.layout() else { return };

    for (player, transform) in &q_players {
        let chunk = layout.chunk_at(transform.translation);
        if players.last_chunk(player) == Some(chunk) { continue; }

        let Some(plan) = plan_player_move(
            layout,
            grid.load_mask(),
            &mut loaded,
            &mut players,
            &mut queue,
            player,
            chunk,
        ) else {
            error!("Shouldn't happen, but chunk {chunk} for player {player} does not exist");
            continue;
        };

        debug!(
            "Player {player} entered chunk {chunk}: +{} queued, {} cancelled, {} to unload",
            plan.enqueued.len(),
            plan.cancelled.len(),
            plan.unload.len()
        );
        apply_plan(&mut commands, plan, &mut ev_queued, &mut ev_cancelled);
    }
}

/// Release the chunks of tracked players that despawned or lost the `Player` marker.
pub fn release_departed_players(
    mut commands: Commands,
    grid: Res<ChunkGrid>,
    mut loaded: ResMut<LoadedChunks>,
    mut players: ResMut<PlayerChunks>,
    mut queue: ResMut<LoadQueue>,
    q_players: Query<(), With<Player>>,
    mut ev_queued: EventWriter<ChunkLoadQueued>,
    mut ev_cancelled: EventWriter<ChunkLoadCancelled>,
) {
    let Some(layout) = grid.layout() else { return };

    let departed: Vec<Entity> = players.tracked().filter(|&p| !q_players.contains(p)).collect();
    for player in departed {
        let plan = release_player(layout, &mut loaded, &mut players, &mut queue, player);
        if plan.is_empty() { continue; }
        info!("Player {player} left; releasing {} chunks", plan.cancelled.len() + plan.unload.len());
        apply_plan(&mut commands, plan, &mut ev_queued, &mut ev_cancelled);
    }
}

fn apply_plan(
    commands: &mut Commands,
    plan: ChunkPlan,
    ev_queued: &mut EventWriter<ChunkLoadQueued>,
    ev_cancelled: &mut EventWriter<ChunkLoadCancelled>,
) {
    for coord in plan.enqueued {
        ev_queued.write(ChunkLoadQueued(coord));
    }
    for coord in plan.cancelled {
        ev_cancelled.write(ChunkLoadCancelled(coord));
    }
    // unload is immediate once the last holder is gone
    for coord in plan.unload {
        commands.queue(UnloadChunk(coord));
    }
}

/// Throttled drain: when the timer fires, start loading up to one batch of chunks.
pub fn drain_load_queue(
    clock: Res<StreamingClock>,
    settings: Res<StreamingSettings>,
    mut throttle: ResMut<LoadThrottle>,
    mut queue: ResMut<LoadQueue>,
    grid: Res<ChunkGrid>,
    poses: Query<&RestPose>,
    spawner: Option<ResMut<StreamingSpawner>>,
    mut pending: ResMut<PendingSpawns>,
    mut ev_started: EventWriter<ChunkLoadStarted>,
) {
    if queue.is_empty() { return; }
    let Some(mut spawner) = spawner else {
        warn_once!("Load queue has {} chunks but no StreamingSpawner is installed", queue.len());
        return;
    };
    if !throttle.try_fire(clock.tick, settings.load_interval_ticks) { return; }

    let batch: Vec<ChunkCoord> = take_batch(&mut queue, settings.max_loads_per_drain());
    for coord in batch {
        let spawned = issue_chunk_spawns(coord, &grid, &poses, spawner.0.as_mut(), &mut pending);
        info!("Spawning {spawned} objects in chunk {coord}");
        ev_started.write(ChunkLoadStarted { coord, spawns: spawned });
    }
}

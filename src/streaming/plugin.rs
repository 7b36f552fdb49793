//! Chunk streaming plugin wiring (glue).
//! - Settings + fixed tick rate
//! - Build-world request/ack events and streaming lifecycle events
//! - Per-step schedule: clock → departures → players → drain → collect

use std::time::Duration;

use bevy::prelude::*;

use super::copy::ComponentCopyRegistry;
use super::core::ChunkCoord;
use super::grid::{handle_build_requests, BuildError, BuildSummary, ChunkGrid, TemplateLibrary};
use super::materialize::{collect_spawn_results, PendingSpawns, TemplateCache};
use super::queue::{LoadQueue, LoadThrottle, StreamingClock};
use super::residency::{LoadedChunks, PlayerChunks};
use super::scene::WorldSceneConfig;
use super::systems::{advance_clock, drain_load_queue, release_departed_players, track_players};
use crate::attributes::characteristics_copier;

/// Which side of the session this process is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NetworkRole {
    /// Runs the builder and streams chunks.
    #[default]
    Authority,
    /// Only observes world-creation notifications.
    Participant,
}

#[derive(Resource, Clone, Debug)]
pub struct StreamingSettings {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Ticks between two drains of the load queue.
    pub load_interval_ticks: u32,
    /// Scene asset requested during world creation.
    pub scene_path: String,
    /// Pause between announcing world creation and starting it.
    pub settle_delay: Duration,
    pub role: NetworkRole,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            load_interval_ticks: 4,
            scene_path: "scenes/world.scene.ron".to_string(),
            settle_delay: Duration::from_secs(1),
            role: NetworkRole::Authority,
        }
    }
}

impl StreamingSettings {
    /// How many chunk loads may start per drain.
    pub fn max_loads_per_drain(&self) -> usize {
        (self.tick_rate / self.load_interval_ticks.max(1)).max(1) as usize
    }

    pub fn is_authority(&self) -> bool { self.role == NetworkRole::Authority }
}

// ---------- Events ----------

/// Inbound request to build the chunk grid from a scene.
#[derive(Event, Clone, Debug)]
pub struct BuildWorld {
    pub source: Entity,
    pub scene: WorldSceneConfig,
}

/// One-shot acknowledgement of a `BuildWorld`.
#[derive(Event, Clone, Debug)]
pub struct WorldBuilt {
    pub source: Entity,
    pub outcome: Result<BuildSummary, BuildError>,
}

/// First holder appeared; chunk is waiting for the throttle.
#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLoadQueued(pub ChunkCoord);

/// Last holder left before the chunk was drained; nothing was spawned.
#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLoadCancelled(pub ChunkCoord);

/// Spawn requests issued for a drained chunk.
#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLoadStarted {
    pub coord: ChunkCoord,
    pub spawns: usize,
}

/// Chunk torn down after its last holder left.
#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkUnloaded {
    pub coord: ChunkCoord,
    pub despawned: usize,
    pub orphaned: usize,
}

/// Everything streaming does inside one simulation step.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub struct StreamingSet;

// ---------- Plugin ----------

pub struct ChunkStreamingPlugin;

impl Plugin for ChunkStreamingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<StreamingSettings>();
        let tick_rate = app.world().resource::<StreamingSettings>().tick_rate.max(1);

        // keep handlers the app registered before adding the plugin
        app.init_resource::<ComponentCopyRegistry>();
        app.world_mut()
            .resource_mut::<ComponentCopyRegistry>()
            .register_with(characteristics_copier());

        app.insert_resource(Time::<Fixed>::from_hz(f64::from(tick_rate)))
            .init_resource::<ChunkGrid>()
            .init_resource::<TemplateLibrary>()
            .init_resource::<LoadedChunks>()
            .init_resource::<PlayerChunks>()
            .init_resource::<LoadQueue>()
            .init_resource::<LoadThrottle>()
            .init_resource::<StreamingClock>()
            .init_resource::<PendingSpawns>()
            .init_resource::<TemplateCache>()

            .add_event::<BuildWorld>()
            .add_event::<WorldBuilt>()
            .add_event::<ChunkLoadQueued>()
            .add_event::<ChunkLoadCancelled>()
            .add_event::<ChunkLoadStarted>()
            .add_event::<ChunkUnloaded>()

            // builder answers requests whenever they arrive
            .add_systems(Update, handle_build_requests)

            .add_systems(
                FixedUpdate,
                (
                    advance_clock,
                    release_departed_players,
                    track_players,
                    drain_load_queue,
                    collect_spawn_results,
                )
                    .chain()
                    .in_set(StreamingSet),
            );
    }
}

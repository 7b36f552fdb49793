// src/streaming/materialize.rs
//! Turning dormant chunk members into live networked objects and back.
//!
//! Load is asynchronous: one spawn task per member, tracked per chunk. Results
//! are collected on the main thread, where the first live instance of a template
//! is snapshotted into the session's [`TemplateCache`] and every instance gets a
//! copy of that snapshot before it is initialized.
//!
//! Unload is synchronous. Spawns still in flight for the chunk are moved to an
//! orphan list; they always complete and their instances are despawned on
//! arrival instead of being initialized.

use std::collections::HashMap;

use bevy::prelude::*;
use bevy::tasks::Task;
use futures_lite::future;

use super::copy::{attach_all, copy_all, sever_all};
use super::core::{ChunkCoord, InstanceHandle, LiveInstance, RestPose, TemplateId};
use super::grid::ChunkGrid;
use super::plugin::ChunkUnloaded;

// ---------- Spawner seam ----------

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    #[error("instantiation of '{template}' rejected: {reason}")]
    Rejected { template: TemplateId, reason: String },
    #[error("spawn request dropped before completion")]
    Dropped,
}

/// Pending network spawn.
pub type SpawnOp = Task<Result<InstanceHandle, SpawnError>>;

/// The network object layer: async spawn, sync despawn.
pub trait ObjectSpawner: Send + Sync + 'static {
    /// Start spawning `template` at `pose`.
    fn spawn_async(&mut self, template: &TemplateId, pose: RestPose) -> SpawnOp;

    /// Bind the live object to the simulation entity that now backs it.
    fn initialize(&mut self, handle: InstanceHandle, entity: Entity) {
        let _ = (handle, entity);
    }

    fn despawn(&mut self, handle: InstanceHandle);
}

#[derive(Resource)]
pub struct StreamingSpawner(pub Box<dyn ObjectSpawner>);

impl StreamingSpawner {
    pub fn new(spawner: impl ObjectSpawner) -> Self { Self(Box::new(spawner)) }
}

// ---------- Session state ----------

/// Template id → detached snapshot entity holding the first live instance's state.
#[derive(Resource, Default, Debug)]
pub struct TemplateCache {
    sources: HashMap<TemplateId, Entity>,
}

impl TemplateCache {
    pub fn get(&self, template: &TemplateId) -> Option<Entity> { self.sources.get(template).copied() }
    pub fn len(&self) -> usize { self.sources.len() }
    pub fn is_empty(&self) -> bool { self.sources.is_empty() }
}

/// Marker on template snapshot entities.
#[derive(Component, Debug, Clone)]
pub struct TemplateSnapshot(pub TemplateId);

pub struct PendingSpawn {
    pub member: Entity,
    pub template: TemplateId,
    pub task: SpawnOp,
}

#[derive(Resource, Default)]
pub struct PendingSpawns {
    by_chunk: HashMap<ChunkCoord, Vec<PendingSpawn>>,
    orphaned: Vec<PendingSpawn>,
}

impl PendingSpawns {
    pub fn in_flight(&self, coord: ChunkCoord) -> usize {
        self.by_chunk.get(&coord).map_or(0, Vec::len)
    }

    pub fn orphan_count(&self) -> usize { self.orphaned.len() }

    pub fn is_idle(&self) -> bool { self.by_chunk.is_empty() && self.orphaned.is_empty() }

    /// Detach a chunk's in-flight spawns; returns how many were moved.
    pub fn orphan_chunk(&mut self, coord: ChunkCoord) -> usize {
        let Some(list) = self.by_chunk.remove(&coord) else { return 0 };
        let n = list.len();
        self.orphaned.extend(list);
        n
    }

    fn push(&mut self, coord: ChunkCoord, spawn: PendingSpawn) {
        self.by_chunk.entry(coord).or_default().push(spawn);
    }
}

type Resolved = (Entity, TemplateId, Result<InstanceHandle, SpawnError>);

/// Pull out finished tasks: (chunk-owned, orphaned).
fn take_finished(pending: &mut PendingSpawns) -> (Vec<Resolved>, Vec<Resolved>) {
    let mut live = Vec::new();
    pending.by_chunk.retain(|_, list| {
        drain_ready(list, &mut live);
        !list.is_empty()
    });
    let mut orphans = Vec::new();
    drain_ready(&mut pending.orphaned, &mut orphans);
    (live, orphans)
}

fn drain_ready(list: &mut Vec<PendingSpawn>, out: &mut Vec<Resolved>) {
    list.retain_mut(|p| {
        if !p.task.is_finished() { return true; }
        match future::block_on(future::poll_once(&mut p.task)) {
            Some(result) => {
                out.push((p.member, p.template.clone(), result));
                false
            }
            None => true,
        }
    });
}

// ---------- Load ----------

/// Issue one spawn per member of `coord`. Returns the number of requests issued.
pub fn issue_chunk_spawns(
    coord: ChunkCoord,
    grid: &ChunkGrid,
    poses: &Query<&RestPose>,
    spawner: &mut dyn ObjectSpawner,
    pending: &mut PendingSpawns,
) -> usize {
    let Some(record) = grid.record(coord) else {
        error!("Chunk {coord} is not part of the grid; skipping load");
        return 0;
    };

    let mut issued = 0;
    for (template, members) in record.groups() {
        for &member in members {
            // member may have been despawned by gameplay
            let Ok(pose) = poses.get(member) else { continue };
            let task = spawner.spawn_async(template, *pose);
            pending.push(coord, PendingSpawn { member, template: template.clone(), task });
            issued += 1;
        }
    }
    issued
}

/// Exclusive system: apply resolved spawns on the main thread.
pub fn collect_spawn_results(world: &mut World) {
    // finished tasks stay pending until a spawner can take their instances
    if !world.contains_resource::<StreamingSpawner>() { return; }
    let Some(mut pending) = world.get_resource_mut::<PendingSpawns>() else { return };
    let (resolved, orphans) = take_finished(&mut pending);
    if resolved.is_empty() && orphans.is_empty() { return; }

    world.resource_scope(|world, mut spawner: Mut<StreamingSpawner>| {
        for (member, template, result) in orphans {
            match result {
                Ok(handle) => {
                    debug!("Despawning late instance {handle} of '{template}' for unloaded member {member}");
                    spawner.0.despawn(handle);
                }
                Err(e) => debug!("Orphaned spawn for {member} failed: {e}"),
            }
        }

        for (member, template, result) in resolved {
            match result {
                Ok(handle) => materialize_instance(world, spawner.0.as_mut(), member, &template, handle),
                Err(e) => warn!("Spawn for member {member} failed, leaving it dormant: {e}"),
            }
        }
    });
}

/// Template cache lookup/seed, data copy, then initialization.
fn materialize_instance(
    world: &mut World,
    spawner: &mut dyn ObjectSpawner,
    member: Entity,
    template: &TemplateId,
    handle: InstanceHandle,
) {
    if world.get_entity(member).is_err() {
        warn!("Member {member} vanished while its spawn was in flight; despawning {handle}");
        spawner.despawn(handle);
        return;
    }

    let cached = world.get_resource::<TemplateCache>().and_then(|c| c.get(template));
    let source = match cached {
        Some(source) => source,
        None => {
            let snapshot = world.spawn(TemplateSnapshot(template.clone())).id();
            copy_all(world, member, snapshot);
            world
                .get_resource_or_insert_with(TemplateCache::default)
                .sources
                .insert(template.clone(), snapshot);
            debug!("Cached template '{template}' from first live instance {handle}");
            snapshot
        }
    };

    copy_all(world, source, member);
    spawner.initialize(handle, member);
    attach_all(world, member, handle);
    world.entity_mut(member).insert(LiveInstance(handle));
}

// ---------- Unload ----------

/// Command: tear down every live instance of a chunk right now.
pub struct UnloadChunk(pub ChunkCoord);

impl bevy::ecs::system::Command for UnloadChunk {
    fn apply(self, world: &mut World) {
        unload_chunk(world, self.0);
    }
}

/// Despawn all initialized members of `coord`; in-flight spawns become orphans.
/// Returns the number of instances despawned.
pub fn unload_chunk(world: &mut World, coord: ChunkCoord) -> usize {
    let members: Vec<Entity> = world
        .get_resource::<ChunkGrid>()
        .and_then(|g| g.record(coord))
        .map(|r| r.entities().collect())
        .unwrap_or_default();

    let orphaned = world
        .get_resource_mut::<PendingSpawns>()
        .map_or(0, |mut p| p.orphan_chunk(coord));

    let live: Vec<(Entity, InstanceHandle)> = members
        .into_iter()
        .filter_map(|m| world.get::<LiveInstance>(m).map(|l| (m, l.0)))
        .collect();

    let has_spawner = world.contains_resource::<StreamingSpawner>();
    if !has_spawner && !live.is_empty() {
        error!("No StreamingSpawner installed; {} instances of chunk {coord} are left to the network layer", live.len());
    }
    for &(member, handle) in &live {
        if let Some(mut spawner) = world.get_resource_mut::<StreamingSpawner>() {
            spawner.0.despawn(handle);
        }
        sever_all(world, member);
        world.entity_mut(member).remove::<LiveInstance>();
    }
    let despawned = if has_spawner { live.len() } else { 0 };

    info!("Despawned {despawned} objects in chunk {coord} ({orphaned} still in flight)");
    world.send_event(ChunkUnloaded { coord, despawned, orphaned });
    despawned
}

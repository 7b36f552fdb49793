// src/streaming/residency.rs
//! Who needs which chunk resident, and the per-player diff that keeps it current.
//!
//! `LoadedChunks` is a dense arena (one holder list per grid cell). A cell has
//! holders iff it is live or queued to load. `PlayerChunks` remembers each
//! player's last cell and the cells it currently holds.

use std::collections::{HashMap, HashSet};

use bevy::prelude::*;

use super::core::{ChunkCoord, ChunkOffset};
use super::layout::{ChunkIndex, ChunkLayout};
use super::queue::LoadQueue;

#[derive(Resource, Default, Debug)]
pub struct LoadedChunks {
    holders: Vec<Vec<Entity>>,
}

impl LoadedChunks {
    pub fn with_capacity(chunks: usize) -> Self {
        Self { holders: vec![Vec::new(); chunks] }
    }

    pub fn holders(&self, index: ChunkIndex) -> &[Entity] {
        self.holders.get(index.get()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, index: ChunkIndex) -> usize { self.holders(index).len() }

    /// Returns true when this is the chunk's first holder.
    pub fn add_holder(&mut self, index: ChunkIndex, player: Entity) -> bool {
        let Some(list) = self.holders.get_mut(index.get()) else { return false };
        if list.contains(&player) { return false; }
        list.push(player);
        list.len() == 1
    }

    /// Returns the remaining holder count.
    pub fn remove_holder(&mut self, index: ChunkIndex, player: Entity) -> usize {
        let Some(list) = self.holders.get_mut(index.get()) else { return 0 };
        if let Some(i) = list.iter().position(|&p| p == player) {
            list.swap_remove(i);
        }
        list.len()
    }

    /// Cells with at least one holder.
    pub fn occupied(&self) -> impl Iterator<Item = (ChunkIndex, &[Entity])> {
        self.holders
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(i, h)| (ChunkIndex(i as u32), h.as_slice()))
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlayerTrack {
    pub chunk: Option<ChunkCoord>,
    pub held: HashSet<ChunkCoord>,
}

#[derive(Resource, Default, Debug)]
pub struct PlayerChunks {
    tracks: HashMap<Entity, PlayerTrack>,
}

impl PlayerChunks {
    pub fn get(&self, player: Entity) -> Option<&PlayerTrack> { self.tracks.get(&player) }

    pub fn last_chunk(&self, player: Entity) -> Option<ChunkCoord> {
        self.tracks.get(&player).and_then(|t| t.chunk)
    }

    pub fn remove(&mut self, player: Entity) -> Option<PlayerTrack> { self.tracks.remove(&player) }

    pub fn tracked(&self) -> impl Iterator<Item = Entity> + '_ { self.tracks.keys().copied() }

    pub fn len(&self) -> usize { self.tracks.len() }

    pub fn is_empty(&self) -> bool { self.tracks.is_empty() }
}

/// What a release of one holder did to the chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    StillHeld(usize),
    /// Was only queued: load cancelled, nothing to tear down.
    Cancelled,
    /// Was live: must be unloaded now.
    Unload,
}

/// Scheduling consequences of one player changing cells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkPlan {
    pub enqueued: Vec<ChunkCoord>,
    pub cancelled: Vec<ChunkCoord>,
    pub unload: Vec<ChunkCoord>,
}

impl ChunkPlan {
    pub fn is_empty(&self) -> bool {
        self.enqueued.is_empty() && self.cancelled.is_empty() && self.unload.is_empty()
    }
}

/// Cells required around `center`, clipped to the grid.
pub fn required_chunks(layout: &ChunkLayout, center: ChunkCoord, mask: &[ChunkOffset]) -> HashSet<ChunkCoord> {
    mask.iter()
        .map(|&o| center.offset(o))
        .filter(|&c| layout.contains(c))
        .collect()
}

/// Drop one holder from a chunk; cancels or requests unload when it was the last one.
pub fn release_chunk(
    layout: &ChunkLayout,
    loaded: &mut LoadedChunks,
    queue: &mut LoadQueue,
    coord: ChunkCoord,
    player: Entity,
) -> Release {
    let Some(index) = layout.index_of(coord) else { return Release::StillHeld(0) };
    let remaining = loaded.remove_holder(index, player);
    if remaining > 0 {
        return Release::StillHeld(remaining);
    }
    if queue.remove(coord) { Release::Cancelled } else { Release::Unload }
}

/// Move `player` into `center` and diff its required set against what it holds.
///
/// Returns `None` (and records nothing) when `center` is not a grid cell, so the
/// move is retried on the next step.
pub fn plan_player_move(
    layout: &ChunkLayout,
    mask: &[ChunkOffset],
    loaded: &mut LoadedChunks,
    players: &mut PlayerChunks,
    queue: &mut LoadQueue,
    player: Entity,
    center: ChunkCoord,
) -> Option<ChunkPlan> {
    if !layout.contains(center) { return None; }

    let track = players.tracks.entry(player).or_default();
    track.chunk = Some(center);

    let required = required_chunks(layout, center, mask);
    let mut plan = ChunkPlan::default();

    // chunks in both sets are left alone
    let mut to_load: Vec<ChunkCoord> = required.difference(&track.held).copied().collect();
    let mut to_unload: Vec<ChunkCoord> = track.held.difference(&required).copied().collect();
    to_load.sort();
    to_unload.sort();

    for coord in to_load {
        let Some(index) = layout.index_of(coord) else { continue };
        track.held.insert(coord);
        if loaded.add_holder(index, player) && queue.push(coord) {
            plan.enqueued.push(coord);
        }
    }

    for coord in to_unload {
        track.held.remove(&coord);
        match release_chunk(layout, loaded, queue, coord, player) {
            Release::StillHeld(_) => {}
            Release::Cancelled => plan.cancelled.push(coord),
            Release::Unload => plan.unload.push(coord),
        }
    }

    Some(plan)
}

/// Release everything a departed player held.
pub fn release_player(
    layout: &ChunkLayout,
    loaded: &mut LoadedChunks,
    players: &mut PlayerChunks,
    queue: &mut LoadQueue,
    player: Entity,
) -> ChunkPlan {
    let mut plan = ChunkPlan::default();
    let Some(track) = players.remove(player) else { return plan };

    let mut held: Vec<ChunkCoord> = track.held.into_iter().collect();
    held.sort();
    for coord in held {
        match release_chunk(layout, loaded, queue, coord, player) {
            Release::StillHeld(_) => {}
            Release::Cancelled => plan.cancelled.push(coord),
            Release::Unload => plan.unload.push(coord),
        }
    }
    plan
}

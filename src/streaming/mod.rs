// src/streaming/mod.rs
//! Chunk-based streaming of world objects around players.
//! Dormant members are built once from a scene; chunks near players are
//! materialized through an [`ObjectSpawner`] and torn down when nobody needs them.

pub mod core;
pub mod layout;
pub mod copy;
pub mod scene;
pub mod grid;
pub mod queue;
pub mod residency;
pub mod materialize;
pub mod local;
pub mod systems;
pub mod plugin;

#[cfg(test)]
mod testing;

pub use self::core::{ChunkCoord, ChunkMember, ChunkOffset, InstanceHandle, LiveInstance, Player, Prefab, RestPose, TemplateId};
pub use grid::{build_world, BuildError, BuildSummary, ChunkGrid, TemplateLibrary};
pub use layout::{ChunkLayout, LayoutError};
pub use local::{LocalSpawner, SpawnLedger};
pub use materialize::{ObjectSpawner, SpawnError, StreamingSpawner, TemplateCache};
pub use plugin::{
    BuildWorld, ChunkLoadCancelled, ChunkLoadQueued, ChunkLoadStarted, ChunkStreamingPlugin,
    ChunkUnloaded, NetworkRole, StreamingSet, StreamingSettings, WorldBuilt,
};
pub use scene::{WorldSceneAssetPlugin, WorldSceneConfig};

// src/stack.rs
use bevy::prelude::*;
use crate::streaming::plugin::ChunkStreamingPlugin;
use crate::world_creator::WorldCreatorPlugin;

pub struct StreamingStackPlugin;
impl Plugin for StreamingStackPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(ChunkStreamingPlugin)   // grid, residency, queue, materializer
           .add_plugins(WorldCreatorPlugin);    // scene asset + creation handshake
    }
}

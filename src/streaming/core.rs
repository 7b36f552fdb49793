// src/streaming/core.rs
//! Core types for the chunk grid: coordinates, offsets, rest poses, template ids.
//! Keep this file dependency-light; everything else in `streaming` builds on it.

use std::fmt;

use bevy::prelude::*; // Vec2, Vec3, Quat
use serde::{Deserialize, Serialize};

// ---------- Chunks ----------

/// Integer chunk coordinate in XZ.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, z: i32) -> Self { Self { x, z } }

    /// Neighbor at `offset` (may fall outside the grid).
    pub const fn offset(self, offset: ChunkOffset) -> Self {
        Self { x: self.x + offset.x, z: self.z + offset.z }
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Relative chunk offset; a load mask is a list of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkOffset {
    pub x: i32,
    pub z: i32,
}

impl ChunkOffset {
    pub const ZERO: Self = Self { x: 0, z: 0 };
    pub const fn new(x: i32, z: i32) -> Self { Self { x, z } }
}

/// Square mask of `radius` chunks around the center, center included.
pub fn square_mask(radius: i32) -> Vec<ChunkOffset> {
    let r = radius.max(0);
    let mut out = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    for x in -r..=r {
        for z in -r..=r {
            out.push(ChunkOffset::new(x, z));
        }
    }
    out
}

// ---------- Templates & poses ----------

/// Identifies a spawnable template (prefab). Serialized as a plain string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub String);

impl TemplateId {
    pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Saved position/orientation a dormant member is spawned at.
#[derive(Component, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestPose {
    pub position: Vec3,
    #[serde(default = "identity_rotation")]
    pub rotation: Quat,
}

impl RestPose {
    pub fn at(position: Vec3) -> Self { Self { position, rotation: Quat::IDENTITY } }
}

fn identity_rotation() -> Quat {
    Quat::IDENTITY
}

/// Opaque handle to a live networked object, issued by the spawner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(pub u64);

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------- Entity tags ----------

/// Marker for entities whose position drives chunk residency.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct Player;

/// Marker for prefab entities; they only hold template data and are never streamed.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct Prefab;

/// A dormant-or-live entity owned by one chunk.
#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub struct ChunkMember {
    pub chunk: ChunkCoord,
    pub template: TemplateId,
}

/// Present while the member has an initialized live instance.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveInstance(pub InstanceHandle);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_mask_covers_center_and_ring() {
        let mask = square_mask(1);
        assert_eq!(mask.len(), 9);
        assert!(mask.contains(&ChunkOffset::ZERO));
        assert!(mask.contains(&ChunkOffset::new(-1, 1)));
        assert!(square_mask(0) == vec![ChunkOffset::ZERO]);
    }

    #[test]
    fn template_id_reads_as_plain_string() {
        let id: TemplateId = ron::from_str("\"goblin\"").unwrap();
        assert_eq!(id, TemplateId::new("goblin"));
    }

    #[test]
    fn rest_pose_rotation_defaults_to_identity() {
        let pose: RestPose = ron::from_str("(position: (1.0, 2.0, 3.0))").unwrap();
        assert_eq!(pose.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(pose.rotation, Quat::IDENTITY);
    }
}

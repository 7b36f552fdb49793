// src/streaming/layout.rs
//! World-bounds → chunk-grid math. The grid is centered on the bounds: when the
//! axis length is not a multiple of the chunk size, the leftover is split evenly
//! on both sides.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::core::ChunkCoord;

/// Min/max of one world axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub min: f32,
    pub max: f32,
}

impl AxisBounds {
    pub const fn new(min: f32, max: f32) -> Self { Self { min, max } }
    pub fn length(&self) -> f32 { self.max - self.min }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("chunk size must be positive and finite, got {0}")]
    ChunkSize(f32),
    #[error("empty or inverted {axis} bounds ({min} .. {max})")]
    Bounds { axis: char, min: f32, max: f32 },
    #[error("grid of {x} x {z} chunks exceeds {max} cells")]
    TooManyChunks { x: f64, z: f64, max: i32 },
}

/// Dense index of a chunk inside the grid (`x * chunks_z + z`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkIndex(pub u32);

impl ChunkIndex {
    #[inline]
    pub fn get(self) -> usize { self.0 as usize }
}

/// Immutable grid geometry derived from bounds + chunk size.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkLayout {
    pub x_bounds: AxisBounds,
    pub z_bounds: AxisBounds,
    pub chunk_size: f32,
    chunks_x: i32,
    chunks_z: i32,
    /// Centering offset added before dividing by the chunk size.
    offset: Vec2,
}

impl ChunkLayout {
    pub fn new(x_bounds: AxisBounds, z_bounds: AxisBounds, chunk_size: f32) -> Result<Self, LayoutError> {
        if !(chunk_size.is_finite() && chunk_size > 0.0) {
            return Err(LayoutError::ChunkSize(chunk_size));
        }
        for (axis, b) in [('x', x_bounds), ('z', z_bounds)] {
            if !(b.min.is_finite() && b.max.is_finite() && b.length() > 0.0) {
                return Err(LayoutError::Bounds { axis, min: b.min, max: b.max });
            }
        }

        let (x, z) = (side_count(x_bounds.length(), chunk_size), side_count(z_bounds.length(), chunk_size));
        // dense indices are i32 arithmetic
        if x * z > f64::from(MAX_CELLS) {
            return Err(LayoutError::TooManyChunks { x, z, max: MAX_CELLS });
        }
        let (chunks_x, offset_x) = side_chunks(x_bounds.length(), chunk_size);
        let (chunks_z, offset_z) = side_chunks(z_bounds.length(), chunk_size);

        Ok(Self {
            x_bounds,
            z_bounds,
            chunk_size,
            chunks_x,
            chunks_z,
            offset: Vec2::new(offset_x, offset_z),
        })
    }

    /// Chunks along X and Z.
    pub fn dims(&self) -> (i32, i32) { (self.chunks_x, self.chunks_z) }

    pub fn len(&self) -> usize { (self.chunks_x * self.chunks_z) as usize }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Centering offset per axis (x, z).
    pub fn centering_offset(&self) -> Vec2 { self.offset }

    /// Chunk a world position falls in. May lie outside the grid; check with `contains`.
    pub fn chunk_at(&self, position: Vec3) -> ChunkCoord {
        let px = position.x - self.x_bounds.min + self.offset.x;
        let pz = position.z - self.z_bounds.min + self.offset.y;
        // ties go to the even neighbor so boundary positions are stable
        ChunkCoord::new(
            (px / self.chunk_size).round_ties_even() as i32,
            (pz / self.chunk_size).round_ties_even() as i32,
        )
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        (0..self.chunks_x).contains(&coord.x) && (0..self.chunks_z).contains(&coord.z)
    }

    pub fn index_of(&self, coord: ChunkCoord) -> Option<ChunkIndex> {
        if !self.contains(coord) { return None; }
        Some(ChunkIndex((coord.x * self.chunks_z + coord.z) as u32))
    }

    pub fn coord_of(&self, index: ChunkIndex) -> ChunkCoord {
        let i = index.0 as i32;
        ChunkCoord::new(i / self.chunks_z, i % self.chunks_z)
    }

    /// All grid cells in index order.
    pub fn coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        (0..self.len() as u32).map(|i| self.coord_of(ChunkIndex(i)))
    }
}

/// Upper bound on grid cells.
pub const MAX_CELLS: i32 = i32::MAX;

fn side_count(side_length: f32, chunk_size: f32) -> f64 {
    (f64::from(side_length) / f64::from(chunk_size)).ceil()
}

/// `ceil(len / size)` chunks, plus the half-leftover that centers them on the axis.
fn side_chunks(side_length: f32, chunk_size: f32) -> (i32, f32) {
    let count = (side_length / chunk_size).ceil() as i32;
    let total = count as f32 * chunk_size;
    (count, (total - side_length) / 2.0)
}

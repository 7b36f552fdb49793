// src/streaming/queue.rs
use std::collections::VecDeque;

use bevy::prelude::*;

use super::core::ChunkCoord;

/// Chunks waiting to be materialized, FIFO by first requirement.
#[derive(Resource, Default, Debug)]
pub struct LoadQueue {
    items: VecDeque<ChunkCoord>,
}

impl LoadQueue {
    /// Returns false if the chunk is already pending.
    pub fn push(&mut self, coord: ChunkCoord) -> bool {
        if self.items.contains(&coord) { return false; }
        self.items.push_back(coord);
        true
    }

    pub fn pop(&mut self) -> Option<ChunkCoord> { self.items.pop_front() }

    /// Cancel a pending load. Returns false if it was not queued.
    pub fn remove(&mut self, coord: ChunkCoord) -> bool {
        match self.items.iter().position(|&c| c == coord) {
            Some(i) => { self.items.remove(i); true }
            None => false,
        }
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool { self.items.contains(&coord) }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = ChunkCoord> + '_ { self.items.iter().copied() }
}

/// Tick-based gate on queue draining.
#[derive(Resource, Default, Debug)]
pub struct LoadThrottle {
    next_drain_tick: Option<u64>,
}

impl LoadThrottle {
    pub fn expired_or_not_running(&self, tick: u64) -> bool {
        self.next_drain_tick.is_none_or(|next| tick >= next)
    }

    /// Fire if expired, restarting the timer for `interval` ticks.
    pub fn try_fire(&mut self, tick: u64, interval: u32) -> bool {
        if !self.expired_or_not_running(tick) { return false; }
        self.next_drain_tick = Some(tick + u64::from(interval.max(1)));
        true
    }
}

/// Monotonic simulation step counter.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct StreamingClock {
    pub tick: u64,
}

/// Take at most `max_batch` chunks off the front of the queue.
pub fn take_batch(queue: &mut LoadQueue, max_batch: usize) -> Vec<ChunkCoord> {
    let n = max_batch.max(1).min(queue.len());
    (0..n).filter_map(|_| queue.pop()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: i32, z: i32) -> ChunkCoord { ChunkCoord::new(x, z) }

    #[test]
    fn queue_is_fifo_and_deduplicated() {
        let mut q = LoadQueue::default();
        assert!(q.push(c(1, 1)));
        assert!(q.push(c(0, 0)));
        assert!(!q.push(c(1, 1)));
        assert_eq!(q.pop(), Some(c(1, 1)));
        assert_eq!(q.pop(), Some(c(0, 0)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn remove_cancels_pending_entry() {
        let mut q = LoadQueue::default();
        q.push(c(1, 0));
        q.push(c(2, 0));
        assert!(q.remove(c(1, 0)));
        assert!(!q.remove(c(1, 0)));
        assert_eq!(q.iter().collect::<Vec<_>>(), vec![c(2, 0)]);
    }

    #[test]
    fn throttle_fires_once_per_interval() {
        let mut t = LoadThrottle::default();
        assert!(t.try_fire(10, 4));
        assert!(!t.try_fire(11, 4));
        assert!(!t.try_fire(13, 4));
        assert!(t.try_fire(14, 4));
    }

    #[test]
    fn batch_is_capped_or_drains_short_queue() {
        let mut q = LoadQueue::default();
        for x in 0..10 { q.push(c(x, 0)); }
        assert_eq!(take_batch(&mut q, 4), vec![c(0, 0), c(1, 0), c(2, 0), c(3, 0)]);
        assert_eq!(q.len(), 6);
        assert_eq!(take_batch(&mut q, 15).len(), 6);
        assert!(q.is_empty());
    }
}

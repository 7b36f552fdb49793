// src/streaming/local.rs
//! In-process object spawner for headless servers and tests.
//! Spawns resolve on the async compute pool; every live object is recorded in a shared ledger.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bevy::prelude::*;
use bevy::tasks::{AsyncComputeTaskPool, TaskPool};

use super::core::{InstanceHandle, RestPose, TemplateId};
use super::materialize::{ObjectSpawner, SpawnError, SpawnOp};

#[derive(Clone, Debug, PartialEq)]
pub struct LedgerEntry {
    pub template: TemplateId,
    pub pose: RestPose,
    /// Simulation entity bound by `initialize`.
    pub entity: Option<Entity>,
}

#[derive(Debug, Default)]
pub struct SpawnLedger {
    next: u64,
    live: BTreeMap<InstanceHandle, LedgerEntry>,
    spawned: usize,
    despawned: usize,
}

impl SpawnLedger {
    fn allocate(&mut self, template: TemplateId, pose: RestPose) -> InstanceHandle {
        self.next += 1;
        let handle = InstanceHandle(self.next);
        self.live.insert(handle, LedgerEntry { template, pose, entity: None });
        self.spawned += 1;
        handle
    }

    pub fn live_count(&self) -> usize { self.live.len() }
    pub fn spawned(&self) -> usize { self.spawned }
    pub fn despawned(&self) -> usize { self.despawned }

    pub fn entry(&self, handle: InstanceHandle) -> Option<&LedgerEntry> { self.live.get(&handle) }

    /// Live objects of one template.
    pub fn count_of(&self, template: &TemplateId) -> usize {
        self.live.values().filter(|e| &e.template == template).count()
    }
}

pub struct LocalSpawner {
    ledger: Arc<Mutex<SpawnLedger>>,
    rejected: HashSet<TemplateId>,
}

impl Default for LocalSpawner {
    fn default() -> Self { Self::new() }
}

impl LocalSpawner {
    pub fn new() -> Self {
        Self { ledger: Arc::new(Mutex::new(SpawnLedger::default())), rejected: HashSet::new() }
    }

    /// Fail every spawn of `template`.
    pub fn rejecting(mut self, template: TemplateId) -> Self {
        self.rejected.insert(template);
        self
    }

    /// Shared view of the ledger; stays valid after the spawner is moved into the app.
    pub fn ledger(&self) -> Arc<Mutex<SpawnLedger>> { Arc::clone(&self.ledger) }

    fn lock(&self) -> MutexGuard<'_, SpawnLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectSpawner for LocalSpawner {
    fn spawn_async(&mut self, template: &TemplateId, pose: RestPose) -> SpawnOp {
        let pool = AsyncComputeTaskPool::get_or_init(TaskPool::new);
        let template = template.clone();

        if self.rejected.contains(&template) {
            return pool.spawn(async move {
                Err(SpawnError::Rejected { template, reason: "template is blocked".to_string() })
            });
        }

        let ledger = Arc::clone(&self.ledger);
        pool.spawn(async move {
            let mut ledger = ledger.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(ledger.allocate(template, pose))
        })
    }

    fn initialize(&mut self, handle: InstanceHandle, entity: Entity) {
        match self.lock().live.get_mut(&handle) {
            Some(entry) => entry.entity = Some(entity),
            None => warn!("Initialize of unknown instance {handle}"),
        }
    }

    fn despawn(&mut self, handle: InstanceHandle) {
        let mut ledger = self.lock();
        if ledger.live.remove(&handle).is_some() {
            ledger.despawned += 1;
        } else {
            warn!("Despawn of unknown instance {handle}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future;

    #[test]
    fn spawn_records_and_despawn_releases() {
        let mut spawner = LocalSpawner::new();
        let ledger = spawner.ledger();
        let tree = TemplateId::new("tree");

        let a = future::block_on(spawner.spawn_async(&tree, RestPose::at(Vec3::X))).unwrap();
        let b = future::block_on(spawner.spawn_async(&tree, RestPose::at(Vec3::Z))).unwrap();
        assert_ne!(a, b);
        assert_eq!(ledger.lock().unwrap().count_of(&tree), 2);

        spawner.initialize(a, Entity::from_raw(7));
        assert_eq!(ledger.lock().unwrap().entry(a).unwrap().entity, Some(Entity::from_raw(7)));

        spawner.despawn(a);
        let ledger = ledger.lock().unwrap();
        assert_eq!(ledger.live_count(), 1);
        assert_eq!((ledger.spawned(), ledger.despawned()), (2, 1));
    }

    #[test]
    fn rejected_template_never_reaches_ledger() {
        let rock = TemplateId::new("rock");
        let mut spawner = LocalSpawner::new().rejecting(rock.clone());
        let result = future::block_on(spawner.spawn_async(&rock, RestPose::at(Vec3::ZERO)));
        assert!(matches!(result, Err(SpawnError::Rejected { .. })));
        assert_eq!(spawner.ledger().lock().unwrap().spawned(), 0);
    }
}

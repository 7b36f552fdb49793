// src/streaming/grid.rs
//! Chunk registry + one-time world builder.
//!
//! The grid is built once from a [`WorldSceneConfig`]: one record per cell, each
//! record holding the dormant member entities seeded into it, grouped by template.

use std::collections::HashMap;

use bevy::prelude::*;

use super::copy::copy_all;
use super::core::{ChunkCoord, ChunkMember, ChunkOffset, TemplateId};
use super::layout::{ChunkLayout, LayoutError};
use super::plugin::{BuildWorld, WorldBuilt};
use super::residency::LoadedChunks;
use super::scene::WorldSceneConfig;

// ---------- Templates ----------

/// Template id → prefab entity holding that template's default components.
#[derive(Resource, Default, Debug)]
pub struct TemplateLibrary {
    prefabs: HashMap<TemplateId, Entity>,
}

impl TemplateLibrary {
    pub fn insert(&mut self, id: TemplateId, prefab: Entity) -> Option<Entity> {
        self.prefabs.insert(id, prefab)
    }

    pub fn get(&self, id: &TemplateId) -> Option<Entity> {
        self.prefabs.get(id).copied()
    }
}

// ---------- Registry ----------

/// Member entities of one chunk, grouped by template.
#[derive(Clone, Debug, Default)]
pub struct ChunkRecord {
    members: HashMap<TemplateId, Vec<Entity>>,
}

impl ChunkRecord {
    pub fn push(&mut self, template: TemplateId, member: Entity) {
        self.members.entry(template).or_default().push(member);
    }

    pub fn groups(&self) -> impl Iterator<Item = (&TemplateId, &[Entity])> {
        self.members.iter().map(|(t, v)| (t, v.as_slice()))
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.members.values().flatten().copied()
    }

    pub fn len(&self) -> usize { self.members.values().map(Vec::len).sum() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[derive(Resource, Default, Debug)]
pub struct ChunkGrid {
    layout: Option<ChunkLayout>,
    load_mask: Vec<ChunkOffset>,
    records: Vec<ChunkRecord>,
}

impl ChunkGrid {
    pub fn is_built(&self) -> bool { self.layout.is_some() }

    pub fn layout(&self) -> Option<&ChunkLayout> { self.layout.as_ref() }

    pub fn load_mask(&self) -> &[ChunkOffset] { &self.load_mask }

    pub fn record(&self, coord: ChunkCoord) -> Option<&ChunkRecord> {
        let index = self.layout.as_ref()?.index_of(coord)?;
        self.records.get(index.get())
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.layout.as_ref().is_some_and(|l| l.contains(coord))
    }

    pub fn chunk_count(&self) -> usize { self.records.len() }

    pub fn member_count(&self) -> usize { self.records.iter().map(ChunkRecord::len).sum() }
}

// ---------- Builder ----------

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("chunk grid already built; world configuration is immutable")]
    AlreadyBuilt,
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// What a build produced. Skipped groups reference unknown templates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub chunks: usize,
    pub members: usize,
    pub skipped_groups: Vec<TemplateId>,
    pub dropped_placements: usize,
}

/// Construct the grid and seed dormant members. Missing templates skip their group.
pub fn build_world(world: &mut World, scene: &WorldSceneConfig) -> Result<BuildSummary, BuildError> {
    if world.get_resource::<ChunkGrid>().is_some_and(ChunkGrid::is_built) {
        return Err(BuildError::AlreadyBuilt);
    }
    let layout = scene.layout()?;
    let mut records = vec![ChunkRecord::default(); layout.len()];
    let mut summary = BuildSummary { chunks: layout.len(), ..default() };

    for group in &scene.spawn_objects {
        let prefab = world
            .get_resource::<TemplateLibrary>()
            .and_then(|lib| lib.get(&group.template))
            .filter(|&e| world.get_entity(e).is_ok());
        let Some(prefab) = prefab else {
            error!("Skipping placements of '{}' due to missing template", group.template);
            summary.skipped_groups.push(group.template.clone());
            continue;
        };

        for pose in &group.placements {
            let coord = layout.chunk_at(pose.position);
            let Some(index) = layout.index_of(coord) else {
                summary.dropped_placements += 1;
                continue;
            };

            let member = world
                .spawn((ChunkMember { chunk: coord, template: group.template.clone() }, *pose))
                .id();
            copy_all(world, prefab, member);
            records[index.get()].push(group.template.clone(), member);
            summary.members += 1;
        }
    }

    world.insert_resource(LoadedChunks::with_capacity(layout.len()));
    world.insert_resource(ChunkGrid {
        layout: Some(layout),
        load_mask: scene.chunks.load_mask.clone(),
        records,
    });
    Ok(summary)
}

/// Exclusive system: serve `BuildWorld` requests and acknowledge them with `WorldBuilt`.
pub fn handle_build_requests(world: &mut World) {
    let Some(mut events) = world.get_resource_mut::<Events<BuildWorld>>() else { return };
    let requests: Vec<BuildWorld> = events.drain().collect();

    for request in requests {
        let outcome = build_world(world, &request.scene);
        match &outcome {
            Ok(summary) => {
                if summary.dropped_placements > 0 {
                    warn!("Dropped {} placements outside the chunk grid", summary.dropped_placements);
                }
                info!("Initialized {} objects in {} chunks", summary.members, summary.chunks);
            }
            Err(e) => error!("World build failed: {e}"),
        }
        world.send_event(WorldBuilt { source: request.source, outcome });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{characteristics_copier, AttributeValue, CharacteristicKind, Characteristics};
    use crate::streaming::copy::ComponentCopyRegistry;
    use crate::streaming::core::{Prefab, RestPose};
    use crate::streaming::layout::AxisBounds;
    use crate::streaming::scene::{ChunkSettings, SpawnGroup};

    fn scene(groups: Vec<SpawnGroup>) -> WorldSceneConfig {
        WorldSceneConfig {
            x_bounds: AxisBounds::new(0.0, 100.0),
            z_bounds: AxisBounds::new(0.0, 100.0),
            chunks: ChunkSettings { chunk_size: 50.0, load_mask: vec![ChunkOffset::ZERO] },
            spawn_objects: groups,
        }
    }

    fn group(name: &str, points: &[(f32, f32)]) -> SpawnGroup {
        SpawnGroup {
            template: TemplateId::new(name),
            placements: points.iter().map(|&(x, z)| RestPose::at(Vec3::new(x, 0.0, z))).collect(),
        }
    }

    fn world_with_prefab(name: &str) -> World {
        let mut world = World::new();
        let mut registry = ComponentCopyRegistry::default();
        registry.register_with(characteristics_copier());
        world.insert_resource(registry);

        let stats = Characteristics::default()
            .with(CharacteristicKind::Health, AttributeValue::new(0, 50, 50.0));
        let prefab = world.spawn((Prefab, stats)).id();
        let mut lib = TemplateLibrary::default();
        lib.insert(TemplateId::new(name), prefab);
        world.insert_resource(lib);
        world
    }

    #[test]
    fn builds_grid_and_seeds_members_by_chunk() {
        let mut world = world_with_prefab("crate");
        let s = scene(vec![group("crate", &[(0.0, 0.0), (10.0, 10.0), (50.0, 0.0)])]);

        let summary = build_world(&mut world, &s).unwrap();
        assert_eq!(summary.chunks, 4);
        assert_eq!(summary.members, 3);

        let grid = world.resource::<ChunkGrid>();
        assert_eq!(grid.record(ChunkCoord::new(0, 0)).unwrap().len(), 2);
        assert_eq!(grid.record(ChunkCoord::new(1, 0)).unwrap().len(), 1);
        assert!(grid.record(ChunkCoord::new(1, 1)).unwrap().is_empty());

        let member = grid.record(ChunkCoord::new(1, 0)).unwrap().entities().next().unwrap();
        let stats = world.get::<Characteristics>(member).unwrap();
        assert_eq!(stats.get(CharacteristicKind::Health).unwrap().points(), 50);
        assert_eq!(world.get::<ChunkMember>(member).unwrap().chunk, ChunkCoord::new(1, 0));
    }

    #[test]
    fn missing_template_skips_only_its_group() {
        let mut world = world_with_prefab("crate");
        let s = scene(vec![group("ghost", &[(0.0, 0.0)]), group("crate", &[(0.0, 0.0)])]);

        let summary = build_world(&mut world, &s).unwrap();
        assert_eq!(summary.skipped_groups, vec![TemplateId::new("ghost")]);
        assert_eq!(summary.members, 1);
    }

    #[test]
    fn placements_outside_grid_are_dropped() {
        let mut world = world_with_prefab("crate");
        // rounds to chunk 2 on a 2-wide grid
        let s = scene(vec![group("crate", &[(90.0, 0.0), (20.0, 20.0)])]);

        let summary = build_world(&mut world, &s).unwrap();
        assert_eq!(summary.dropped_placements, 1);
        assert_eq!(world.resource::<ChunkGrid>().member_count(), 1);
    }

    #[test]
    fn second_build_is_rejected() {
        let mut world = world_with_prefab("crate");
        build_world(&mut world, &scene(vec![])).unwrap();
        assert_eq!(build_world(&mut world, &scene(vec![])), Err(BuildError::AlreadyBuilt));
    }
}

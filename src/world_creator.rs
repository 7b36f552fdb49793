// src/world_creator.rs
//! World creation handshake.
//! - Authority: announce start → settle → ensure scene asset → `BuildWorld` → announce finish
//! - Participants only observe the two announcements

use bevy::asset::LoadState;
use bevy::prelude::*;

use crate::streaming::grid::BuildSummary;
use crate::streaming::plugin::{BuildWorld, StreamingSettings, WorldBuilt};
use crate::streaming::scene::{WorldSceneAssetPlugin, WorldSceneConfig};

#[derive(Debug, Clone, Default)]
pub enum CreatorPhase {
    /// Spawned, start not yet announced.
    #[default]
    Idle,
    Settling(Timer),
    LoadingScene,
    /// `BuildWorld` sent, waiting for the acknowledgement.
    Building,
    Finished,
    Failed,
}

/// Drives one world creation on the authority.
#[derive(Component, Debug, Clone, Default)]
pub struct WorldCreator {
    pub phase: CreatorPhase,
}

impl WorldCreator {
    pub fn is_done(&self) -> bool {
        matches!(self.phase, CreatorPhase::Finished | CreatorPhase::Failed)
    }
}

/// Handle to the world scene asset.
#[derive(Resource, Default)]
pub struct SceneHandle(pub Handle<WorldSceneConfig>);

/// Broadcast to all participants when the authority begins creating the world.
#[derive(Event, Clone, Copy, Debug)]
pub struct WorldCreationStarted {
    pub creator: Entity,
}

/// Broadcast to all participants once the chunk grid is built.
#[derive(Event, Clone, Debug)]
pub struct WorldCreationFinished {
    pub creator: Entity,
    pub summary: BuildSummary,
}

pub fn is_authority(settings: Res<StreamingSettings>) -> bool {
    settings.is_authority()
}

pub struct WorldCreatorPlugin;

impl Plugin for WorldCreatorPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(WorldSceneAssetPlugin)
            .init_resource::<StreamingSettings>()
            .init_resource::<SceneHandle>()
            .add_event::<WorldCreationStarted>()
            .add_event::<WorldCreationFinished>()
            .add_systems(
                Update,
                (drive_world_creators, finish_world_creation)
                    .chain()
                    .run_if(is_authority),
            )
            .add_systems(Update, log_world_creation.after(finish_world_creation));
    }
}

/// Update: advance every unfinished creator by at most one phase.
fn drive_world_creators(
    time: Res<Time>,
    settings: Res<StreamingSettings>,
    server: Res<AssetServer>,
    scenes: Res<Assets<WorldSceneConfig>>,
    mut scene_handle: ResMut<SceneHandle>,
    mut creators: Query<(Entity, &mut WorldCreator)>,
    mut ev_started: EventWriter<WorldCreationStarted>,
    mut ev_build: EventWriter<BuildWorld>,
) {
    for (entity, mut creator) in &mut creators {
        let next = match &mut creator.phase {
            CreatorPhase::Idle => {
                ev_started.write(WorldCreationStarted { creator: entity });
                Some(CreatorPhase::Settling(Timer::new(settings.settle_delay, TimerMode::Once)))
            }
            CreatorPhase::Settling(timer) => {
                if !timer.tick(time.delta()).finished() { continue; }
                if !scene_handle.0.is_strong() {
                    scene_handle.0 = server.load(settings.scene_path.as_str());
                    info!("World creator {entity}: loading scene '{}'", settings.scene_path);
                }
                Some(CreatorPhase::LoadingScene)
            }
            CreatorPhase::LoadingScene => {
                if let Some(scene) = scenes.get(&scene_handle.0) {
                    info!(
                        "World creator {entity}: scene ready ({} placements), building world",
                        scene.placement_count()
                    );
                    ev_build.write(BuildWorld { source: entity, scene: scene.clone() });
                    Some(CreatorPhase::Building)
                } else if let Some(LoadState::Failed(e)) = server.get_load_state(scene_handle.0.id()) {
                    error!("World creator {entity}: scene '{}' failed to load: {e}", settings.scene_path);
                    Some(CreatorPhase::Failed)
                } else {
                    None
                }
            }
            CreatorPhase::Building | CreatorPhase::Finished | CreatorPhase::Failed => None,
        };
        if let Some(phase) = next {
            creator.phase = phase;
        }
    }
}

/// Update: match build acknowledgements to their creators.
fn finish_world_creation(
    mut acks: EventReader<WorldBuilt>,
    mut creators: Query<&mut WorldCreator>,
    mut ev_finished: EventWriter<WorldCreationFinished>,
) {
    for ack in acks.read() {
        let Ok(mut creator) = creators.get_mut(ack.source) else { continue };
        match &ack.outcome {
            Ok(summary) => {
                creator.phase = CreatorPhase::Finished;
                ev_finished.write(WorldCreationFinished { creator: ack.source, summary: summary.clone() });
            }
            Err(e) => {
                error!("World creator {}: build rejected: {e}", ack.source);
                creator.phase = CreatorPhase::Failed;
            }
        }
    }
}

/// Everyone (participants included) just logs the announcements.
fn log_world_creation(
    mut started: EventReader<WorldCreationStarted>,
    mut finished: EventReader<WorldCreationFinished>,
) {
    for ev in started.read() {
        info!("World creation started by {}", ev.creator);
    }
    for ev in finished.read() {
        info!(
            "World creation finished by {}: {} objects in {} chunks",
            ev.creator, ev.summary.members, ev.summary.chunks
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::streaming::core::{Prefab, RestPose, TemplateId};
    use crate::streaming::grid::{ChunkGrid, TemplateLibrary};
    use crate::streaming::layout::AxisBounds;
    use crate::streaming::plugin::{ChunkStreamingPlugin, NetworkRole};
    use crate::streaming::scene::{ChunkSettings, SpawnGroup};
    use crate::streaming::core::ChunkOffset;

    fn scene() -> WorldSceneConfig {
        WorldSceneConfig {
            x_bounds: AxisBounds::new(0.0, 100.0),
            z_bounds: AxisBounds::new(0.0, 100.0),
            chunks: ChunkSettings { chunk_size: 50.0, load_mask: vec![ChunkOffset::ZERO] },
            spawn_objects: vec![SpawnGroup {
                template: TemplateId::new("tree"),
                placements: vec![RestPose::at(Vec3::new(10.0, 0.0, 10.0))],
            }],
        }
    }

    fn app(role: NetworkRole) -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .insert_resource(StreamingSettings {
                settle_delay: Duration::ZERO,
                role,
                ..default()
            })
            .add_plugins((ChunkStreamingPlugin, WorldCreatorPlugin));

        let prefab = app.world_mut().spawn(Prefab).id();
        app.world_mut()
            .resource_mut::<TemplateLibrary>()
            .insert(TemplateId::new("tree"), prefab);
        let handle = app.world_mut().resource_mut::<Assets<WorldSceneConfig>>().add(scene());
        app.world_mut().insert_resource(SceneHandle(handle));
        app
    }

    #[derive(Resource, Default)]
    struct Seen {
        started: usize,
        finished: usize,
    }

    fn count(
        mut seen: ResMut<Seen>,
        mut started: EventReader<WorldCreationStarted>,
        mut finished: EventReader<WorldCreationFinished>,
    ) {
        seen.started += started.read().count();
        seen.finished += finished.read().count();
    }

    #[test]
    fn authority_builds_world_and_announces_both_phases() {
        let mut app = app(NetworkRole::Authority);
        app.init_resource::<Seen>().add_systems(PostUpdate, count);
        let creator = app.world_mut().spawn(WorldCreator::default()).id();

        for _ in 0..10 {
            app.update();
        }

        assert!(matches!(app.world().get::<WorldCreator>(creator).unwrap().phase, CreatorPhase::Finished));
        let grid = app.world().resource::<ChunkGrid>();
        assert!(grid.is_built());
        assert_eq!(grid.member_count(), 1);
        let seen = app.world().resource::<Seen>();
        assert_eq!((seen.started, seen.finished), (1, 1));
    }

    #[test]
    fn participant_never_runs_the_builder() {
        let mut app = app(NetworkRole::Participant);
        let creator = app.world_mut().spawn(WorldCreator::default()).id();

        for _ in 0..10 {
            app.update();
        }

        assert!(matches!(app.world().get::<WorldCreator>(creator).unwrap().phase, CreatorPhase::Idle));
        assert!(!app.world().resource::<ChunkGrid>().is_built());
    }

    #[test]
    fn second_creator_is_rejected_after_first_build() {
        let mut app = app(NetworkRole::Authority);
        let first = app.world_mut().spawn(WorldCreator::default()).id();
        for _ in 0..10 {
            app.update();
        }
        let second = app.world_mut().spawn(WorldCreator::default()).id();
        for _ in 0..10 {
            app.update();
        }

        assert!(app.world().get::<WorldCreator>(first).unwrap().is_done());
        assert!(matches!(app.world().get::<WorldCreator>(second).unwrap().phase, CreatorPhase::Failed));
        assert_eq!(app.world().resource::<ChunkGrid>().member_count(), 1);
    }
}

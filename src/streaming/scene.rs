// src/streaming/scene.rs
//! Data-driven world scene (bounds, chunking, placements) + `.scene.ron` loader.

use bevy::asset::{io::Reader, AssetLoader, LoadContext};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::core::{ChunkOffset, RestPose, TemplateId};
use super::layout::{AxisBounds, ChunkLayout, LayoutError};

// ---------- Public plugin to register asset+loader ----------

pub struct WorldSceneAssetPlugin;

impl Plugin for WorldSceneAssetPlugin {
    fn build(&self, app: &mut App) {
        app.init_asset::<WorldSceneConfig>()
            .register_asset_loader(WorldSceneLoader);
    }
}

// ---------- Scene definition (data form) ----------

/// Chunk partitioning + the shape of the region kept resident around a player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkSettings {
    pub chunk_size: f32,
    #[serde(default = "default_load_mask")]
    pub load_mask: Vec<ChunkOffset>,
}

fn default_load_mask() -> Vec<ChunkOffset> {
    vec![ChunkOffset::ZERO]
}

/// One template and every place it is seeded at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnGroup {
    pub template: TemplateId,
    #[serde(default)]
    pub placements: Vec<RestPose>,
}

#[derive(Asset, TypePath, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldSceneConfig {
    pub x_bounds: AxisBounds,
    pub z_bounds: AxisBounds,
    pub chunks: ChunkSettings,
    #[serde(default)]
    pub spawn_objects: Vec<SpawnGroup>,
}

impl WorldSceneConfig {
    pub fn layout(&self) -> Result<ChunkLayout, LayoutError> {
        ChunkLayout::new(self.x_bounds, self.z_bounds, self.chunks.chunk_size)
    }

    pub fn placement_count(&self) -> usize {
        self.spawn_objects.iter().map(|g| g.placements.len()).sum()
    }
}

// ---------- Asset loader for `.scene.ron` ----------

#[derive(Default)]
pub struct WorldSceneLoader;

impl AssetLoader for WorldSceneLoader {
    type Asset = WorldSceneConfig;
    type Settings = ();
    type Error = SceneLoadError;

    fn extensions(&self) -> &[&str] {
        &["scene.ron"]
    }

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        parse_scene(&bytes)
    }
}

/// Parse and validate a scene; the grid must be constructible from it.
pub fn parse_scene(bytes: &[u8]) -> Result<WorldSceneConfig, SceneLoadError> {
    let scene: WorldSceneConfig =
        ron::de::from_bytes(bytes).map_err(|e| SceneLoadError::Ron(e.to_string()))?;
    scene.layout()?;
    Ok(scene)
}

// ---------- Loader errors ----------

#[derive(thiserror::Error, Debug)]
pub enum SceneLoadError {
    #[error("I/O while reading scene: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(String),
    #[error("invalid chunk layout: {0}")]
    Layout(#[from] LayoutError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"(
        x_bounds: (min: -100.0, max: 100.0),
        z_bounds: (min: -50.0, max: 50.0),
        chunks: (
            chunk_size: 25.0,
            load_mask: [(x: -1, z: 0), (x: 0, z: 0), (x: 1, z: 0)],
        ),
        spawn_objects: [
            (
                template: "crate",
                placements: [
                    (position: (1.0, 0.0, 2.0)),
                    (position: (40.0, 0.0, -20.0), rotation: (0.0, 0.0, 0.0, 1.0)),
                ],
            ),
            (template: "goblin"),
        ],
    )"#;

    #[test]
    fn parses_full_scene() {
        let scene = parse_scene(SCENE.as_bytes()).unwrap();
        assert_eq!(scene.chunks.load_mask.len(), 3);
        assert_eq!(scene.spawn_objects[0].template, TemplateId::new("crate"));
        assert_eq!(scene.placement_count(), 2);
        assert_eq!(scene.layout().unwrap().dims(), (8, 4));
    }

    #[test]
    fn load_mask_defaults_to_center_only() {
        let src = r#"(
            x_bounds: (min: 0.0, max: 10.0),
            z_bounds: (min: 0.0, max: 10.0),
            chunks: (chunk_size: 5.0),
        )"#;
        let scene = parse_scene(src.as_bytes()).unwrap();
        assert_eq!(scene.chunks.load_mask, vec![ChunkOffset::ZERO]);
        assert!(scene.spawn_objects.is_empty());
    }

    #[test]
    fn rejects_bad_layout_and_bad_ron() {
        let bad_size = r#"(
            x_bounds: (min: 0.0, max: 10.0),
            z_bounds: (min: 0.0, max: 10.0),
            chunks: (chunk_size: -1.0),
        )"#;
        assert!(matches!(parse_scene(bad_size.as_bytes()), Err(SceneLoadError::Layout(_))));
        assert!(matches!(parse_scene(b"(x_bounds: "), Err(SceneLoadError::Ron(_))));
    }
}

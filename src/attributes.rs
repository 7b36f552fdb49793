// src/attributes.rs
//! Per-entity characteristics (health, stamina, ...) and the copy handlers the
//! streaming materializer uses to clone them from templates.

use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::streaming::copy::ComponentCopier;
use crate::streaming::core::InstanceHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CharacteristicKind {
    Health,
    Stamina,
    Mana,
    Strength,
    Agility,
}

/// Bounded attribute. `value` keeps the fractional part (experience towards the next point).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub min: i32,
    pub max: i32,
    pub value: f32,
}

impl AttributeValue {
    pub fn new(min: i32, max: i32, value: f32) -> Self {
        Self { min, max, value: value.clamp(min as f32, max as f32) }
    }

    /// Whole points.
    pub fn points(&self) -> i32 { self.value.floor() as i32 }

    /// Fraction carried towards the next point.
    pub fn progress(&self) -> f32 { self.value - self.value.floor() }
}

#[derive(Component, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Characteristics {
    values: BTreeMap<CharacteristicKind, AttributeValue>,
    /// Live instance currently mirroring these values, if any.
    #[serde(skip)]
    owner: Option<InstanceHandle>,
}

impl Characteristics {
    pub fn with(mut self, kind: CharacteristicKind, value: AttributeValue) -> Self {
        self.values.insert(kind, value);
        self
    }

    pub fn get(&self, kind: CharacteristicKind) -> Option<AttributeValue> {
        self.values.get(&kind).copied()
    }

    /// Sets the attribute, adding it if missing.
    pub fn set(&mut self, kind: CharacteristicKind, value: AttributeValue) {
        self.values.insert(kind, value);
    }

    pub fn owner(&self) -> Option<InstanceHandle> { self.owner }

    /// Values only; the destination keeps its own owner link.
    pub fn copy_values_to(&self, dst: &mut Characteristics) {
        dst.values = self.values.clone();
    }
}

/// Copy handler set for [`Characteristics`].
pub fn characteristics_copier() -> ComponentCopier {
    ComponentCopier {
        name: "characteristics",
        copy: copy_characteristics,
        attach: Some(attach_owner),
        sever: Some(sever_owner),
    }
}

fn copy_characteristics(world: &mut World, src: Entity, dst: Entity) {
    let Some(source) = world.get::<Characteristics>(src).cloned() else { return };
    let Ok(mut dst) = world.get_entity_mut(dst) else { return };
    if let Some(mut existing) = dst.get_mut::<Characteristics>() {
        source.copy_values_to(&mut existing);
        return;
    }
    let mut fresh = Characteristics::default();
    source.copy_values_to(&mut fresh);
    dst.insert(fresh);
}

fn attach_owner(world: &mut World, entity: Entity, handle: InstanceHandle) {
    if let Some(mut c) = world.get_mut::<Characteristics>(entity) {
        c.owner = Some(handle);
    }
}

fn sever_owner(world: &mut World, entity: Entity) {
    if let Some(mut c) = world.get_mut::<Characteristics>(entity) {
        c.owner = None;
    }
}

// src/streaming/copy.rs
//! Ordered, statically-registered per-component copy handlers.
//!
//! Each handler knows how to copy one component kind from a source entity to a
//! destination entity, and optionally how to attach/sever that component's
//! back-reference to a live instance. Handlers run in registration order.

use bevy::prelude::*;

use super::core::InstanceHandle;

pub type CopyFn = fn(&mut World, Entity, Entity);
pub type AttachFn = fn(&mut World, Entity, InstanceHandle);
pub type SeverFn = fn(&mut World, Entity);

#[derive(Clone, Copy)]
pub struct ComponentCopier {
    pub name: &'static str,
    pub copy: CopyFn,
    pub attach: Option<AttachFn>,
    pub sever: Option<SeverFn>,
}

#[derive(Resource, Default, Clone)]
pub struct ComponentCopyRegistry {
    handlers: Vec<ComponentCopier>,
}

impl ComponentCopyRegistry {
    /// Plain state component: cloned verbatim, no back-references.
    pub fn register<C: Component + Clone>(&mut self) -> &mut Self {
        self.register_with(ComponentCopier {
            name: std::any::type_name::<C>(),
            copy: copy_cloned::<C>,
            attach: None,
            sever: None,
        })
    }

    /// Registering the same name twice keeps the first entry.
    pub fn register_with(&mut self, copier: ComponentCopier) -> &mut Self {
        if self.handlers.iter().any(|h| h.name == copier.name) {
            warn!("Copy handler '{}' already registered; ignoring", copier.name);
            return self;
        }
        self.handlers.push(copier);
        self
    }

    pub fn len(&self) -> usize { self.handlers.len() }

    pub fn is_empty(&self) -> bool { self.handlers.is_empty() }
}

/// Copy every registered component from `src` to `dst`, in order.
pub fn copy_all(world: &mut World, src: Entity, dst: Entity) {
    for h in snapshot(world) {
        (h.copy)(world, src, dst);
    }
}

/// Point every registered back-reference on `entity` at `handle`.
pub fn attach_all(world: &mut World, entity: Entity, handle: InstanceHandle) {
    for h in snapshot(world) {
        if let Some(attach) = h.attach { attach(world, entity, handle); }
    }
}

/// Clear every registered back-reference on `entity`.
pub fn sever_all(world: &mut World, entity: Entity) {
    for h in snapshot(world) {
        if let Some(sever) = h.sever { sever(world, entity); }
    }
}

fn snapshot(world: &World) -> Vec<ComponentCopier> {
    world
        .get_resource::<ComponentCopyRegistry>()
        .map(|r| r.handlers.clone())
        .unwrap_or_default()
}

/// Missing on the source is a no-op.
pub fn copy_cloned<C: Component + Clone>(world: &mut World, src: Entity, dst: Entity) {
    let Some(value) = world.get::<C>(src).cloned() else { return };
    if let Ok(mut e) = world.get_entity_mut(dst) {
        e.insert(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Component, Clone, Debug, PartialEq)]
    struct Tint(u8);

    #[derive(Component, Clone, Debug, PartialEq)]
    struct Label(&'static str);

    #[test]
    fn copies_registered_components_only() {
        let mut world = World::new();
        let mut registry = ComponentCopyRegistry::default();
        registry.register::<Tint>();
        world.insert_resource(registry);

        let src = world.spawn((Tint(7), Label("src"))).id();
        let dst = world.spawn_empty().id();
        copy_all(&mut world, src, dst);

        assert_eq!(world.get::<Tint>(dst), Some(&Tint(7)));
        assert_eq!(world.get::<Label>(dst), None);
    }

    #[test]
    fn missing_source_component_is_skipped() {
        let mut world = World::new();
        let mut registry = ComponentCopyRegistry::default();
        registry.register::<Tint>().register::<Label>();
        world.insert_resource(registry);

        let src = world.spawn(Label("only label")).id();
        let dst = world.spawn(Tint(1)).id();
        copy_all(&mut world, src, dst);

        assert_eq!(world.get::<Tint>(dst), Some(&Tint(1)));
        assert_eq!(world.get::<Label>(dst), Some(&Label("only label")));
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let mut registry = ComponentCopyRegistry::default();
        registry.register::<Tint>().register::<Tint>();
        assert_eq!(registry.len(), 1);
    }
}

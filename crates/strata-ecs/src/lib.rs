//! Strata ECS -- Archetype-based Entity Component System.
//!
//! Entities with identical component sets are grouped into archetypes, each
//! storing its components Structure-of-Arrays style: one densely packed
//! column per component kind. Bulk operations over a set of components scan
//! contiguous memory instead of chasing pointers.
//!
//! - [`signature`]: bitset identifying a component set (archetype identity).
//! - [`column`]: type-erased per-component arrays.
//! - [`archetype`] and [`archetype_index`]: storage and signature lookup.
//! - [`world`]: entity lifecycle and structural edits (row migration).
//! - [`view`]: serial, cached, and chunked-parallel iteration.
//!
//! # Quick Start
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Velocity { x: f32, y: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>().unwrap();
//! world.register_component::<Velocity>().unwrap();
//!
//! let e = world.create_entity();
//! world.add_component(e, Position { x: 1.0, y: 2.0 }).unwrap();
//! world.add_component(e, Velocity { x: 1.0, y: 1.0 }).unwrap();
//!
//! let view = world.view::<(&mut Position, &Velocity)>().unwrap();
//! view.each(&mut world, |(pos, vel)| {
//!     pos.x += vel.x;
//!     pos.y += vel.y;
//! })
//! .unwrap();
//!
//! assert_eq!(world.get_component::<Position>(e).unwrap(), &Position { x: 2.0, y: 3.0 });
//! ```

#![deny(unsafe_code)]

pub mod archetype;
pub mod archetype_index;
pub mod batch;
#[allow(unsafe_code)]
pub mod column;
pub mod component;
pub mod config;
pub mod entity;
pub mod executor;
#[allow(unsafe_code)]
pub mod query;
pub mod signature;
#[allow(unsafe_code)]
pub mod view;
pub mod world;

use component::ComponentKind;
use entity::Entity;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (destroyed, stale generation, or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: Entity },

    /// A component type was used before being registered with the world.
    #[error("component type '{component}' is not registered")]
    UnregisteredComponent { component: &'static str },

    /// A kind was requested that has no registered column factory.
    #[error("component kind {kind} has no registered type")]
    UnknownKind { kind: ComponentKind },

    /// Registration would exceed the configured kind ceiling.
    #[error("component kind {kind} exceeds the configured limit of {limit} kinds")]
    KindLimitExceeded { kind: usize, limit: usize },

    /// A stable kind id is already taken, or the type already has another kind.
    #[error("component kind {kind} is held by '{existing}', cannot register '{requested}'")]
    KindConflict {
        kind: ComponentKind,
        existing: &'static str,
        requested: &'static str,
    },

    /// The entity already has this component.
    #[error("entity {entity:?} already has component '{component}'")]
    DuplicateComponent {
        entity: Entity,
        component: &'static str,
    },

    /// The same component type appears twice in one tuple or batch.
    #[error("component '{component}' appears more than once in the same set")]
    DuplicateInSet { component: &'static str },

    /// The entity does not have this component.
    #[error("entity {entity:?} has no component '{component}'")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    /// A value was moved into a column of a different type.
    #[error("column type mismatch: expected '{expected}', found '{found}'")]
    ColumnTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A query accesses a component mutably alongside another access to it.
    #[error("query accesses component '{component}' mutably more than once or alongside a read")]
    ConflictingAccess { component: &'static str },

    /// Cached iteration was requested before `cache_archetypes`.
    #[error("view has no cached archetypes")]
    ViewNotCached,

    /// The world changed structurally after the view cache was built.
    #[error("view cache is stale (cached at generation {cached}, world is at {current})")]
    StaleViewCache { cached: u64, current: u64 },

    /// A view was used with a world other than the one it was built from.
    #[error("view belongs to a different world")]
    ForeignWorld,

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A configuration document failed to parse.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The executor's thread pool could not be started.
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::batch::{ComponentBatch, ComponentSet};
    pub use crate::component::{Component, ComponentKind, ComponentRegistry};
    pub use crate::config::WorldConfig;
    pub use crate::entity::{Entity, EntityLocation};
    pub use crate::executor::{Executor, RayonExecutor, SerialExecutor, Task};
    pub use crate::query::{Query, QueryItem};
    pub use crate::signature::Signature;
    pub use crate::view::View;
    pub use crate::world::{World, WorldId};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    // -- test component types -----------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Position>().unwrap();
        world.register_component::<Velocity>().unwrap();
        world.register_component::<Health>().unwrap();
        world
    }

    #[test]
    fn signature_of_matches_archetype() {
        let mut world = setup_world();
        let e = world
            .spawn((Position { x: 0.0, y: 0.0 }, Health(1)))
            .unwrap();
        let sig = world.signature_of(e).unwrap();
        let arch = world.archetype(world.location(e).unwrap().archetype.unwrap()).unwrap();
        assert_eq!(arch.signature(), &sig);
        assert_eq!(sig.len(), 2);
    }

    #[test]
    fn scale_10k_entities() {
        let mut world = setup_world();

        let mut entities = Vec::with_capacity(10_000);
        for i in 0..10_000u32 {
            let e = world
                .spawn((
                    Position {
                        x: i as f32,
                        y: i as f32 * 2.0,
                    },
                    Velocity { x: 1.0, y: -1.0 },
                ))
                .unwrap();
            entities.push(e);
        }

        let view = world.view::<(&Position, &Velocity)>().unwrap();
        let mut count = 0;
        view.each(&mut world, |_| count += 1).unwrap();
        assert_eq!(count, 10_000);

        let scale = world.view::<(&mut Velocity,)>().unwrap();
        scale
            .each(&mut world, |(vel,)| {
                vel.x *= 2.0;
                vel.y *= 2.0;
            })
            .unwrap();
        assert_eq!(
            world.get_component::<Velocity>(entities[0]).unwrap(),
            &Velocity { x: 2.0, y: -2.0 }
        );

        for e in entities.iter().take(5_000) {
            assert!(world.destroy_entity(*e));
        }

        let mut count = 0;
        view.each(&mut world, |_| count += 1).unwrap();
        assert_eq!(count, 5_000);
        assert_eq!(world.entity_count(), 5_000);

        // Survivors kept their own values through all the swap-removes.
        for (i, e) in entities.iter().enumerate().skip(5_000) {
            assert_eq!(world.get_component::<Position>(*e).unwrap().x, i as f32);
        }
    }

    #[test]
    fn cached_parallel_matches_serial() {
        let mut world = setup_world();
        for i in 0..3_000u32 {
            let e = world
                .spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: i as f32, y: 1.0 }))
                .unwrap();
            if i % 3 == 0 {
                world.add_component(e, Health(i)).unwrap();
            }
        }

        let mut view = world.view::<(&mut Position, &Velocity)>().unwrap();
        view.cache_archetypes(&mut world).unwrap();
        assert_eq!(view.cached_archetype_count(), Some(2));

        let executor = RayonExecutor::with_threads(4).unwrap();
        view.each_cached_par_single(&mut world, &executor, |(pos, vel)| {
            pos.x += vel.x;
            pos.y += vel.y;
        })
        .unwrap();

        view.each_cached_with_entity(&mut world, |_, (pos, vel)| {
            assert_eq!(pos.x, vel.x);
            assert_eq!(pos.y, 1.0);
        })
        .unwrap();
    }

    #[test]
    fn stable_kind_mode() {
        let mut world = World::new();
        let k = world
            .register_component_with_kind::<Health>(ComponentKind::from_index(100))
            .unwrap();
        assert_eq!(k.index(), 100);
        let e = world.spawn((Health(5),)).unwrap();
        assert!(world.signature_of(e).unwrap().test(k));
    }
}

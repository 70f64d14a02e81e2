//! The World: entities, archetypes, and structural edits.
//!
//! The [`World`] owns the component registry, every archetype, the
//! signature -> archetype table, and the entity location index. All
//! structural edits (adding or removing components, destroying populated
//! entities) go through one migration protocol:
//!
//! 1. compute the destination signature and resolve (or create) its archetype,
//! 2. stage the new row: copy the shared components, then push the new values,
//! 3. swap-remove the old row, fixing the moved entity's location in the same step,
//! 4. push the entity into the destination,
//! 5. record the new location and bump the structural generation.
//!
//! If step 2 fails the staged values are dropped and the entity is left in
//! its source row.
//!
//! The structural generation lets cached views detect that their column
//! pointers may no longer be valid.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::archetype::{Archetype, ArchetypeId};
use crate::archetype_index::ArchetypeIndex;
use crate::batch::{ComponentBatch, ComponentSet};
use crate::component::{Component, ComponentKind, ComponentRegistry};
use crate::config::WorldConfig;
use crate::entity::{Entity, EntityIndex, EntityLocation};
use crate::query::Query;
use crate::signature::Signature;
use crate::view::View;
use crate::EcsError;

// ---------------------------------------------------------------------------
// WorldId
// ---------------------------------------------------------------------------

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a [`World`]. Views remember which world they
/// were built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(u64);

impl WorldId {
    fn next() -> Self {
        Self(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Archetype-based entity/component storage.
///
/// ```
/// use strata_ecs::prelude::*;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Health(u32);
///
/// let mut world = World::new();
/// world.register_component::<Health>().unwrap();
///
/// let e = world.create_entity();
/// assert!(!world.is_valid(e));
/// world.add_component(e, Health(3)).unwrap();
/// assert!(world.is_valid(e));
/// assert_eq!(world.get_component::<Health>(e).unwrap(), &Health(3));
/// ```
#[derive(Debug)]
pub struct World {
    id: WorldId,
    config: WorldConfig,
    registry: ComponentRegistry,
    entities: EntityIndex,
    archetypes: Vec<Archetype>,
    archetype_index: ArchetypeIndex,
    /// Bumped by every structural edit.
    generation: u64,
}

impl World {
    /// Create an empty world with the default [`WorldConfig`].
    pub fn new() -> Self {
        Self::build(WorldConfig::default())
    }

    /// Create an empty world with a custom configuration.
    pub fn with_config(config: WorldConfig) -> Result<Self, EcsError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        Self {
            id: WorldId::next(),
            registry: ComponentRegistry::new(config.max_component_kinds),
            entities: EntityIndex::new(),
            archetypes: Vec::new(),
            archetype_index: ArchetypeIndex::with_slots(config.initial_archetype_slots),
            generation: 0,
            config,
        }
    }

    /// This world's identity.
    #[inline]
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// The configuration this world was built with.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // -- registration -------------------------------------------------------

    /// Register a component type, assigning the next free kind. Registering
    /// the same type again returns its existing kind.
    pub fn register_component<T: Component>(&mut self) -> Result<ComponentKind, EcsError> {
        self.registry.register::<T>()
    }

    /// Register a component type under a caller-chosen kind, for callers that
    /// need kinds to stay stable across runs.
    pub fn register_component_with_kind<T: Component>(
        &mut self,
        kind: ComponentKind,
    ) -> Result<ComponentKind, EcsError> {
        self.registry.register_with_kind::<T>(kind)
    }

    // -- archetype management -----------------------------------------------

    /// Find or create the archetype for `signature`.
    fn get_or_create_archetype(&mut self, signature: &Signature) -> Result<ArchetypeId, EcsError> {
        if let Some(id) = self.archetype_index.get(signature) {
            return Ok(id);
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        let archetype = Archetype::new(id, signature.clone(), &self.registry)?;
        debug!(
            archetype = id.0,
            components = signature.len(),
            "created archetype"
        );
        self.archetypes.push(archetype);
        self.archetype_index.insert(signature.clone(), id);
        Ok(id)
    }

    /// All archetypes, in creation order.
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn archetypes_mut(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    /// The archetype with the given id.
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// Total number of archetypes.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Counter bumped by every structural edit. Cached views compare against it.
    #[inline]
    pub fn structural_generation(&self) -> u64 {
        self.generation
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Allocate a new entity with no components. Reuses the most recently
    /// destroyed index if one is free.
    pub fn create_entity(&mut self) -> Entity {
        self.entities.allocate()
    }

    /// Create an entity and add every component of `set` in one migration.
    ///
    /// ```
    /// use strata_ecs::prelude::*;
    ///
    /// #[derive(Debug, Clone, PartialEq)]
    /// struct Position { x: f32, y: f32 }
    /// #[derive(Debug, Clone, PartialEq)]
    /// struct Velocity { x: f32, y: f32 }
    ///
    /// let mut world = World::new();
    /// world.register_component::<Position>().unwrap();
    /// world.register_component::<Velocity>().unwrap();
    ///
    /// let e = world
    ///     .spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }))
    ///     .unwrap();
    /// assert!(world.has_component::<Velocity>(e));
    /// assert_eq!(world.archetype_count(), 1);
    /// ```
    pub fn spawn<S: ComponentSet>(&mut self, set: S) -> Result<Entity, EcsError> {
        // Validate before allocating so a bad set leaves no entity behind.
        S::kinds(&self.registry)?;
        let entity = self.entities.allocate();
        if let Err(err) = self.add_components(entity, set) {
            self.entities.release(entity);
            return Err(err);
        }
        Ok(entity)
    }

    /// Destroy `entity`, removing its row (if any) and freeing its index.
    ///
    /// An alive entity with no components is released too, so its index goes
    /// back on the free list instead of leaking; only a dead or stale handle
    /// is a no-op, returning `false`.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        let Some(loc) = self.entities.location(entity) else {
            return false;
        };
        if let Some(arch) = loc.archetype {
            self.archetypes[arch.index()].remove_row(loc.row, &mut self.entities);
            self.generation += 1;
        }
        self.entities.release(entity);
        trace!(%entity, "destroyed entity");
        true
    }

    /// Whether `entity` is alive and stored in an archetype (has at least one
    /// component).
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.entities
            .location(entity)
            .is_some_and(|loc| loc.archetype.is_some())
    }

    /// Whether `entity` is alive, with or without components.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Where `entity` is stored.
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        self.entities.location(entity)
    }

    /// The component signature of `entity`; empty for a live entity with no
    /// components.
    pub fn signature_of(&self, entity: Entity) -> Result<Signature, EcsError> {
        let loc = self.live_location(entity)?;
        Ok(self.signature_at(loc))
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    fn live_location(&self, entity: Entity) -> Result<EntityLocation, EcsError> {
        self.entities
            .location(entity)
            .ok_or(EcsError::StaleEntity { entity })
    }

    fn signature_at(&self, loc: EntityLocation) -> Signature {
        loc.archetype
            .map(|arch| self.archetypes[arch.index()].signature().clone())
            .unwrap_or_default()
    }

    fn kind_name(&self, kind: ComponentKind) -> &'static str {
        self.registry.name(kind).unwrap_or("<unknown>")
    }

    // -- structural edits ---------------------------------------------------

    /// Move `entity` from `loc` into the archetype for `signature`. `fill`
    /// pushes the values for kinds the destination has but the source lacks.
    ///
    /// The new row is staged in the destination first. The source row is only
    /// removed once staging succeeded; if it fails, the staged values are
    /// dropped and the entity stays where it was.
    fn migrate<F>(
        &mut self,
        entity: Entity,
        loc: EntityLocation,
        signature: Signature,
        fill: F,
    ) -> Result<(), EcsError>
    where
        F: FnOnce(&mut Archetype) -> Result<(), EcsError>,
    {
        let dst = self.get_or_create_archetype(&signature)?;
        let staged = match loc.archetype {
            Some(src) => {
                let (src_arch, dst_arch) = pair_mut(&mut self.archetypes, src, dst);
                src_arch
                    .copy_row_to(dst_arch, loc.row)
                    .and_then(|()| fill(dst_arch))
            }
            None => fill(&mut self.archetypes[dst.index()]),
        };
        if let Err(err) = staged {
            self.archetypes[dst.index()].discard_partial_row();
            // Staging may have reallocated destination columns.
            self.generation += 1;
            debug!(%entity, to = dst.0, error = %err, "migration rolled back");
            return Err(err);
        }
        if let Some(src) = loc.archetype {
            self.archetypes[src.index()].remove_row(loc.row, &mut self.entities);
        }
        let row = self.archetypes[dst.index()].push_entity(entity);
        self.entities
            .set_location(entity, EntityLocation::new(dst, row));
        self.generation += 1;
        trace!(
            %entity,
            from = ?loc.archetype,
            to = dst.0,
            row,
            "migrated entity"
        );
        Ok(())
    }

    /// Add one component to `entity`, migrating it to the matching archetype.
    ///
    /// # Errors
    ///
    /// - [`EcsError::StaleEntity`] if `entity` is dead.
    /// - [`EcsError::UnregisteredComponent`] if `T` was never registered.
    /// - [`EcsError::DuplicateComponent`] if `entity` already has a `T`.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), EcsError> {
        let kind = self.registry.kind_of::<T>()?;
        let loc = self.live_location(entity)?;
        let signature = self.signature_at(loc);
        if signature.test(kind) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: std::any::type_name::<T>(),
            });
        }
        self.migrate(entity, loc, signature.with(kind), |arch| {
            arch.push_value(kind, value)
        })
    }

    /// Add every component of `set` to `entity` in a single migration.
    ///
    /// # Errors
    ///
    /// As [`add_component`](Self::add_component), plus
    /// [`EcsError::DuplicateInSet`] if the tuple repeats a type. Fails
    /// without changes if `entity` already has any of the kinds.
    pub fn add_components<S: ComponentSet>(&mut self, entity: Entity, set: S) -> Result<(), EcsError> {
        let kinds = S::kinds(&self.registry)?;
        let loc = self.live_location(entity)?;
        let signature = self.signature_at(loc);
        if let Some(&kind) = kinds.iter().find(|&&kind| signature.test(kind)) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: self.kind_name(kind),
            });
        }
        let target = signature.union(&Signature::from_kinds(kinds.iter().copied()));
        self.migrate(entity, loc, target, |arch| set.push_into(arch, &kinds))
    }

    /// Add every value staged in `batch` to `entity` in a single migration,
    /// then clear the batch.
    ///
    /// An empty batch is a no-op. On error the batch is left untouched.
    ///
    /// # Errors
    ///
    /// - [`EcsError::StaleEntity`] if `entity` is dead.
    /// - [`EcsError::UnknownKind`] or [`EcsError::ColumnTypeMismatch`] if the
    ///   batch was staged against another world's registry.
    /// - [`EcsError::DuplicateComponent`] if `entity` already has a staged kind.
    pub fn add_batch(&mut self, entity: Entity, batch: &mut ComponentBatch) -> Result<(), EcsError> {
        let loc = self.live_location(entity)?;
        if batch.is_empty() {
            return Ok(());
        }
        batch.check_kinds(&self.registry)?;
        let signature = self.signature_at(loc);
        if let Some(kind) = batch.kinds().find(|&kind| signature.test(kind)) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: batch.name_of(kind),
            });
        }
        let target = signature.union(batch.signature());
        self.migrate(entity, loc, target, |arch| {
            for (kind, value) in batch.take_values() {
                arch.emplace_erased(kind, value)?;
            }
            Ok(())
        })
    }

    /// Remove component `T` from `entity`, migrating it to the archetype
    /// without `T`. Removing the last component leaves the entity alive with
    /// no archetype.
    ///
    /// # Errors
    ///
    /// - [`EcsError::StaleEntity`] if `entity` is dead.
    /// - [`EcsError::UnregisteredComponent`] if `T` was never registered.
    /// - [`EcsError::MissingComponent`] if `entity` has no `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<(), EcsError> {
        let kind = self.registry.kind_of::<T>()?;
        let loc = self.live_location(entity)?;
        let signature = self.signature_at(loc);
        let src = match loc.archetype {
            Some(src) if signature.test(kind) => src,
            _ => {
                return Err(EcsError::MissingComponent {
                    entity,
                    component: std::any::type_name::<T>(),
                })
            }
        };
        let target = signature.without(kind);
        if target.is_empty() {
            self.archetypes[src.index()].remove_row(loc.row, &mut self.entities);
            self.entities.set_location(entity, EntityLocation::EMPTY);
            self.generation += 1;
            trace!(%entity, "removed last component");
            return Ok(());
        }
        self.migrate(entity, loc, target, |_| Ok(()))
    }

    // -- component access ---------------------------------------------------

    /// Whether `entity` is alive and has a `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        let Some(kind) = self.registry.lookup::<T>() else {
            return false;
        };
        self.entities
            .location(entity)
            .and_then(|loc| loc.archetype)
            .is_some_and(|arch| self.archetypes[arch.index()].has(kind))
    }

    /// Shared reference to `entity`'s `T`.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        let kind = self.registry.kind_of::<T>()?;
        let loc = self.live_location(entity)?;
        loc.archetype
            .and_then(|arch| self.archetypes[arch.index()].get::<T>(kind, loc.row))
            .ok_or(EcsError::MissingComponent {
                entity,
                component: std::any::type_name::<T>(),
            })
    }

    /// Mutable reference to `entity`'s `T`. Not a structural edit.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        let kind = self.registry.kind_of::<T>()?;
        let loc = self.live_location(entity)?;
        loc.archetype
            .and_then(|arch| self.archetypes[arch.index()].get_mut::<T>(kind, loc.row))
            .ok_or(EcsError::MissingComponent {
                entity,
                component: std::any::type_name::<T>(),
            })
    }

    // -- views --------------------------------------------------------------

    /// A view over every entity that has all of `Q`'s components.
    pub fn view<Q: Query>(&self) -> Result<View<Q>, EcsError> {
        View::new(self, Signature::new())
    }

    /// Like [`view`](Self::view), but skipping entities that have any
    /// component of `X`.
    ///
    /// ```
    /// use strata_ecs::prelude::*;
    ///
    /// #[derive(Debug, Clone)]
    /// struct Position(f32);
    /// #[derive(Debug, Clone)]
    /// struct Hidden;
    ///
    /// let mut world = World::new();
    /// world.register_component::<Position>().unwrap();
    /// world.register_component::<Hidden>().unwrap();
    /// world.spawn((Position(1.0),)).unwrap();
    /// world.spawn((Position(2.0), Hidden)).unwrap();
    ///
    /// let view = world.view_with_exclude::<(&Position,), (Hidden,)>().unwrap();
    /// let mut seen = Vec::new();
    /// view.each(&mut world, |(p,)| seen.push(p.0)).unwrap();
    /// assert_eq!(seen, vec![1.0]);
    /// ```
    pub fn view_with_exclude<Q: Query, X: ComponentSet>(&self) -> Result<View<Q>, EcsError> {
        let excluded = Signature::from_kinds(X::kinds(&self.registry)?);
        View::new(self, excluded)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrow two distinct archetypes mutably.
fn pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeId,
    b: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
    let (a, b) = (a.index(), b.index());
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = archetypes.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = archetypes.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

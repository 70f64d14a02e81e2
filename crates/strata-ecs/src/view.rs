//! Views: iterating every entity that matches a query.
//!
//! A [`View`] is bound to one world, a required signature (the query's
//! components), and an optional excluded signature. An archetype matches when
//! its signature contains every required kind and none of the excluded ones.
//!
//! Views run in two modes:
//!
//! - **Uncached**: [`View::each`] and [`View::each_with_entity`] re-scan the
//!   world's archetype list on every call.
//! - **Cached**: [`View::cache_archetypes`] snapshots, per matching archetype,
//!   the row count and the raw column pointers. [`View::each_cached`] and the
//!   parallel variants then skip the scan. The snapshot records the world's
//!   structural generation; after any structural edit, cached iteration fails
//!   with [`EcsError::StaleViewCache`] until the cache is rebuilt.
//!
//! Every iteration method takes `&mut World`, so no structural edit can run
//! while references handed to the callback are alive.

use std::marker::PhantomData;

use tracing::debug;

use crate::column::ColumnPtr;
use crate::component::ComponentKind;
use crate::entity::Entity;
use crate::executor::{Executor, Task};
use crate::query::Query;
use crate::signature::Signature;
use crate::world::{World, WorldId};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Snapshot of one matching archetype.
struct CachedArchetype<P> {
    rows: usize,
    ptrs: P,
    entities: ColumnPtr<Entity>,
}

impl<P: Copy> Clone for CachedArchetype<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Copy> Copy for CachedArchetype<P> {}

struct ViewCache<P> {
    generation: u64,
    entries: Vec<CachedArchetype<P>>,
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Iterates the entities of one world that carry all of `Q`'s components
/// (and none of the excluded ones).
///
/// Built by [`World::view`] or [`World::view_with_exclude`].
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
/// let e = world
///     .spawn((Position { x: 1.0, y: 2.0 }, Velocity { x: 1.0, y: 1.0 }))
///     .unwrap();
///
/// let mut view = world.view::<(&mut Position, &Velocity)>().unwrap();
/// view.cache_archetypes(&mut world).unwrap();
/// view.each_cached_par_single(&mut world, &RayonExecutor::global(), |(pos, vel)| {
///     pos.x += vel.x;
///     pos.y += vel.y;
/// })
/// .unwrap();
/// assert_eq!(world.get_component::<Position>(e).unwrap(), &Position { x: 2.0, y: 3.0 });
/// ```
pub struct View<Q: Query> {
    world: WorldId,
    required: Signature,
    excluded: Signature,
    /// Query kinds in tuple order.
    kinds: Vec<ComponentKind>,
    chunk_rows: usize,
    cache: Option<ViewCache<Q::Ptrs>>,
    _marker: PhantomData<fn() -> Q>,
}

impl<Q: Query> View<Q> {
    pub(crate) fn new(world: &World, excluded: Signature) -> Result<Self, EcsError> {
        let kinds: Vec<ComponentKind> = Q::accesses(world.registry())?
            .into_iter()
            .map(|access| access.kind)
            .collect();
        Ok(Self {
            world: world.id(),
            required: Signature::from_kinds(kinds.iter().copied()),
            excluded,
            kinds,
            chunk_rows: world.config().parallel_chunk_rows,
            cache: None,
            _marker: PhantomData,
        })
    }

    /// The kinds an archetype must carry to match.
    pub fn required(&self) -> &Signature {
        &self.required
    }

    /// The kinds that disqualify an archetype.
    pub fn excluded(&self) -> &Signature {
        &self.excluded
    }

    /// Whether an archetype with `signature` is visited by this view.
    pub fn matches(&self, signature: &Signature) -> bool {
        signature.contains(&self.required) && !signature.intersects(&self.excluded)
    }

    /// Override the rows per parallel work unit (defaults to the world's
    /// `parallel_chunk_rows`). Values below 1 are treated as 1.
    pub fn set_chunk_rows(&mut self, rows: usize) {
        self.chunk_rows = rows.max(1);
    }

    fn check_world(&self, world: &World) -> Result<(), EcsError> {
        if world.id() != self.world {
            return Err(EcsError::ForeignWorld);
        }
        Ok(())
    }

    /// Scan the world and resolve pointers for every matching archetype.
    fn collect(&self, world: &mut World) -> Result<Vec<CachedArchetype<Q::Ptrs>>, EcsError> {
        self.check_world(world)?;
        let mut entries = Vec::new();
        for archetype in world.archetypes_mut() {
            if !self.matches(archetype.signature()) {
                continue;
            }
            entries.push(CachedArchetype {
                rows: archetype.len(),
                ptrs: Q::resolve(archetype, &self.kinds)?,
                entities: archetype.entities_ptr(),
            });
        }
        Ok(entries)
    }

    fn fresh_entries(&self, world: &World) -> Result<&[CachedArchetype<Q::Ptrs>], EcsError> {
        self.check_world(world)?;
        let cache = self.cache.as_ref().ok_or(EcsError::ViewNotCached)?;
        let current = world.structural_generation();
        if cache.generation != current {
            debug!(
                cached = cache.generation,
                current, "rejecting stale view cache"
            );
            return Err(EcsError::StaleViewCache {
                cached: cache.generation,
                current,
            });
        }
        Ok(&cache.entries)
    }

    // -- uncached -----------------------------------------------------------

    /// Call `f` once per matching row, in archetype order then row order.
    ///
    /// # Errors
    ///
    /// [`EcsError::ForeignWorld`] if `world` is not the world the view was
    /// built from.
    pub fn each<'w, F>(&self, world: &'w mut World, mut f: F) -> Result<(), EcsError>
    where
        F: FnMut(Q::Item<'w>),
    {
        let entries = self.collect(world)?;
        for entry in &entries {
            for row in 0..entry.rows {
                // Safety: `world` stays exclusively borrowed for 'w, each row
                // is fetched once, and the query was checked for aliasing.
                f(unsafe { Q::fetch(entry.ptrs, row) });
            }
        }
        Ok(())
    }

    /// Like [`each`](Self::each), also passing each row's entity.
    pub fn each_with_entity<'w, F>(&self, world: &'w mut World, mut f: F) -> Result<(), EcsError>
    where
        F: FnMut(Entity, Q::Item<'w>),
    {
        let entries = self.collect(world)?;
        for entry in &entries {
            for row in 0..entry.rows {
                // Safety: as in `each`.
                let (entity, item) = unsafe { (*entry.entities.get(row), Q::fetch(entry.ptrs, row)) };
                f(entity, item);
            }
        }
        Ok(())
    }

    // -- cached -------------------------------------------------------------

    /// Snapshot every matching archetype for the cached iteration methods.
    pub fn cache_archetypes(&mut self, world: &mut World) -> Result<(), EcsError> {
        let entries = self.collect(world)?;
        self.cache = Some(ViewCache {
            generation: world.structural_generation(),
            entries,
        });
        Ok(())
    }

    /// Drop the snapshot.
    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// Whether a snapshot exists and no structural edit has happened since.
    pub fn is_cache_fresh(&self, world: &World) -> bool {
        self.fresh_entries(world).is_ok()
    }

    /// Number of archetypes in the snapshot, if any.
    pub fn cached_archetype_count(&self) -> Option<usize> {
        self.cache.as_ref().map(|cache| cache.entries.len())
    }

    /// Call `f` once per row of the snapshot.
    ///
    /// # Errors
    ///
    /// - [`EcsError::ViewNotCached`] if no snapshot was taken.
    /// - [`EcsError::StaleViewCache`] if the world changed structurally since.
    /// - [`EcsError::ForeignWorld`] for a different world.
    pub fn each_cached<'w, F>(&self, world: &'w mut World, mut f: F) -> Result<(), EcsError>
    where
        F: FnMut(Q::Item<'w>),
    {
        for entry in self.fresh_entries(world)? {
            for row in 0..entry.rows {
                // Safety: the generation check proves no row was added or
                // removed since the pointers were taken.
                f(unsafe { Q::fetch(entry.ptrs, row) });
            }
        }
        Ok(())
    }

    /// Like [`each_cached`](Self::each_cached), also passing each row's entity.
    pub fn each_cached_with_entity<'w, F>(
        &self,
        world: &'w mut World,
        mut f: F,
    ) -> Result<(), EcsError>
    where
        F: FnMut(Entity, Q::Item<'w>),
    {
        for entry in self.fresh_entries(world)? {
            for row in 0..entry.rows {
                // Safety: as in `each_cached`.
                let (entity, item) = unsafe { (*entry.entities.get(row), Q::fetch(entry.ptrs, row)) };
                f(entity, item);
            }
        }
        Ok(())
    }

    // -- parallel -----------------------------------------------------------

    /// Split every cached archetype into chunks of at most `chunk_rows` rows.
    fn chunks(&self, world: &World) -> Result<Vec<(CachedArchetype<Q::Ptrs>, usize, usize)>, EcsError> {
        let mut chunks = Vec::new();
        for entry in self.fresh_entries(world)? {
            let mut start = 0;
            while start < entry.rows {
                let len = self.chunk_rows.min(entry.rows - start);
                chunks.push((*entry, start, len));
                start += len;
            }
        }
        Ok(chunks)
    }

    /// Submit one task per chunk of cached rows; each task calls `f` with the
    /// chunk's entities and one slice per query element. Chunks may run in any
    /// order and concurrently.
    pub fn each_cached_par_batch<'w, E, F>(
        &self,
        world: &'w mut World,
        executor: &E,
        f: F,
    ) -> Result<(), EcsError>
    where
        E: Executor + ?Sized,
        F: Fn(&'w [Entity], Q::Slices<'w>) + Sync,
    {
        let chunks = self.chunks(world)?;
        let f = &f;
        let tasks: Vec<Task<'_>> = chunks
            .into_iter()
            .map(|(entry, start, len)| {
                Box::new(move || {
                    // Safety: chunks cover disjoint row ranges, the cache is
                    // fresh, and `world` is exclusively borrowed for 'w.
                    let (entities, slices) =
                        unsafe { (entry.entities.slice(start, len), Q::slices(entry.ptrs, start, len)) };
                    f(entities, slices);
                }) as Task<'_>
            })
            .collect();
        executor.run_all(tasks);
        Ok(())
    }

    /// Submit one task per chunk of cached rows; each task calls `f` once per
    /// row of its chunk.
    pub fn each_cached_par_single<'w, E, F>(
        &self,
        world: &'w mut World,
        executor: &E,
        f: F,
    ) -> Result<(), EcsError>
    where
        E: Executor + ?Sized,
        F: Fn(Q::Item<'w>) + Sync,
    {
        let chunks = self.chunks(world)?;
        let f = &f;
        let tasks: Vec<Task<'_>> = chunks
            .into_iter()
            .map(|(entry, start, len)| {
                Box::new(move || {
                    for row in start..start + len {
                        // Safety: as in `each_cached_par_batch`.
                        f(unsafe { Q::fetch(entry.ptrs, row) });
                    }
                }) as Task<'_>
            })
            .collect();
        executor.run_all(tasks);
        Ok(())
    }
}

impl<Q: Query> std::fmt::Debug for View<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("required", &self.required)
            .field("excluded", &self.excluded)
            .field("chunk_rows", &self.chunk_rows)
            .field("cached", &self.cached_archetype_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

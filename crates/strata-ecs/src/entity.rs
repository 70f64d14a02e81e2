//! Entity identifiers and the entity location table.
//!
//! An [`Entity`] is a 64-bit handle that packs a *generation* counter in the
//! high 32 bits and an *index* in the low 32 bits. The generation is bumped
//! every time an index is destroyed, so a handle held across a
//! destroy/create cycle is detected as stale instead of silently aliasing the
//! new occupant.
//!
//! [`EntityIndex`] maps each index to its current [`EntityLocation`] and owns
//! the free list used to recycle indices.

use std::fmt;

use crate::archetype::ArchetypeId;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u64);

impl Entity {
    /// Construct an `Entity` from an index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityLocation
// ---------------------------------------------------------------------------

/// Where an entity lives: which archetype and which row within it.
///
/// `archetype == None` means the entity is alive but carries no components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype: Option<ArchetypeId>,
    pub row: usize,
}

impl EntityLocation {
    /// The location of an entity without components.
    pub const EMPTY: Self = Self {
        archetype: None,
        row: 0,
    };

    /// A location inside `archetype` at `row`.
    #[inline]
    pub fn new(archetype: ArchetypeId, row: usize) -> Self {
        Self {
            archetype: Some(archetype),
            row,
        }
    }
}

// ---------------------------------------------------------------------------
// EntityIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    alive: bool,
    location: EntityLocation,
}

/// Allocates entities, recycles their indices, and tracks their locations.
///
/// Free indices are reused last-in first-out, so destroying an entity and
/// immediately creating another hands back the same index (with a newer
/// generation).
#[derive(Debug, Default)]
pub struct EntityIndex {
    slots: Vec<Slot>,
    /// Free-list of recyclable indices (LIFO).
    free: Vec<u32>,
    alive: usize,
}

impl EntityIndex {
    /// Create a new, empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh [`Entity`] with no components.
    pub fn allocate(&mut self) -> Entity {
        self.alive += 1;
        if let Some(index) = self.free.pop() {
            // Generation was already bumped on release.
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            slot.location = EntityLocation::EMPTY;
            Entity::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                alive: true,
                location: EntityLocation::EMPTY,
            });
            Entity::new(index, 0)
        }
    }

    /// Release `entity`, bumping the generation for its index so outstanding
    /// handles become stale.
    ///
    /// Returns `false` if the entity was already dead or the handle is stale.
    pub fn release(&mut self, entity: Entity) -> bool {
        let Some(slot) = self.live_slot_mut(entity) else {
            return false;
        };
        slot.alive = false;
        slot.location = EntityLocation::EMPTY;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entity.index());
        self.alive -= 1;
        true
    }

    fn live_slot_mut(&mut self, entity: Entity) -> Option<&mut Slot> {
        self.slots
            .get_mut(entity.index() as usize)
            .filter(|slot| slot.alive && slot.generation == entity.generation())
    }

    /// Whether `entity` is alive and its generation is current.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.location(entity).is_some()
    }

    /// The location of a live entity.
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        self.slots
            .get(entity.index() as usize)
            .filter(|slot| slot.alive && slot.generation == entity.generation())
            .map(|slot| slot.location)
    }

    /// Overwrite the location of a live entity. Ignored for stale handles.
    pub(crate) fn set_location(&mut self, entity: Entity, location: EntityLocation) {
        if let Some(slot) = self.live_slot_mut(entity) {
            slot.location = location;
        }
    }

    /// Update only the row of a live entity (swap-remove fix-up).
    pub(crate) fn set_row(&mut self, entity: Entity, row: usize) {
        if let Some(slot) = self.live_slot_mut(entity) {
            slot.location.row = row;
        }
    }

    /// Number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        self.alive
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

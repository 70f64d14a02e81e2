//! Multi-component insertion.
//!
//! Adding components one at a time migrates the entity once per component.
//! Both types here stage several components so the world can perform a
//! single migration:
//!
//! - [`ComponentSet`] is implemented for tuples of 1 to 4 components whose
//!   types are known at compile time.
//! - [`ComponentBatch`] is a runtime-built, type-erased list, for callers that
//!   assemble the set dynamically.

use std::any::{Any, TypeId};

use crate::archetype::Archetype;
use crate::component::{Component, ComponentKind, ComponentRegistry};
use crate::signature::Signature;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentBatch
// ---------------------------------------------------------------------------

struct BatchEntry {
    kind: ComponentKind,
    name: &'static str,
    type_id: TypeId,
    value: Box<dyn Any + Send + Sync>,
}

/// A staged list of owned, type-erased component values plus the union
/// signature of their kinds.
///
/// Consumed by [`World::add_batch`](crate::world::World::add_batch), which
/// clears the batch on success. Values still staged when the batch is
/// cleared or dropped are dropped normally.
///
/// ```
/// use strata_ecs::prelude::*;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Hp(u32);
/// #[derive(Debug, Clone, PartialEq)]
/// struct Armor(u32);
///
/// let mut world = World::new();
/// world.register_component::<Hp>().unwrap();
/// world.register_component::<Armor>().unwrap();
///
/// let mut batch = ComponentBatch::new();
/// batch.add(world.registry(), Hp(10)).unwrap();
/// batch.add(world.registry(), Armor(3)).unwrap();
///
/// let e = world.create_entity();
/// world.add_batch(e, &mut batch).unwrap();
/// assert!(batch.is_empty());
/// assert_eq!(world.get_component::<Armor>(e).unwrap(), &Armor(3));
/// ```
#[derive(Default)]
pub struct ComponentBatch {
    signature: Signature,
    entries: Vec<BatchEntry>,
}

impl ComponentBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `value`. `T` must be registered in `registry`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnregisteredComponent`] if `T` is unknown to `registry`.
    /// - [`EcsError::DuplicateInSet`] if a `T` is already staged.
    pub fn add<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        value: T,
    ) -> Result<(), EcsError> {
        let kind = registry.kind_of::<T>()?;
        if self.signature.test(kind) {
            return Err(EcsError::DuplicateInSet {
                component: std::any::type_name::<T>(),
            });
        }
        self.signature.set(kind);
        self.entries.push(BatchEntry {
            kind,
            name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            value: Box::new(value),
        });
        Ok(())
    }

    /// Union of the staged kinds.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Staged kinds in insertion order.
    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.entries.iter().map(|entry| entry.kind)
    }

    /// Number of staged values.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is staged.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every staged value.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.signature = Signature::new();
    }

    /// Check that every staged kind is registered in `registry` for the same
    /// type it was staged as. A batch built against another world's registry
    /// fails here rather than partway through a migration.
    pub(crate) fn check_kinds(&self, registry: &ComponentRegistry) -> Result<(), EcsError> {
        for entry in &self.entries {
            let info = registry
                .info(entry.kind)
                .ok_or(EcsError::UnknownKind { kind: entry.kind })?;
            if info.type_id != entry.type_id {
                return Err(EcsError::ColumnTypeMismatch {
                    expected: info.name,
                    found: entry.name,
                });
            }
        }
        Ok(())
    }

    /// Name of the staged type for `kind`.
    pub(crate) fn name_of(&self, kind: ComponentKind) -> &'static str {
        self.entries
            .iter()
            .find(|entry| entry.kind == kind)
            .map_or("<unknown>", |entry| entry.name)
    }

    /// Hand the staged values over and leave the batch empty.
    pub(crate) fn take_values(
        &mut self,
    ) -> impl Iterator<Item = (ComponentKind, Box<dyn Any + Send + Sync>)> {
        self.signature = Signature::new();
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|entry| (entry.kind, entry.value))
    }
}

impl std::fmt::Debug for ComponentBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| entry.name))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// A statically typed set of components, added in one migration.
///
/// Implemented for tuples of 1 to 4 components. Also names the excluded
/// kinds of a view (see [`World::view_with_exclude`](crate::world::World::view_with_exclude)).
pub trait ComponentSet: Send + Sync + 'static {
    /// Kinds of the tuple's types, in tuple order. Fails on an unregistered
    /// or repeated type.
    fn kinds(registry: &ComponentRegistry) -> Result<Vec<ComponentKind>, EcsError>;

    /// Append each value to its column in `archetype`. `kinds` is the output
    /// of [`kinds`](Self::kinds).
    fn push_into(self, archetype: &mut Archetype, kinds: &[ComponentKind]) -> Result<(), EcsError>;
}

fn reject_duplicates(
    kinds: &[ComponentKind],
    names: &[&'static str],
) -> Result<(), EcsError> {
    for (i, kind) in kinds.iter().enumerate() {
        if kinds[..i].contains(kind) {
            return Err(EcsError::DuplicateInSet { component: names[i] });
        }
    }
    Ok(())
}

macro_rules! impl_component_set {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn kinds(registry: &ComponentRegistry) -> Result<Vec<ComponentKind>, EcsError> {
                let kinds = vec![$(registry.kind_of::<$name>()?),+];
                reject_duplicates(&kinds, &[$(std::any::type_name::<$name>()),+])?;
                Ok(kinds)
            }

            fn push_into(self, archetype: &mut Archetype, kinds: &[ComponentKind]) -> Result<(), EcsError> {
                $(archetype.push_value(kinds[$idx], self.$idx)?;)+
                Ok(())
            }
        }
    };
}

impl_component_set!(A 0);
impl_component_set!(A 0, B 1);
impl_component_set!(A 0, B 1, C 2);
impl_component_set!(A 0, B 1, C 2, D 3);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Pos(f32);

    #[derive(Debug, Clone, PartialEq)]
    struct Vel(f32);

    /// Counts drops so tests can see staged values being released.
    #[derive(Debug, Clone)]
    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry() -> ComponentRegistry {
        let mut reg = ComponentRegistry::new(32);
        reg.register::<Pos>().unwrap();
        reg.register::<Vel>().unwrap();
        reg.register::<Tracked>().unwrap();
        reg
    }

    #[test]
    fn batch_tracks_signature() {
        let reg = registry();
        let mut batch = ComponentBatch::new();
        batch.add(&reg, Vel(1.0)).unwrap();
        batch.add(&reg, Pos(2.0)).unwrap();
        let pos = reg.lookup::<Pos>().unwrap();
        let vel = reg.lookup::<Vel>().unwrap();
        assert_eq!(batch.signature(), &Signature::from_kinds([pos, vel]));
        assert_eq!(batch.kinds().collect::<Vec<_>>(), vec![vel, pos]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn batch_rejects_duplicate_and_unregistered() {
        let reg = registry();
        let mut batch = ComponentBatch::new();
        batch.add(&reg, Pos(0.0)).unwrap();
        assert!(matches!(
            batch.add(&reg, Pos(1.0)),
            Err(EcsError::DuplicateInSet { .. })
        ));
        assert!(matches!(
            batch.add(&reg, 5u64),
            Err(EcsError::UnregisteredComponent { .. })
        ));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn clear_drops_staged_values() {
        let reg = registry();
        let drops = Arc::new(AtomicUsize::new(0));
        let mut batch = ComponentBatch::new();
        batch.add(&reg, Tracked(drops.clone())).unwrap();
        batch.clear();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(batch.is_empty());
        assert!(batch.signature().is_empty());
    }

    #[test]
    fn tuple_kinds_in_order() {
        let reg = registry();
        let kinds = <(Vel, Pos)>::kinds(&reg).unwrap();
        assert_eq!(kinds, vec![reg.lookup::<Vel>().unwrap(), reg.lookup::<Pos>().unwrap()]);
    }

    #[test]
    fn tuple_with_repeated_type_is_rejected() {
        let reg = registry();
        assert!(matches!(
            <(Pos, Vel, Pos)>::kinds(&reg),
            Err(EcsError::DuplicateInSet { .. })
        ));
    }

    #[test]
    fn check_kinds_rejects_foreign_registry() {
        let reg = registry();
        let mut other = ComponentRegistry::new(32);
        other.register::<Vel>().unwrap();

        let mut batch = ComponentBatch::new();
        batch.add(&other, Vel(1.0)).unwrap();
        assert!(batch.check_kinds(&other).is_ok());
        // Vel is kind 0 in `other`, but kind 0 is Pos in `reg`.
        assert!(matches!(
            batch.check_kinds(&reg),
            Err(EcsError::ColumnTypeMismatch { .. })
        ));
        assert!(matches!(
            batch.check_kinds(&ComponentRegistry::new(32)),
            Err(EcsError::UnknownKind { .. })
        ));
        assert_eq!(batch.len(), 1);
    }
}

//! Component kinds and registration.
//!
//! Every component type used in a world must be registered in that world's
//! [`ComponentRegistry`]. Registration assigns a dense [`ComponentKind`] and
//! records a column factory, so an archetype can build storage for any kind
//! without compile-time knowledge of its type.
//!
//! Each world owns its own registry; two worlds in one process never share or
//! race on kind assignment.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use crate::column::{ErasedColumn, TypedColumn};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker trait for types that can be stored as components.
///
/// `Clone` is needed because migrating a row between archetypes copies the
/// shared values into the destination before the source row is removed.
pub trait Component: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Dense identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKind(pub(crate) u32);

impl ComponentKind {
    /// Construct a kind from a raw index.
    #[inline]
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// The raw index of this kind.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKind({})", self.0)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Produces an empty column for one component type.
pub type ColumnFactory = fn() -> Box<dyn ErasedColumn>;

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Kind assigned at registration time.
    pub kind: ComponentKind,
    /// `std::any::type_name::<T>()`
    pub name: &'static str,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
    /// Builds an empty column for this type.
    pub factory: ColumnFactory,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping Rust types to [`ComponentKind`]s and their column factories.
///
/// Registering a type twice returns the existing kind.
#[derive(Debug)]
pub struct ComponentRegistry {
    /// TypeId -> ComponentKind for dedup.
    by_type: HashMap<TypeId, ComponentKind>,
    /// Indexed by `ComponentKind::index()`; `None` for unassigned kinds.
    infos: Vec<Option<ComponentInfo>>,
    /// Lowest kind the automatic assignment will consider next.
    next_auto: usize,
    /// Exclusive upper bound on kind indices.
    limit: usize,
    registered: usize,
}

impl ComponentRegistry {
    /// Create an empty registry that hands out at most `limit` kinds.
    pub fn new(limit: usize) -> Self {
        Self {
            by_type: HashMap::new(),
            infos: Vec::new(),
            next_auto: 0,
            limit,
            registered: 0,
        }
    }

    /// Register `T`, assigning the next free kind.
    ///
    /// # Errors
    ///
    /// [`EcsError::KindLimitExceeded`] if every kind below the limit is taken.
    pub fn register<T: Component>(&mut self) -> Result<ComponentKind, EcsError> {
        if let Some(&existing) = self.by_type.get(&TypeId::of::<T>()) {
            return Ok(existing);
        }
        let mut index = self.next_auto;
        while self.infos.get(index).is_some_and(Option::is_some) {
            index += 1;
        }
        if index >= self.limit {
            return Err(EcsError::KindLimitExceeded {
                kind: index,
                limit: self.limit,
            });
        }
        self.next_auto = index + 1;
        Ok(self.insert::<T>(ComponentKind::from_index(index)))
    }

    /// Register `T` under a caller-chosen kind (stable-id mode).
    ///
    /// Re-registering the same type under the same kind is a no-op.
    ///
    /// # Errors
    ///
    /// - [`EcsError::KindLimitExceeded`] if `kind` is at or above the limit.
    /// - [`EcsError::KindConflict`] if `kind` belongs to another type, or `T`
    ///   is already registered under a different kind.
    pub fn register_with_kind<T: Component>(
        &mut self,
        kind: ComponentKind,
    ) -> Result<ComponentKind, EcsError> {
        if kind.index() >= self.limit {
            return Err(EcsError::KindLimitExceeded {
                kind: kind.index(),
                limit: self.limit,
            });
        }
        let requested = std::any::type_name::<T>();
        if let Some(&existing) = self.by_type.get(&TypeId::of::<T>()) {
            if existing == kind {
                return Ok(kind);
            }
            return Err(EcsError::KindConflict {
                kind,
                existing: self.name(existing).unwrap_or(requested),
                requested,
            });
        }
        if let Some(info) = self.info(kind) {
            return Err(EcsError::KindConflict {
                kind,
                existing: info.name,
                requested,
            });
        }
        Ok(self.insert::<T>(kind))
    }

    fn insert<T: Component>(&mut self, kind: ComponentKind) -> ComponentKind {
        let index = kind.index();
        if index >= self.infos.len() {
            self.infos.resize_with(index + 1, || None);
        }
        self.infos[index] = Some(ComponentInfo {
            kind,
            name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            factory: TypedColumn::<T>::boxed,
        });
        self.by_type.insert(TypeId::of::<T>(), kind);
        self.registered += 1;
        kind
    }

    /// Look up the kind registered for `T`.
    #[inline]
    pub fn lookup<T: 'static>(&self) -> Option<ComponentKind> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Like [`lookup`](Self::lookup) but reports an unregistered type as an error.
    pub fn kind_of<T: 'static>(&self) -> Result<ComponentKind, EcsError> {
        self.lookup::<T>().ok_or(EcsError::UnregisteredComponent {
            component: std::any::type_name::<T>(),
        })
    }

    /// Metadata for a registered kind.
    pub fn info(&self, kind: ComponentKind) -> Option<&ComponentInfo> {
        self.infos.get(kind.index()).and_then(Option::as_ref)
    }

    /// The type name registered for `kind`.
    pub fn name(&self, kind: ComponentKind) -> Option<&'static str> {
        self.info(kind).map(|info| info.name)
    }

    /// Build an empty column for `kind` using its registered factory.
    pub fn make_column(&self, kind: ComponentKind) -> Result<Box<dyn ErasedColumn>, EcsError> {
        let info = self.info(kind).ok_or(EcsError::UnknownKind { kind })?;
        Ok((info.factory)())
    }

    /// The exclusive upper bound on kind indices.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.registered
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.registered == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone)]
    struct Tag;

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::new(16);
        let id = reg.register::<Pos>().unwrap();
        assert_eq!(reg.lookup::<Pos>(), Some(id));
        assert_eq!(id.index(), 0);
    }

    #[test]
    fn same_type_same_kind() {
        let mut reg = ComponentRegistry::new(16);
        let a = reg.register::<Pos>().unwrap();
        let b = reg.register::<Pos>().unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn kinds_are_dense_and_monotonic() {
        let mut reg = ComponentRegistry::new(16);
        let p = reg.register::<Pos>().unwrap();
        let v = reg.register::<Vel>().unwrap();
        assert_eq!((p.index(), v.index()), (0, 1));
    }

    #[test]
    fn limit_is_reported() {
        let mut reg = ComponentRegistry::new(2);
        reg.register::<Pos>().unwrap();
        reg.register::<Vel>().unwrap();
        let err = reg.register::<Tag>().unwrap_err();
        assert!(matches!(err, EcsError::KindLimitExceeded { kind: 2, limit: 2 }));
    }

    #[test]
    fn stable_kind_registration() {
        let mut reg = ComponentRegistry::new(16);
        let v = reg.register_with_kind::<Vel>(ComponentKind::from_index(5)).unwrap();
        assert_eq!(v.index(), 5);
        // Same type, same kind: idempotent.
        assert_eq!(reg.register_with_kind::<Vel>(v).unwrap(), v);
        // Another type cannot take kind 5.
        let err = reg
            .register_with_kind::<Pos>(ComponentKind::from_index(5))
            .unwrap_err();
        assert!(matches!(err, EcsError::KindConflict { .. }));
        assert_eq!(reg.register::<Pos>().unwrap().index(), 0);
    }

    #[test]
    fn auto_assignment_skips_stable_kinds() {
        let mut reg = ComponentRegistry::new(16);
        reg.register_with_kind::<Tag>(ComponentKind::from_index(0)).unwrap();
        assert_eq!(reg.register::<Pos>().unwrap().index(), 1);
    }

    #[test]
    fn factory_builds_empty_column() {
        let mut reg = ComponentRegistry::new(16);
        let p = reg.register::<Pos>().unwrap();
        let col = reg.make_column(p).unwrap();
        assert_eq!(col.len(), 0);
        assert_eq!(col.component_name(), std::any::type_name::<Pos>());
        assert!(matches!(
            reg.make_column(ComponentKind::from_index(9)),
            Err(EcsError::UnknownKind { .. })
        ));
    }
}

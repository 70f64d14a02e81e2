//! Archetype storage.
//!
//! An [`Archetype`] stores all entities that share the exact same
//! [`Signature`]. Components are laid out Structure-of-Arrays: one column per
//! kind in the signature, plus a parallel entity list mapping row to entity.
//! Row `i` of every column and of the entity list describes the same entity.
//!
//! Archetypes are created lazily the first time a signature is needed and
//! live as long as their world, even when empty.

use crate::column::{ColumnPtr, ErasedColumn, TypedColumn};
use crate::component::{Component, ComponentKind, ComponentRegistry};
use crate::entity::{Entity, EntityIndex};
use crate::signature::Signature;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype within the world. Index into `World::archetypes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    /// Position of the archetype in the world's archetype list.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Marks a kind with no column in the dense kind -> column map.
const NO_COLUMN: u16 = u16::MAX;

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// All entities sharing one exact component set, stored column-wise.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    signature: Signature,
    /// Kinds in ascending order; `kinds[i]` is stored in `columns[i]`.
    kinds: Vec<ComponentKind>,
    /// Dense map indexed by kind; `NO_COLUMN` where absent. Sized to the
    /// highest kind in the signature, so lookups past the end are misses.
    kind_to_column: Vec<u16>,
    columns: Vec<Box<dyn ErasedColumn>>,
    /// Row -> entity. Invariant: `entities.len() == column.len()` for every column.
    entities: Vec<Entity>,
}

impl Archetype {
    /// Create an empty archetype, building one column per kind in `signature`
    /// from the registry's factories.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownKind`] if a kind in the signature was never registered.
    pub fn new(
        id: ArchetypeId,
        signature: Signature,
        registry: &ComponentRegistry,
    ) -> Result<Self, EcsError> {
        let map_len = signature.max_kind().map_or(0, |k| k.index() + 1);
        let mut kind_to_column = vec![NO_COLUMN; map_len];
        let mut kinds = Vec::with_capacity(signature.len());
        let mut columns = Vec::with_capacity(signature.len());
        for kind in signature.iter() {
            kind_to_column[kind.index()] = columns.len() as u16;
            columns.push(registry.make_column(kind)?);
            kinds.push(kind);
        }
        Ok(Self {
            id,
            signature,
            kinds,
            kind_to_column,
            columns,
            entities: Vec::new(),
        })
    }

    /// The archetype's id.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The component set that defines this archetype.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The kinds stored here, ascending.
    #[inline]
    pub fn component_kinds(&self) -> &[ComponentKind] {
        &self.kinds
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the archetype holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Row -> entity.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[inline]
    fn column_index(&self, kind: ComponentKind) -> Option<usize> {
        match self.kind_to_column.get(kind.index()) {
            Some(&idx) if idx != NO_COLUMN => Some(idx as usize),
            _ => None,
        }
    }

    /// Whether this archetype stores `kind`.
    #[inline]
    pub fn has(&self, kind: ComponentKind) -> bool {
        self.column_index(kind).is_some()
    }

    fn typed<T: Component>(&self, kind: ComponentKind) -> Option<&TypedColumn<T>> {
        let idx = self.column_index(kind)?;
        self.columns[idx].as_any().downcast_ref::<TypedColumn<T>>()
    }

    fn typed_mut<T: Component>(&mut self, kind: ComponentKind) -> Option<&mut TypedColumn<T>> {
        let idx = self.column_index(kind)?;
        self.columns[idx].as_any_mut().downcast_mut::<TypedColumn<T>>()
    }

    /// The whole column for `kind` as a typed slice.
    pub fn column<T: Component>(&self, kind: ComponentKind) -> Option<&[T]> {
        self.typed::<T>(kind).map(TypedColumn::as_slice)
    }

    /// The whole column for `kind` as a mutable typed slice.
    pub fn column_mut<T: Component>(&mut self, kind: ComponentKind) -> Option<&mut [T]> {
        self.typed_mut::<T>(kind).map(TypedColumn::as_mut_slice)
    }

    /// Base pointer of the column for `kind`, for cached iteration.
    pub(crate) fn column_ptr<T: Component>(&mut self, kind: ComponentKind) -> Option<ColumnPtr<T>> {
        self.typed_mut::<T>(kind).map(TypedColumn::base_ptr)
    }

    /// Base pointer of the entity list, for cached iteration.
    pub(crate) fn entities_ptr(&mut self) -> ColumnPtr<Entity> {
        ColumnPtr::from_slice(&mut self.entities)
    }

    // -- row operations -----------------------------------------------------

    /// Remove the row at `row` by swap-remove in every column and in the
    /// entity list. If another entity was moved into `row`, its location in
    /// `locations` is updated before returning.
    pub(crate) fn remove_row(&mut self, row: usize, locations: &mut EntityIndex) {
        for column in &mut self.columns {
            column.swap_remove(row);
        }
        self.entities.swap_remove(row);
        if let Some(&moved) = self.entities.get(row) {
            locations.set_row(moved, row);
        }
    }

    /// Append a copy of `row`'s values to `dst` for every kind both
    /// archetypes carry. Kinds only `dst` carries are left for the caller to
    /// fill; the entity list of `dst` is not touched.
    pub(crate) fn copy_row_to(&self, dst: &mut Archetype, row: usize) -> Result<(), EcsError> {
        for (kind, column) in self.kinds.iter().zip(&self.columns) {
            if let Some(d) = dst.column_index(*kind) {
                column.copy_element_to(dst.columns[d].as_mut(), row)?;
            }
        }
        Ok(())
    }

    /// Append a typed value to the column for `kind`.
    pub(crate) fn push_value<T: Component>(
        &mut self,
        kind: ComponentKind,
        value: T,
    ) -> Result<(), EcsError> {
        let found = self.column_name(kind);
        let column = self
            .typed_mut::<T>(kind)
            .ok_or(EcsError::ColumnTypeMismatch {
                expected: std::any::type_name::<T>(),
                found,
            })?;
        column.push(value);
        Ok(())
    }

    /// Append a type-erased value to the column for `kind`.
    pub(crate) fn emplace_erased(
        &mut self,
        kind: ComponentKind,
        value: Box<dyn std::any::Any + Send + Sync>,
    ) -> Result<(), EcsError> {
        let idx = self.column_index(kind).ok_or(EcsError::UnknownKind { kind })?;
        self.columns[idx].emplace_erased(value)
    }

    /// Append `entity` as the newest row and return its row index. Every
    /// column must already hold a value for that row.
    pub(crate) fn push_entity(&mut self, entity: Entity) -> usize {
        debug_assert!(self.columns.iter().all(|c| c.len() == self.entities.len() + 1));
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Drop values pushed into the columns for a row that never got its
    /// entity, restoring `entities.len() == column.len()`.
    pub(crate) fn discard_partial_row(&mut self) {
        let rows = self.entities.len();
        for column in &mut self.columns {
            column.truncate(rows);
        }
    }

    fn column_name(&self, kind: ComponentKind) -> &'static str {
        self.column_index(kind)
            .map_or("<absent>", |idx| self.columns[idx].component_name())
    }

    /// Typed reference to the value of `kind` at `row`.
    pub fn get<T: Component>(&self, kind: ComponentKind, row: usize) -> Option<&T> {
        self.typed::<T>(kind)?.as_slice().get(row)
    }

    /// Typed mutable reference to the value of `kind` at `row`.
    pub fn get_mut<T: Component>(&mut self, kind: ComponentKind, row: usize) -> Option<&mut T> {
        self.typed_mut::<T>(kind)?.as_mut_slice().get_mut(row)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Type-erased component columns.
//!
//! A column is the densely packed array backing one component kind inside one
//! archetype. Archetypes hold their columns as `Box<dyn ErasedColumn>` so they
//! can be built, shrunk, and copied between without knowing the concrete
//! component type; typed access goes through a downcast to [`TypedColumn<T>`].
//!
//! # Safety
//!
//! [`ColumnPtr`] is a bare pointer into a column's backing storage, captured
//! for cached and parallel view iteration. It is only dereferenced by the
//! view module, which checks the world's structural generation first so the
//! storage is known not to have been reallocated.
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs

use std::any::Any;
use std::fmt;
use std::ptr::NonNull;

use crate::component::Component;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ErasedColumn
// ---------------------------------------------------------------------------

/// Operations an archetype needs on a column without knowing its type.
pub trait ErasedColumn: Send + Sync {
    /// Number of stored elements.
    fn len(&self) -> usize;

    /// Whether the column is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the stored component type.
    fn component_name(&self) -> &'static str;

    /// Move the last element into `row` and shrink by one, dropping the value
    /// that was at `row`. O(1); reorders.
    fn swap_remove(&mut self, row: usize);

    /// Drop every element at or past `len`.
    fn truncate(&mut self, len: usize);

    /// Append a clone of the value at `row` to `dst`.
    fn copy_element_to(&self, dst: &mut dyn ErasedColumn, row: usize) -> Result<(), EcsError>;

    /// Append a value handed over as `Box<dyn Any>`.
    ///
    /// # Errors
    ///
    /// [`EcsError::ColumnTypeMismatch`] if the boxed value is not of the
    /// column's type. The value is dropped in that case.
    fn emplace_erased(&mut self, value: Box<dyn Any + Send + Sync>) -> Result<(), EcsError>;

    /// Upcast for typed downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl fmt::Debug for dyn ErasedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("type", &self.component_name())
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TypedColumn
// ---------------------------------------------------------------------------

/// The concrete column for component type `T`.
#[derive(Debug, Clone)]
pub struct TypedColumn<T> {
    data: Vec<T>,
}

impl<T: Component> TypedColumn<T> {
    /// An empty column.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// An empty column, boxed as a trait object. Used as the registry factory.
    pub fn boxed() -> Box<dyn ErasedColumn> {
        Box::new(Self::new())
    }

    /// Append a value.
    #[inline]
    pub fn push(&mut self, value: T) {
        self.data.push(value);
    }

    /// The stored values.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The stored values, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Pointer to the first element, for cached iteration.
    pub(crate) fn base_ptr(&mut self) -> ColumnPtr<T> {
        ColumnPtr::from_slice(&mut self.data)
    }
}

impl<T: Component> Default for TypedColumn<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ErasedColumn for TypedColumn<T> {
    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    fn component_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    #[inline]
    fn swap_remove(&mut self, row: usize) {
        self.data.swap_remove(row);
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    fn copy_element_to(&self, dst: &mut dyn ErasedColumn, row: usize) -> Result<(), EcsError> {
        let found = dst.component_name();
        let dst = dst
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .ok_or(EcsError::ColumnTypeMismatch {
                expected: std::any::type_name::<T>(),
                found,
            })?;
        dst.data.push(self.data[row].clone());
        Ok(())
    }

    fn emplace_erased(&mut self, value: Box<dyn Any + Send + Sync>) -> Result<(), EcsError> {
        let value = value
            .downcast::<T>()
            .map_err(|_| EcsError::ColumnTypeMismatch {
                expected: std::any::type_name::<T>(),
                found: "opaque value",
            })?;
        self.data.push(*value);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// ColumnPtr
// ---------------------------------------------------------------------------

/// A raw pointer to the start of a column's (or entity list's) storage.
///
/// Never dereferenced outside `unsafe` code that has established the storage
/// is still live and unaliased for the rows it touches.
pub struct ColumnPtr<T>(NonNull<T>);

// Safety: the pointee is a component (Send + Sync) or an entity id; access
// discipline is enforced by the view module, which only hands out disjoint
// row ranges to concurrent work units.
unsafe impl<T: Send + Sync> Send for ColumnPtr<T> {}
unsafe impl<T: Send + Sync> Sync for ColumnPtr<T> {}

impl<T> Clone for ColumnPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ColumnPtr<T> {}

impl<T> fmt::Debug for ColumnPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColumnPtr({:p})", self.0)
    }
}

impl<T> ColumnPtr<T> {
    /// Capture the base pointer of `slice`. For an empty slice this is a
    /// dangling but well-aligned pointer.
    #[inline]
    pub(crate) fn from_slice(slice: &mut [T]) -> Self {
        // A slice pointer is never null.
        Self(NonNull::from(slice).cast())
    }

    /// Shared reference to the element at `row`.
    ///
    /// # Safety
    ///
    /// `row` must be in bounds of the live storage, and no `&mut` to the same
    /// element may exist for `'a`.
    #[inline]
    pub(crate) unsafe fn get<'a>(self, row: usize) -> &'a T {
        &*self.0.as_ptr().add(row)
    }

    /// Exclusive reference to the element at `row`.
    ///
    /// # Safety
    ///
    /// `row` must be in bounds, and no other reference to the same element
    /// may exist for `'a`.
    #[inline]
    pub(crate) unsafe fn get_mut<'a>(self, row: usize) -> &'a mut T {
        &mut *self.0.as_ptr().add(row)
    }

    /// Shared slice over `start..start + len`.
    ///
    /// # Safety
    ///
    /// The range must be in bounds and not mutably aliased for `'a`.
    #[inline]
    pub(crate) unsafe fn slice<'a>(self, start: usize, len: usize) -> &'a [T] {
        std::slice::from_raw_parts(self.0.as_ptr().add(start), len)
    }

    /// Exclusive slice over `start..start + len`.
    ///
    /// # Safety
    ///
    /// The range must be in bounds and not aliased at all for `'a`.
    #[inline]
    pub(crate) unsafe fn slice_mut<'a>(self, start: usize, len: usize) -> &'a mut [T] {
        std::slice::from_raw_parts_mut(self.0.as_ptr().add(start), len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    fn column_of(values: &[u32]) -> TypedColumn<u32> {
        let mut col = TypedColumn::new();
        for &v in values {
            col.push(v);
        }
        col
    }

    #[test]
    fn swap_remove_moves_last_into_slot() {
        let mut col = column_of(&[10, 20, 30]);
        ErasedColumn::swap_remove(&mut col, 0);
        assert_eq!(col.as_slice(), &[30, 20]);
        ErasedColumn::swap_remove(&mut col, 1);
        assert_eq!(col.as_slice(), &[30]);
    }

    #[test]
    fn truncate_drops_tail() {
        let mut col = column_of(&[1, 2, 3]);
        ErasedColumn::truncate(&mut col, 1);
        assert_eq!(col.as_slice(), &[1]);
        ErasedColumn::truncate(&mut col, 4);
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn copy_element_between_same_type() {
        let src = column_of(&[1, 2, 3]);
        let mut dst: Box<dyn ErasedColumn> = TypedColumn::<u32>::boxed();
        src.copy_element_to(dst.as_mut(), 1).unwrap();
        let dst = dst.as_any().downcast_ref::<TypedColumn<u32>>().unwrap();
        assert_eq!(dst.as_slice(), &[2]);
        // Source is untouched by a copy.
        assert_eq!(src.len(), 3);
    }

    #[test]
    fn copy_element_type_mismatch() {
        let src = column_of(&[1]);
        let mut dst: Box<dyn ErasedColumn> = TypedColumn::<Pos>::boxed();
        let err = src.copy_element_to(dst.as_mut(), 0).unwrap_err();
        assert!(matches!(err, EcsError::ColumnTypeMismatch { .. }));
        assert_eq!(dst.len(), 0);
    }

    #[test]
    fn emplace_erased_value() {
        let mut col: Box<dyn ErasedColumn> = TypedColumn::<Pos>::boxed();
        col.emplace_erased(Box::new(Pos { x: 1.0, y: 2.0 })).unwrap();
        assert!(col.emplace_erased(Box::new(7u8)).is_err());
        let typed = col.as_any().downcast_ref::<TypedColumn<Pos>>().unwrap();
        assert_eq!(typed.as_slice(), &[Pos { x: 1.0, y: 2.0 }]);
    }

    #[test]
    fn column_ptr_reads_rows() {
        let mut col = column_of(&[5, 6, 7]);
        let ptr = col.base_ptr();
        unsafe {
            assert_eq!(*ptr.get(2), 7);
            *ptr.get_mut(0) = 50;
            assert_eq!(ptr.slice(0, 2), &[50, 6]);
        }
    }
}

//! Fixed-arity query descriptors.
//!
//! A query names the components a view iterates: `(&Position, &mut Velocity)`
//! and so on, up to four elements. Each element is a [`QueryItem`] (`&T` or
//! `&mut T`); the tuple is a [`Query`]. For every matching archetype the query
//! resolves one [`ColumnPtr`] per element, and rows are then fetched straight
//! from those pointers without further lookups.
//!
//! ## Soundness
//!
//! Fetching through a pointer is `unsafe`: the caller (the `view` module)
//! guarantees that the archetype's storage has not been reallocated since the
//! pointers were resolved, that the world is exclusively borrowed for the
//! lifetime of the produced references, and that no row is handed out twice
//! for a mutable element. Queries that would alias one component mutably are
//! rejected up front with [`EcsError::ConflictingAccess`].

use crate::archetype::Archetype;
use crate::column::ColumnPtr;
use crate::component::{Component, ComponentKind, ComponentRegistry};
use crate::EcsError;

// ---------------------------------------------------------------------------
// QueryItem trait -- describes one element in a query tuple
// ---------------------------------------------------------------------------

/// A single element of a query: `&T` (read) or `&mut T` (write).
pub trait QueryItem {
    /// The component type accessed.
    type Component: Component;
    /// What one row yields.
    type Item<'a>;
    /// What a contiguous row range yields.
    type Slice<'a>;
    /// Whether this element borrows mutably.
    const MUTABLE: bool;

    /// Fetch one row.
    ///
    /// # Safety
    ///
    /// `row` must be in bounds of live storage behind `ptr`, and the
    /// reference must not alias any other live reference to the same element
    /// (for `&mut T`) or any mutable one (for `&T`) during `'a`.
    unsafe fn fetch<'a>(ptr: ColumnPtr<Self::Component>, row: usize) -> Self::Item<'a>;

    /// Fetch `len` rows starting at `start`.
    ///
    /// # Safety
    ///
    /// Same as [`fetch`](Self::fetch), for every row in the range.
    unsafe fn slice<'a>(ptr: ColumnPtr<Self::Component>, start: usize, len: usize)
        -> Self::Slice<'a>;
}

impl<T: Component> QueryItem for &T {
    type Component = T;
    type Item<'a> = &'a T;
    type Slice<'a> = &'a [T];
    const MUTABLE: bool = false;

    #[inline]
    unsafe fn fetch<'a>(ptr: ColumnPtr<T>, row: usize) -> &'a T {
        ptr.get(row)
    }

    #[inline]
    unsafe fn slice<'a>(ptr: ColumnPtr<T>, start: usize, len: usize) -> &'a [T] {
        ptr.slice(start, len)
    }
}

impl<T: Component> QueryItem for &mut T {
    type Component = T;
    type Item<'a> = &'a mut T;
    type Slice<'a> = &'a mut [T];
    const MUTABLE: bool = true;

    #[inline]
    unsafe fn fetch<'a>(ptr: ColumnPtr<T>, row: usize) -> &'a mut T {
        ptr.get_mut(row)
    }

    #[inline]
    unsafe fn slice<'a>(ptr: ColumnPtr<T>, start: usize, len: usize) -> &'a mut [T] {
        ptr.slice_mut(start, len)
    }
}

/// Resolve the column pointer for one query element.
fn resolve_item<I: QueryItem>(
    archetype: &mut Archetype,
    kind: ComponentKind,
) -> Result<ColumnPtr<I::Component>, EcsError> {
    archetype
        .column_ptr::<I::Component>(kind)
        .ok_or(EcsError::ColumnTypeMismatch {
            expected: std::any::type_name::<I::Component>(),
            found: "<absent>",
        })
}

fn item_access<I: QueryItem>(registry: &ComponentRegistry) -> Result<Access, EcsError> {
    Ok(Access {
        kind: registry.kind_of::<I::Component>()?,
        mutable: I::MUTABLE,
        name: std::any::type_name::<I::Component>(),
    })
}

// ---------------------------------------------------------------------------
// Query trait -- describes a tuple of QueryItems
// ---------------------------------------------------------------------------

/// One element's access as seen by the conflict check.
#[derive(Debug, Clone, Copy)]
pub struct Access {
    pub kind: ComponentKind,
    pub mutable: bool,
    pub name: &'static str,
}

/// A tuple of query items: `(&A,)`, `(&mut A, &B)`, up to four elements.
pub trait Query {
    /// Per-row output.
    type Item<'a>;
    /// Per-row-range output, one slice per element.
    type Slices<'a>;
    /// Resolved column pointers for one archetype.
    type Ptrs: Copy + Send + Sync + 'static;

    /// The element accesses in tuple order. Fails on an unregistered type or
    /// a mutable access paired with any other access to the same component.
    fn accesses(registry: &ComponentRegistry) -> Result<Vec<Access>, EcsError>;

    /// Resolve one pointer per element. `kinds` is in tuple order.
    fn resolve(archetype: &mut Archetype, kinds: &[ComponentKind]) -> Result<Self::Ptrs, EcsError>;

    /// Fetch one row.
    ///
    /// # Safety
    ///
    /// See [`QueryItem::fetch`].
    unsafe fn fetch<'a>(ptrs: Self::Ptrs, row: usize) -> Self::Item<'a>;

    /// Fetch a contiguous row range.
    ///
    /// # Safety
    ///
    /// See [`QueryItem::slice`].
    unsafe fn slices<'a>(ptrs: Self::Ptrs, start: usize, len: usize) -> Self::Slices<'a>;
}

/// Reject `&mut T` paired with any other access to `T`. Two shared reads of
/// the same component are fine.
fn validate_no_access_conflicts(accesses: &[Access]) -> Result<(), EcsError> {
    for (i, a) in accesses.iter().enumerate() {
        for b in &accesses[i + 1..] {
            if a.kind == b.kind && (a.mutable || b.mutable) {
                return Err(EcsError::ConflictingAccess { component: a.name });
            }
        }
    }
    Ok(())
}

macro_rules! impl_query {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: QueryItem),+> Query for ($($name,)+) {
            type Item<'a> = ($($name::Item<'a>,)+);
            type Slices<'a> = ($($name::Slice<'a>,)+);
            type Ptrs = ($(ColumnPtr<$name::Component>,)+);

            fn accesses(registry: &ComponentRegistry) -> Result<Vec<Access>, EcsError> {
                let accesses = vec![$(item_access::<$name>(registry)?),+];
                validate_no_access_conflicts(&accesses)?;
                Ok(accesses)
            }

            fn resolve(archetype: &mut Archetype, kinds: &[ComponentKind]) -> Result<Self::Ptrs, EcsError> {
                Ok(($(resolve_item::<$name>(archetype, kinds[$idx])?,)+))
            }

            #[inline]
            unsafe fn fetch<'a>(ptrs: Self::Ptrs, row: usize) -> Self::Item<'a> {
                ($($name::fetch(ptrs.$idx, row),)+)
            }

            #[inline]
            unsafe fn slices<'a>(ptrs: Self::Ptrs, start: usize, len: usize) -> Self::Slices<'a> {
                ($($name::slice(ptrs.$idx, start, len),)+)
            }
        }
    };
}

impl_query!(A 0);
impl_query!(A 0, B 1);
impl_query!(A 0, B 1, C 2);
impl_query!(A 0, B 1, C 2, D 3);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

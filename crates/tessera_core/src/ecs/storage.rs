//! # Component Columns
//!
//! One column per component per archetype, stored as a typed `Vec<T>` behind
//! an object-safe trait so archetypes can hold columns of any type. Row
//! access is bounds-checked and typed access goes through a downcast.

use std::any::{type_name, Any};
use std::ops::Range;

use super::component::{Component, ComponentId};
use crate::error::{fatal, EcsError};

/// Type-erased operations on a column.
pub(crate) trait ErasedColumn: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn len(&self) -> usize;
    fn capacity(&self) -> usize;
    fn item_size(&self) -> usize;
    fn reserve_exact(&mut self, additional: usize);
    /// Appends `n` zeroed values.
    fn push_zeroed(&mut self, n: usize);
    /// Appends a copy of `src[row]`. `src` must hold the same type.
    fn push_from(&mut self, src: &dyn ErasedColumn, row: usize);
    /// Appends a copy of `src[rows]`. `src` must hold the same type.
    fn extend_from(&mut self, src: &dyn ErasedColumn, rows: Range<usize>);
    fn swap(&mut self, a: usize, b: usize);
    fn swap_remove(&mut self, row: usize);
    fn truncate(&mut self, len: usize);
    fn row_bytes(&self, row: usize) -> &[u8];
    /// Overwrites `row` from raw bytes of the column's type.
    fn write_bytes(&mut self, row: usize, bytes: &[u8]);
}

/// Typed column storage.
pub(crate) struct Column<T> {
    data: Vec<T>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

/// Column factory registered per component type.
pub(crate) fn new_column<T: Component>() -> Box<dyn ErasedColumn> {
    Box::new(Column::<T>::default())
}

#[inline]
fn same_type<T: Component>(src: &dyn ErasedColumn) -> &Column<T> {
    match src.as_any().downcast_ref::<Column<T>>() {
        Some(column) => column,
        None => panic!("column type mismatch: expected {}", type_name::<T>()),
    }
}

impl<T: Component> ErasedColumn for Column<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.data.capacity()
    }

    #[inline]
    fn item_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    fn reserve_exact(&mut self, additional: usize) {
        self.data.reserve_exact(additional);
    }

    fn push_zeroed(&mut self, n: usize) {
        self.data
            .resize(self.data.len() + n, <T as bytemuck::Zeroable>::zeroed());
    }

    #[inline]
    fn push_from(&mut self, src: &dyn ErasedColumn, row: usize) {
        self.data.push(same_type::<T>(src).data[row]);
    }

    fn extend_from(&mut self, src: &dyn ErasedColumn, rows: Range<usize>) {
        self.data.extend_from_slice(&same_type::<T>(src).data[rows]);
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.data.swap(a, b);
    }

    #[inline]
    fn swap_remove(&mut self, row: usize) {
        self.data.swap_remove(row);
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    fn row_bytes(&self, row: usize) -> &[u8] {
        bytemuck::bytes_of(&self.data[row])
    }

    fn write_bytes(&mut self, row: usize, bytes: &[u8]) {
        self.data[row] = bytemuck::pod_read_unaligned(bytes);
    }
}

/// Shared view of one component value of one entity.
#[derive(Clone, Copy)]
pub struct ComponentRef<'a> {
    id: ComponentId,
    column: &'a dyn ErasedColumn,
    row: usize,
}

impl<'a> ComponentRef<'a> {
    pub(crate) fn new(id: ComponentId, column: &'a dyn ErasedColumn, row: usize) -> Self {
        Self { id, column, row }
    }

    /// The component id this view belongs to.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Typed access.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the type registered for this component id.
    #[inline]
    #[must_use]
    #[track_caller]
    pub fn get<T: Component>(&self) -> &'a T {
        let column: &'a dyn ErasedColumn = self.column;
        match column.as_any().downcast_ref::<Column<T>>() {
            Some(column) => &column.data[self.row],
            None => fatal(EcsError::TypeMismatch {
                id: self.id,
                requested: type_name::<T>(),
            }),
        }
    }

    /// Raw bytes of the value.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        let column: &'a dyn ErasedColumn = self.column;
        column.row_bytes(self.row)
    }
}

/// Mutable view of one component value of one entity.
pub struct ComponentMut<'a> {
    id: ComponentId,
    column: &'a mut dyn ErasedColumn,
    row: usize,
}

impl<'a> ComponentMut<'a> {
    pub(crate) fn new(id: ComponentId, column: &'a mut dyn ErasedColumn, row: usize) -> Self {
        Self { id, column, row }
    }

    /// The component id this view belongs to.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[track_caller]
    fn typed<T: Component>(column: &mut dyn ErasedColumn, id: ComponentId) -> &mut Column<T> {
        match column.as_any_mut().downcast_mut::<Column<T>>() {
            Some(column) => column,
            None => fatal(EcsError::TypeMismatch {
                id,
                requested: type_name::<T>(),
            }),
        }
    }

    /// Typed shared access.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the type registered for this component id.
    #[inline]
    #[must_use]
    #[track_caller]
    pub fn get<T: Component>(&self) -> &T {
        match self.column.as_any().downcast_ref::<Column<T>>() {
            Some(column) => &column.data[self.row],
            None => fatal(EcsError::TypeMismatch {
                id: self.id,
                requested: type_name::<T>(),
            }),
        }
    }

    /// Typed mutable access.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the type registered for this component id.
    #[inline]
    #[track_caller]
    pub fn get_mut<T: Component>(&mut self) -> &mut T {
        let row = self.row;
        &mut Self::typed::<T>(self.column, self.id).data[row]
    }

    /// Converts into a typed borrow for the full lifetime of the view.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the type registered for this component id.
    #[inline]
    #[track_caller]
    pub fn into_mut<T: Component>(self) -> &'a mut T {
        let row = self.row;
        &mut Self::typed::<T>(self.column, self.id).data[row]
    }

    /// Overwrites the value.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the type registered for this component id.
    #[inline]
    #[track_caller]
    pub fn set<T: Component>(&mut self, value: T) {
        *self.get_mut::<T>() = value;
    }

    /// Raw bytes of the value.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.column.row_bytes(self.row)
    }
}

// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Archetype storage with row allocation and removal
//!
//! Every archetype keeps one dense column per component type plus the list of
//! entities occupying its rows. Row `i` of every column belongs to
//! `entities[i]`; removal is swap-remove on all of them at once.

use std::any::{Any, TypeId};
use std::fmt;
use std::ptr::NonNull;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::component::Component;
use crate::entity::EntityId;

/// Component signature, sorted and free of duplicates
pub type ArchetypeSignature = SmallVec<[TypeId; 8]>;

/// Index of an archetype inside the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    /// The archetype of entities with no components
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Archetype({})", self.0)
    }
}

/// Type-erased component column
pub trait ColumnStorage: Any + Send + Sync {
    /// Number of stored values
    fn len(&self) -> usize;

    /// Is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fresh column of the same component type
    fn empty_clone(&self) -> Box<dyn ColumnStorage>;

    /// Swap-remove `row` and append the value to `dst`, which must hold the same type
    fn swap_remove_into(&mut self, row: usize, dst: &mut dyn ColumnStorage);

    /// Swap-remove `row` and drop the value
    fn swap_remove_drop(&mut self, row: usize);

    /// Reserve space for additional values
    fn reserve(&mut self, additional: usize);

    /// Drop every value
    fn clear(&mut self);

    /// Name of the stored component type
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense column for one component type
pub struct Column<T> {
    data: Vec<T>,
}

impl<T: Component> Column<T> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn push(&mut self, value: T) {
        self.data.push(value);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub(crate) fn swap_remove(&mut self, row: usize) -> T {
        self.data.swap_remove(row)
    }
}

impl<T: Component> Default for Column<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ColumnStorage for Column<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn empty_clone(&self) -> Box<dyn ColumnStorage> {
        Box::new(Column::<T>::new())
    }

    fn swap_remove_into(&mut self, row: usize, dst: &mut dyn ColumnStorage) {
        let value = self.data.swap_remove(row);
        match dst.as_any_mut().downcast_mut::<Column<T>>() {
            Some(dst) => dst.data.push(value),
            None => unreachable!(
                "column type mismatch while moving {}",
                std::any::type_name::<T>()
            ),
        }
    }

    fn swap_remove_drop(&mut self, row: usize) {
        self.data.swap_remove(row);
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Archetype: Structure of Arrays storage
pub struct Archetype {
    id: ArchetypeId,
    signature: ArchetypeSignature,
    entities: Vec<EntityId>,
    columns: Vec<Box<dyn ColumnStorage>>,
    column_indices: FxHashMap<TypeId, usize>,
}

impl Archetype {
    /// Create archetype from `(type, column)` pairs.
    ///
    /// Columns are ordered by type id so they line up with the signature.
    pub fn new(id: ArchetypeId, mut columns: Vec<(TypeId, Box<dyn ColumnStorage>)>) -> Self {
        columns.sort_by_key(|(type_id, _)| *type_id);
        columns.dedup_by_key(|(type_id, _)| *type_id);

        let mut signature = ArchetypeSignature::with_capacity(columns.len());
        let mut column_indices = FxHashMap::default();
        let mut storage = Vec::with_capacity(columns.len());
        for (idx, (type_id, column)) in columns.into_iter().enumerate() {
            signature.push(type_id);
            column_indices.insert(type_id, idx);
            storage.push(column);
        }

        Self {
            id,
            signature,
            entities: Vec::new(),
            columns: storage,
            column_indices,
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Get signature
    pub fn signature(&self) -> &ArchetypeSignature {
        &self.signature
    }

    /// Check whether the signature contains `type_id`
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.signature.binary_search(&type_id).is_ok()
    }

    /// Get all entities
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if archetype is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Names of the component types stored here
    pub fn component_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|column| column.type_name())
    }

    /// Empty copies of every column, for building a neighbouring archetype
    pub(crate) fn empty_columns(&self) -> Vec<(TypeId, Box<dyn ColumnStorage>)> {
        self.signature
            .iter()
            .zip(&self.columns)
            .map(|(type_id, column)| (*type_id, column.empty_clone()))
            .collect()
    }

    /// Typed column
    pub fn column<T: Component>(&self) -> Option<&Column<T>> {
        let idx = *self.column_indices.get(&TypeId::of::<T>())?;
        self.columns[idx].as_any().downcast_ref::<Column<T>>()
    }

    /// Typed column, mutably
    pub fn column_mut<T: Component>(&mut self) -> Option<&mut Column<T>> {
        let idx = *self.column_indices.get(&TypeId::of::<T>())?;
        self.columns[idx].as_any_mut().downcast_mut::<Column<T>>()
    }

    /// Component at `row`
    pub fn get<T: Component>(&self, row: usize) -> Option<&T> {
        self.column::<T>()?.as_slice().get(row)
    }

    /// Component at `row`, mutably
    pub fn get_mut<T: Component>(&mut self, row: usize) -> Option<&mut T> {
        self.column_mut::<T>()?.as_mut_slice().get_mut(row)
    }

    /// Base pointer of a column, for query fetches
    pub(crate) fn column_ptr<T: Component>(&self) -> Option<NonNull<T>> {
        let slice = self.column::<T>()?.as_slice();
        NonNull::new(slice.as_ptr() as *mut T)
    }

    /// Mutable base pointer of a column, for query fetches
    pub(crate) fn column_mut_ptr<T: Component>(&mut self) -> Option<NonNull<T>> {
        let slice = self.column_mut::<T>()?.as_mut_slice();
        NonNull::new(slice.as_mut_ptr())
    }

    /// Append a new row for `entity`.
    ///
    /// The caller pushes exactly one value into every column afterwards.
    pub(crate) fn push_entity(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Push one component value onto its column
    pub(crate) fn push_component<T: Component>(&mut self, value: T) {
        match self.column_mut::<T>() {
            Some(column) => column.push(value),
            None => unreachable!(
                "{} is not part of archetype {}",
                std::any::type_name::<T>(),
                self.id
            ),
        }
    }

    /// Remove row, dropping its components.
    ///
    /// Returns the entity that was swapped into `row`, if any.
    pub(crate) fn remove_row(&mut self, row: usize) -> Option<EntityId> {
        for column in &mut self.columns {
            column.swap_remove_drop(row);
        }
        self.finish_row_removal(row)
    }

    /// Move `row` into `dst`, dropping components `dst` has no column for.
    ///
    /// `skip` names a column whose value was already taken out by the caller.
    /// Returns the new row in `dst` and the entity swapped into `row` here.
    pub(crate) fn move_row(
        &mut self,
        row: usize,
        dst: &mut Archetype,
        skip: Option<TypeId>,
    ) -> (usize, Option<EntityId>) {
        let entity = self.entities[row];
        let new_row = dst.push_entity(entity);

        for (type_id, column) in self.signature.iter().zip(self.columns.iter_mut()) {
            if Some(*type_id) == skip {
                continue;
            }
            match dst.column_indices.get(type_id) {
                Some(&idx) => column.swap_remove_into(row, dst.columns[idx].as_mut()),
                None => column.swap_remove_drop(row),
            }
        }

        (new_row, self.finish_row_removal(row))
    }

    fn finish_row_removal(&mut self, row: usize) -> Option<EntityId> {
        self.entities.swap_remove(row);
        // Whoever was last now lives at `row`
        self.entities.get(row).copied()
    }

    /// Reserve space for additional rows
    pub fn reserve_rows(&mut self, additional: usize) {
        self.entities.reserve(additional);
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    /// Drop all rows, keeping the columns
    pub(crate) fn clear(&mut self) {
        self.entities.clear();
        for column in &mut self.columns {
            column.clear();
        }
    }

    #[cfg(debug_assertions)]
    pub(crate) fn debug_check_rows(&self) {
        for column in &self.columns {
            debug_assert_eq!(
                column.len(),
                self.entities.len(),
                "BUG: column {} out of step with entity rows",
                column.type_name()
            );
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("components", &self.component_names().collect::<Vec<_>>())
            .field("len", &self.len())
            .finish()
    }
}

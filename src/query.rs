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

//! Query system with archetype filtering
//!
//! Type-safe component queries with automatic archetype matching.
//!
//! A query is described by a *fetch* type: `&T`, `&mut T`, [`With<T>`],
//! [`Without<T>`] or a tuple of up to eight of them. [`World::query`]
//! turns the fetch into a [`QuerySignature`] and returns a [`QueryHandle`];
//! the world keeps one cached match list per signature and refreshes it
//! lazily, the first time the handle is used after a structural change.
//!
//! ```ignore
//! let movers = world.query::<(&mut Position, &Velocity)>();
//! for (_entity, (pos, vel)) in world.iter(&movers) {
//!     pos.x += vel.x;
//! }
//! let fast = world.iter(&movers).filter(|(_, (_, v))| v.x > 10.0).count();
//! ```
//!
//! [`World::query`]: crate::world::World::query

use std::any::TypeId;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use lru::LruCache;
use smallvec::SmallVec;

use crate::archetype::{Archetype, ArchetypeId};
use crate::component::Component;
use crate::entity::EntityId;

const MAX_FILTER_COMPONENTS: usize = 8;

/// Matched archetype list copied out of the cache for one iteration
pub(crate) type MatchedArchetypes = SmallVec<[ArchetypeId; 16]>;

/// Canonical query key: required and excluded component types, sorted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct QuerySignature {
    required: SmallVec<[TypeId; MAX_FILTER_COMPONENTS]>,
    excluded: SmallVec<[TypeId; 4]>,
}

impl QuerySignature {
    /// Does `archetype` satisfy this signature
    pub fn matches(&self, archetype: &Archetype) -> bool {
        self.required.iter().all(|ty| archetype.contains(*ty))
            && !self.excluded.iter().any(|ty| archetype.contains(*ty))
    }

    pub fn required(&self) -> &[TypeId] {
        &self.required
    }

    pub fn excluded(&self) -> &[TypeId] {
        &self.excluded
    }
}

/// Component access collected from a fetch type
#[derive(Debug, Default, Clone)]
pub struct QueryDescriptor {
    required: SmallVec<[TypeId; MAX_FILTER_COMPONENTS]>,
    excluded: SmallVec<[TypeId; 4]>,
    reads: SmallVec<[(TypeId, &'static str); MAX_FILTER_COMPONENTS]>,
    writes: SmallVec<[(TypeId, &'static str); MAX_FILTER_COMPONENTS]>,
}

impl QueryDescriptor {
    /// Build the descriptor for fetch type `Q`
    pub fn of<Q: Fetch>() -> Self {
        let mut descriptor = Self::default();
        Q::describe(&mut descriptor);
        descriptor
    }

    pub fn read<T: Component>(&mut self) {
        self.required.push(TypeId::of::<T>());
        self.reads
            .push((TypeId::of::<T>(), std::any::type_name::<T>()));
    }

    pub fn write<T: Component>(&mut self) {
        self.required.push(TypeId::of::<T>());
        self.writes
            .push((TypeId::of::<T>(), std::any::type_name::<T>()));
    }

    pub fn require<T: Component>(&mut self) {
        self.required.push(TypeId::of::<T>());
    }

    pub fn exclude<T: Component>(&mut self) {
        self.excluded.push(TypeId::of::<T>());
    }

    /// Component types read
    pub fn reads(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.reads.iter().map(|(ty, _)| *ty)
    }

    /// Component types written
    pub fn writes(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.writes.iter().map(|(ty, _)| *ty)
    }

    /// Reject fetches that would hand out aliasing references.
    ///
    /// # Panics
    /// Panics if a component is borrowed mutably more than once, or both
    /// mutably and immutably, within one query.
    pub fn assert_no_aliasing(&self) {
        for (i, (ty, name)) in self.writes.iter().enumerate() {
            let twice = self.writes[i + 1..].iter().any(|(other, _)| other == ty);
            let also_read = self.reads.iter().any(|(other, _)| other == ty);
            if twice || also_read {
                panic!("query borrows {name} mutably while it is already borrowed");
            }
        }
    }

    /// Canonical signature
    pub fn signature(&self) -> QuerySignature {
        let mut required = self.required.clone();
        required.sort();
        required.dedup();
        let mut excluded = self.excluded.clone();
        excluded.sort();
        excluded.dedup();
        QuerySignature { required, excluded }
    }
}

/// Trait for fetching component data out of an archetype row
///
/// # Safety
/// `describe` must declare every component `fetch` touches, with the right
/// mutability, and `fetch` may only be called with a state produced by
/// `prepare`/`prepare_shared` for an archetype that is still alive and for a
/// row inside it.
pub unsafe trait Fetch {
    /// The type of data returned per entity
    type Item<'w>;
    /// Column pointers for one archetype
    type State: Copy;

    /// Declare required/excluded types and accesses
    fn describe(descriptor: &mut QueryDescriptor);

    /// Resolve columns of an archetype for exclusive access
    fn prepare(archetype: &mut Archetype) -> Option<Self::State>;

    /// Fetch the item at `row`
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn fetch<'w>(state: Self::State, row: usize) -> Self::Item<'w>;
}

/// Fetches that never hand out mutable references
///
/// # Safety
/// Implementors must only read through the state.
pub unsafe trait ReadOnlyFetch: Fetch {
    /// Resolve columns of an archetype through a shared borrow
    fn prepare_shared(archetype: &Archetype) -> Option<Self::State>;
}

unsafe impl<'a, T: Component> Fetch for &'a T {
    type Item<'w> = &'w T;
    type State = NonNull<T>;

    fn describe(descriptor: &mut QueryDescriptor) {
        descriptor.read::<T>();
    }

    fn prepare(archetype: &mut Archetype) -> Option<Self::State> {
        archetype.column_ptr::<T>()
    }

    unsafe fn fetch<'w>(state: Self::State, row: usize) -> Self::Item<'w> {
        &*state.as_ptr().add(row)
    }
}

unsafe impl<'a, T: Component> ReadOnlyFetch for &'a T {
    fn prepare_shared(archetype: &Archetype) -> Option<Self::State> {
        archetype.column_ptr::<T>()
    }
}

unsafe impl<'a, T: Component> Fetch for &'a mut T {
    type Item<'w> = &'w mut T;
    type State = NonNull<T>;

    fn describe(descriptor: &mut QueryDescriptor) {
        descriptor.write::<T>();
    }

    fn prepare(archetype: &mut Archetype) -> Option<Self::State> {
        archetype.column_mut_ptr::<T>()
    }

    unsafe fn fetch<'w>(state: Self::State, row: usize) -> Self::Item<'w> {
        &mut *state.as_ptr().add(row)
    }
}

/// Filter: require component without reading it
pub struct With<T>(PhantomData<T>);

unsafe impl<T: Component> Fetch for With<T> {
    type Item<'w> = ();
    type State = ();

    fn describe(descriptor: &mut QueryDescriptor) {
        descriptor.require::<T>();
    }

    fn prepare(_archetype: &mut Archetype) -> Option<Self::State> {
        Some(())
    }

    unsafe fn fetch<'w>(_state: Self::State, _row: usize) -> Self::Item<'w> {}
}

unsafe impl<T: Component> ReadOnlyFetch for With<T> {
    fn prepare_shared(_archetype: &Archetype) -> Option<Self::State> {
        Some(())
    }
}

/// Filter: exclude component
pub struct Without<T>(PhantomData<T>);

unsafe impl<T: Component> Fetch for Without<T> {
    type Item<'w> = ();
    type State = ();

    fn describe(descriptor: &mut QueryDescriptor) {
        descriptor.exclude::<T>();
    }

    fn prepare(_archetype: &mut Archetype) -> Option<Self::State> {
        Some(())
    }

    unsafe fn fetch<'w>(_state: Self::State, _row: usize) -> Self::Item<'w> {}
}

unsafe impl<T: Component> ReadOnlyFetch for Without<T> {
    fn prepare_shared(_archetype: &Archetype) -> Option<Self::State> {
        Some(())
    }
}

// Tuple implementations
macro_rules! impl_fetch_tuple {
    ($($T:ident),*) => {
        unsafe impl<$($T: Fetch),*> Fetch for ($($T,)*) {
            type Item<'w> = ($(<$T as Fetch>::Item<'w>,)*);
            type State = ($(<$T as Fetch>::State,)*);

            fn describe(descriptor: &mut QueryDescriptor) {
                $(<$T as Fetch>::describe(descriptor);)*
            }

            fn prepare(archetype: &mut Archetype) -> Option<Self::State> {
                Some(($(<$T as Fetch>::prepare(archetype)?,)*))
            }

            #[allow(non_snake_case)]
            unsafe fn fetch<'w>(state: Self::State, row: usize) -> Self::Item<'w> {
                let ($($T,)*) = state;
                ($(<$T as Fetch>::fetch($T, row),)*)
            }
        }

        unsafe impl<$($T: ReadOnlyFetch),*> ReadOnlyFetch for ($($T,)*) {
            fn prepare_shared(archetype: &Archetype) -> Option<Self::State> {
                Some(($(<$T as ReadOnlyFetch>::prepare_shared(archetype)?,)*))
            }
        }
    };
}

impl_fetch_tuple!(A);
impl_fetch_tuple!(A, B);
impl_fetch_tuple!(A, B, C);
impl_fetch_tuple!(A, B, C, D);
impl_fetch_tuple!(A, B, C, D, E);
impl_fetch_tuple!(A, B, C, D, E, F);
impl_fetch_tuple!(A, B, C, D, E, F, G);
impl_fetch_tuple!(A, B, C, D, E, F, G, H);

/// Lightweight handle to a cached query.
///
/// Handles are cheap to clone and may be stored in systems across ticks; the
/// match list behind them is refreshed on use, never eagerly.
pub struct QueryHandle<Q> {
    signature: QuerySignature,
    _marker: PhantomData<fn() -> Q>,
}

impl<Q: Fetch> QueryHandle<Q> {
    pub(crate) fn new(signature: QuerySignature) -> Self {
        Self {
            signature,
            _marker: PhantomData,
        }
    }

    pub fn signature(&self) -> &QuerySignature {
        &self.signature
    }
}

impl<Q> Clone for QueryHandle<Q> {
    fn clone(&self) -> Self {
        Self {
            signature: self.signature.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Q> std::fmt::Debug for QueryHandle<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("signature", &self.signature)
            .finish()
    }
}

/// Cached query results (matched archetypes and their entities)
pub(crate) struct CachedQuery {
    signature: QuerySignature,
    pub(crate) archetypes: Vec<ArchetypeId>,
    pub(crate) entities: Vec<EntityId>,
    seen_archetypes: usize,
    dirty: bool,
}

impl CachedQuery {
    fn new(signature: QuerySignature, archetypes: &[Archetype]) -> Self {
        let mut cached = Self {
            signature,
            archetypes: Vec::new(),
            entities: Vec::new(),
            seen_archetypes: 0,
            dirty: true,
        };
        cached.refresh(archetypes);
        cached
    }

    /// Re-scan if dirty.
    ///
    /// Archetypes are never deleted, so only ones created since the last scan
    /// need the containment test; the entity list is always re-flattened.
    fn refresh(&mut self, archetypes: &[Archetype]) -> bool {
        if !self.dirty {
            return false;
        }

        for archetype in &archetypes[self.seen_archetypes..] {
            if self.signature.matches(archetype) {
                self.archetypes.push(archetype.id());
            }
        }
        self.seen_archetypes = archetypes.len();

        self.entities.clear();
        for id in &self.archetypes {
            self.entities
                .extend_from_slice(archetypes[id.index()].entities());
        }

        self.dirty = false;
        true
    }

    pub(crate) fn entity_count(&self, archetypes: &[Archetype]) -> usize {
        self.archetypes
            .iter()
            .map(|id| archetypes[id.index()].len())
            .sum()
    }
}

/// Statistics about the query cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCacheStats {
    /// Number of unique query signatures cached
    pub num_cached_queries: usize,
    /// Total number of archetype matches across all cached queries
    pub total_cached_archetypes: usize,
    /// Lookups served from an existing entry
    pub hits: u64,
    /// Lookups that had to build a new entry
    pub misses: u64,
    /// Lazy re-scans of dirty entries
    pub refreshes: u64,
}

/// LRU cache of query results keyed by signature
pub(crate) struct QueryCache {
    entries: LruCache<QuerySignature, CachedQuery>,
    hits: u64,
    misses: u64,
    refreshes: u64,
}

impl QueryCache {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
            refreshes: 0,
        }
    }

    /// Flag every entry for a re-scan on next use
    pub(crate) fn mark_all_dirty(&mut self) {
        for (_, entry) in self.entries.iter_mut() {
            entry.dirty = true;
        }
    }

    /// Fetch the fresh entry for `signature`, building it on a miss
    pub(crate) fn resolve(
        &mut self,
        signature: &QuerySignature,
        archetypes: &[Archetype],
    ) -> &mut CachedQuery {
        if self.entries.contains(signature) {
            self.hits += 1;
        } else {
            self.misses += 1;
            tracing::debug!(
                required = signature.required.len(),
                excluded = signature.excluded.len(),
                "query cache miss"
            );
            self.entries
                .put(signature.clone(), CachedQuery::new(signature.clone(), archetypes));
        }

        match self.entries.get_mut(signature) {
            Some(entry) => {
                if entry.refresh(archetypes) {
                    self.refreshes += 1;
                }
                entry
            }
            None => unreachable!("query cache entry vanished right after insertion"),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn stats(&self) -> QueryCacheStats {
        QueryCacheStats {
            num_cached_queries: self.entries.len(),
            total_cached_archetypes: self
                .entries
                .iter()
                .map(|(_, entry)| entry.archetypes.len())
                .sum(),
            hits: self.hits,
            misses: self.misses,
            refreshes: self.refreshes,
        }
    }
}

struct Cursor<S> {
    state: S,
    entities: *const EntityId,
    len: usize,
    row: usize,
}

/// Iterator over `(EntityId, item)` for every matching entity.
///
/// Order is archetype-then-row: stable while the world is not structurally
/// changed, which the borrow this iterator holds guarantees.
pub struct QueryIter<'w, Q: Fetch> {
    base: NonNull<Archetype>,
    matched: MatchedArchetypes,
    next_archetype: usize,
    current: Option<Cursor<Q::State>>,
    prepare: fn(NonNull<Archetype>) -> Option<Q::State>,
    remaining: usize,
    _marker: PhantomData<&'w mut Archetype>,
}

impl<'w, Q: Fetch> QueryIter<'w, Q> {
    /// Iterate with exclusive access to the archetypes
    pub(crate) fn new_exclusive(
        archetypes: &'w mut [Archetype],
        matched: MatchedArchetypes,
    ) -> Self {
        let remaining = matched
            .iter()
            .map(|id| archetypes[id.index()].len())
            .sum();
        Self {
            base: NonNull::from(archetypes).cast::<Archetype>(),
            matched,
            next_archetype: 0,
            current: None,
            // SAFETY: `base` came from a `&'w mut [Archetype]` and every
            // matched archetype is prepared exactly once.
            prepare: |ptr| Q::prepare(unsafe { &mut *ptr.as_ptr() }),
            remaining,
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: ReadOnlyFetch> QueryIter<'w, Q> {
    /// Iterate through a shared borrow of the archetypes
    pub(crate) fn new_shared(archetypes: &'w [Archetype], matched: MatchedArchetypes) -> Self {
        let remaining = matched
            .iter()
            .map(|id| archetypes[id.index()].len())
            .sum();
        Self {
            base: NonNull::from(archetypes).cast::<Archetype>(),
            matched,
            next_archetype: 0,
            current: None,
            // SAFETY: only shared references are created through `base`.
            prepare: |ptr| Q::prepare_shared(unsafe { ptr.as_ref() }),
            remaining,
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: Fetch> Iterator for QueryIter<'w, Q> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cursor) = &mut self.current {
                if cursor.row < cursor.len {
                    let row = cursor.row;
                    cursor.row += 1;
                    self.remaining -= 1;
                    // SAFETY: `row < len` and both the entity list and the
                    // columns outlive 'w; each row is yielded once, so mutable
                    // items never alias.
                    let entity = unsafe { *cursor.entities.add(row) };
                    let item = unsafe { Q::fetch(cursor.state, row) };
                    return Some((entity, item));
                }
                self.current = None;
            }

            let id = *self.matched.get(self.next_archetype)?;
            self.next_archetype += 1;

            // SAFETY: matched ids index into the slice `base` points at.
            let ptr = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(id.index())) };
            let state = (self.prepare)(ptr);
            // SAFETY: `prepare` has returned, no reference to the archetype
            // struct is live.
            let archetype = unsafe { ptr.as_ref() };
            match state {
                Some(state) => {
                    self.current = Some(Cursor {
                        state,
                        entities: archetype.entities().as_ptr(),
                        len: archetype.len(),
                        row: 0,
                    });
                }
                None => self.remaining -= archetype.len(),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'w, Q: Fetch> ExactSizeIterator for QueryIter<'w, Q> {}

impl<'w, Q: Fetch> FusedIterator for QueryIter<'w, Q> {}

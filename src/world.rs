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

//! World: central entity and archetype storage

use std::any::TypeId;
use std::num::NonZeroUsize;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Archetype, ArchetypeId, ArchetypeSignature, Column, ColumnStorage};
use crate::command::CommandBuffer;
use crate::component::{Bundle, Component};
use crate::config::WorldConfig;
use crate::entity::{EntityAllocator, EntityId, EntityLocation};
use crate::error::{EcsError, Result};
use crate::event::Event;
use crate::event_bus::EventBus;
use crate::query::{
    Fetch, MatchedArchetypes, QueryCache, QueryCacheStats, QueryDescriptor, QueryHandle,
    QueryIter, QuerySignature, ReadOnlyFetch,
};

/// Central ECS world
///
/// Owns every entity, the archetype tables, the query cache and the event
/// bus. One entity, the singleton, is created with the world and lives as
/// long as it does; use it for process-wide state components.
pub struct World {
    /// Monotonic id source
    allocator: EntityAllocator,

    /// Sparse index: entity -> (archetype, row)
    entity_locations: AHashMap<EntityId, EntityLocation>,

    /// All archetypes in the world, never removed
    archetypes: Vec<Archetype>,

    /// Maps component type signatures to archetype ids
    archetype_index: AHashMap<ArchetypeSignature, ArchetypeId>,

    /// Cache for archetype transitions when adding/removing components
    transitions: AHashMap<(ArchetypeId, TypeId, bool), ArchetypeId>,

    /// Query results keyed by signature
    query_cache: Mutex<QueryCache>,

    /// Deferred pub/sub
    event_bus: EventBus,

    /// Holder of process-wide state components
    singleton: EntityId,

    /// Bumped on every structural mutation
    structural_version: u64,

    /// Ticks started so far
    tick: u64,

    /// Entities with replicated changes since the last delta
    dirty: AHashSet<EntityId>,

    config: WorldConfig,
}

impl World {
    /// Create a new world with default settings.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create a new world.
    pub fn with_config(config: WorldConfig) -> Self {
        let capacity = NonZeroUsize::new(config.query_cache_capacity).unwrap_or(NonZeroUsize::MIN);

        let mut world = Self {
            allocator: EntityAllocator::default(),
            entity_locations: AHashMap::with_capacity(1024),

            // Start with reasonable defaults to avoid resize spikes
            archetypes: Vec::with_capacity(64),
            archetype_index: AHashMap::with_capacity(64),
            transitions: AHashMap::with_capacity(128),

            query_cache: Mutex::new(QueryCache::new(capacity)),
            event_bus: EventBus::new(),
            singleton: EntityId::from_raw(0),
            structural_version: 0,
            tick: 0,
            dirty: AHashSet::new(),
            config,
        };

        // Archetype 0 holds entities without components
        let empty = Archetype::new(ArchetypeId::EMPTY, Vec::new());
        world.archetypes.push(empty);
        world
            .archetype_index
            .insert(ArchetypeSignature::new(), ArchetypeId::EMPTY);

        world.singleton = world.create_entity();
        world
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Ticks started with [`World::begin_tick`]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Counter bumped by every structural mutation
    pub fn structural_version(&self) -> u64 {
        self.structural_version
    }

    /// Start a tick: deliver events emitted since the previous one.
    ///
    /// Returns the number of events processed.
    pub fn begin_tick(&mut self) -> usize {
        self.tick += 1;
        self.event_bus.process()
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Create an entity with no components
    pub fn create_entity(&mut self) -> EntityId {
        let entity = self.allocator.allocate();
        self.place_empty(entity);
        entity
    }

    /// Re-create an entity under an exact id, for snapshot restore.
    ///
    /// The allocator skips past `entity` so it is never issued again.
    pub fn spawn_with_id(&mut self, entity: EntityId) -> Result<EntityId> {
        if self.is_alive(entity) {
            return Err(EcsError::EntityAlreadyExists(entity));
        }
        self.allocator.reserve(entity);
        self.place_empty(entity);
        Ok(entity)
    }

    fn place_empty(&mut self, entity: EntityId) {
        let row = self.archetypes[ArchetypeId::EMPTY.index()].push_entity(entity);
        self.entity_locations.insert(
            entity,
            EntityLocation {
                archetype_id: ArchetypeId::EMPTY,
                archetype_row: row,
            },
        );
        self.structural_change();
    }

    /// Spawn a new entity with the given bundle of components.
    ///
    /// The entity goes straight into its final archetype.
    ///
    /// # Panics
    /// Panics if the bundle names the same component type twice.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Result<EntityId> {
        let mut signature = B::type_ids();
        #[cfg(feature = "profiling")]
        let _span = info_span!(
            "world.spawn",
            bundle_components = signature.len(),
            archetype_count = self.archetypes.len()
        )
        .entered();

        signature.sort();
        let len = signature.len();
        signature.dedup();
        assert_eq!(
            len,
            signature.len(),
            "bundle {} contains duplicate component types",
            std::any::type_name::<B>()
        );

        let archetype_id = self.get_or_create_archetype(&signature, true, B::columns)?;
        let entity = self.allocator.allocate();

        let archetype = &mut self.archetypes[archetype_id.index()];
        let row = archetype.push_entity(entity);
        bundle.write(archetype);
        #[cfg(debug_assertions)]
        archetype.debug_check_rows();

        self.entity_locations.insert(
            entity,
            EntityLocation {
                archetype_id,
                archetype_row: row,
            },
        );
        self.structural_change();
        Ok(entity)
    }

    /// Destroy an entity and drop all its components.
    ///
    /// Dead ids are ignored. The singleton cannot be destroyed; trying logs a
    /// warning. Returns whether an entity was removed.
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        if entity == self.singleton {
            tracing::warn!(%entity, "refusing to destroy the singleton entity");
            return false;
        }
        let Some(location) = self.entity_locations.remove(&entity) else {
            return false;
        };

        let archetype = &mut self.archetypes[location.archetype_id.index()];
        if let Some(swapped) = archetype.remove_row(location.archetype_row) {
            if let Some(swapped_loc) = self.entity_locations.get_mut(&swapped) {
                swapped_loc.archetype_row = location.archetype_row;
            }
        }

        self.dirty.remove(&entity);
        self.structural_change();
        true
    }

    /// Check if an entity is alive
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entity_locations.contains_key(&entity)
    }

    /// Live entities, singleton included
    pub fn entity_count(&self) -> usize {
        self.entity_locations.len()
    }

    /// Live entity ids in ascending order
    pub fn entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entity_locations.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Get entity location
    pub fn location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.entity_locations.get(&entity).copied()
    }

    /// Remove every entity except the singleton, whose components are dropped.
    ///
    /// Archetypes and cached query signatures persist.
    pub fn clear(&mut self) {
        for archetype in &mut self.archetypes {
            archetype.clear();
        }
        self.entity_locations.clear();
        self.dirty.clear();

        let singleton = self.singleton;
        let row = self.archetypes[ArchetypeId::EMPTY.index()].push_entity(singleton);
        self.entity_locations.insert(
            singleton,
            EntityLocation {
                archetype_id: ArchetypeId::EMPTY,
                archetype_row: row,
            },
        );
        self.structural_change();
    }

    /// Take over the entities and archetypes of `staged`, a world built
    /// with the same config. Events, ticks and config stay with `self`, and
    /// ids already handed out by either world are never reused.
    pub(crate) fn adopt_storage(&mut self, staged: World) {
        debug_assert_eq!(staged.singleton, self.singleton);

        let next = staged.allocator.peek();
        if next > 0 {
            self.allocator.reserve(EntityId::from_raw(next - 1));
        }
        self.entity_locations = staged.entity_locations;
        self.archetypes = staged.archetypes;
        self.archetype_index = staged.archetype_index;
        self.transitions = staged.transitions;
        self.dirty.clear();

        // Cached archetype ids point into the old archetype list
        self.query_cache.get_mut().clear();
        self.structural_change();
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Get immutable reference to a component on an entity
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let location = self.entity_locations.get(&entity)?;
        self.archetypes[location.archetype_id.index()].get::<T>(location.archetype_row)
    }

    /// Get mutable reference to a component on an entity
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let location = self.entity_locations.get(&entity)?;
        self.archetypes[location.archetype_id.index()].get_mut::<T>(location.archetype_row)
    }

    /// Check if entity has a specific component
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.entity_locations
            .get(&entity)
            .map(|location| {
                self.archetypes[location.archetype_id.index()].contains(TypeId::of::<T>())
            })
            .unwrap_or(false)
    }

    /// Add a component to an entity, overwriting an existing value.
    ///
    /// Overwriting is not a structural change; adding a new type moves the
    /// entity to the neighbouring archetype.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<()> {
        let location = self.live_location(entity)?;
        let archetype = &mut self.archetypes[location.archetype_id.index()];
        if let Some(slot) = archetype.get_mut::<T>(location.archetype_row) {
            *slot = component;
            return Ok(());
        }
        self.insert_new_component(entity, location, component)
    }

    /// Add a component, failing if the entity already has one of this type
    pub fn try_add_component<T: Component>(
        &mut self,
        entity: EntityId,
        component: T,
    ) -> Result<()> {
        let location = self.live_location(entity)?;
        if self.archetypes[location.archetype_id.index()].contains(TypeId::of::<T>()) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: std::any::type_name::<T>(),
            });
        }
        self.insert_new_component(entity, location, component)
    }

    fn insert_new_component<T: Component>(
        &mut self,
        entity: EntityId,
        location: EntityLocation,
        component: T,
    ) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.add_component", component = std::any::type_name::<T>())
            .entered();

        let target = self.transition::<T>(location.archetype_id, true)?;
        let (src, dst) = pair_mut(&mut self.archetypes, location.archetype_id, target);
        let (new_row, swapped) = src.move_row(location.archetype_row, dst, None);
        dst.push_component(component);
        #[cfg(debug_assertions)]
        dst.debug_check_rows();

        self.relocate(entity, location, target, new_row, swapped);
        self.structural_change();
        Ok(())
    }

    /// Remove a component and return it.
    ///
    /// `None` when the entity is dead or has no such component.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Option<T> {
        let location = *self.entity_locations.get(&entity)?;
        if !self.archetypes[location.archetype_id.index()].contains(TypeId::of::<T>()) {
            return None;
        }

        let target = self.transition::<T>(location.archetype_id, false).ok()?;
        let value = self.archetypes[location.archetype_id.index()]
            .column_mut::<T>()?
            .swap_remove(location.archetype_row);

        let (src, dst) = pair_mut(&mut self.archetypes, location.archetype_id, target);
        let (new_row, swapped) =
            src.move_row(location.archetype_row, dst, Some(TypeId::of::<T>()));
        #[cfg(debug_assertions)]
        src.debug_check_rows();

        self.relocate(entity, location, target, new_row, swapped);
        self.structural_change();
        Some(value)
    }

    fn live_location(&self, entity: EntityId) -> Result<EntityLocation> {
        self.entity_locations
            .get(&entity)
            .copied()
            .ok_or(EcsError::EntityNotFound(entity))
    }

    fn relocate(
        &mut self,
        entity: EntityId,
        old: EntityLocation,
        archetype_id: ArchetypeId,
        archetype_row: usize,
        swapped: Option<EntityId>,
    ) {
        if let Some(swapped) = swapped {
            if let Some(swapped_loc) = self.entity_locations.get_mut(&swapped) {
                swapped_loc.archetype_row = old.archetype_row;
            }
        }
        self.entity_locations.insert(
            entity,
            EntityLocation {
                archetype_id,
                archetype_row,
            },
        );
    }

    // ------------------------------------------------------------------
    // Singleton
    // ------------------------------------------------------------------

    /// The entity holding process-wide state
    pub fn singleton(&self) -> EntityId {
        self.singleton
    }

    /// Insert or overwrite a state component on the singleton
    pub fn set_singleton<T: Component>(&mut self, value: T) -> Result<()> {
        self.add_component(self.singleton, value)
    }

    pub fn singleton_component<T: Component>(&self) -> Option<&T> {
        self.get_component(self.singleton)
    }

    pub fn singleton_component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.get_component_mut(self.singleton)
    }

    // ------------------------------------------------------------------
    // Archetypes
    // ------------------------------------------------------------------

    /// Number of archetypes, the empty one included
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Archetype currently holding `entity`
    pub fn archetype_of(&self, entity: EntityId) -> Option<ArchetypeId> {
        self.entity_locations
            .get(&entity)
            .map(|location| location.archetype_id)
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    fn get_or_create_archetype<F>(
        &mut self,
        signature: &ArchetypeSignature,
        enforce_limit: bool,
        columns: F,
    ) -> Result<ArchetypeId>
    where
        F: FnOnce() -> Vec<(TypeId, Box<dyn ColumnStorage>)>,
    {
        if let Some(&id) = self.archetype_index.get(signature) {
            return Ok(id);
        }
        if enforce_limit && self.archetypes.len() >= self.config.archetype_limit {
            return Err(EcsError::ArchetypeLimitExceeded(self.config.archetype_limit));
        }

        let id = ArchetypeId(self.archetypes.len() as u32);
        let archetype = Archetype::new(id, columns());
        debug_assert_eq!(
            archetype.signature(),
            signature,
            "BUG: archetype columns do not match signature"
        );
        tracing::debug!(archetype = %id, components = signature.len(), "archetype created");

        self.archetypes.push(archetype);
        self.archetype_index.insert(signature.clone(), id);
        Ok(id)
    }

    /// Neighbouring archetype with `T` added or removed, cached per edge.
    ///
    /// Removals can never fail.
    fn transition<T: Component>(&mut self, from: ArchetypeId, add: bool) -> Result<ArchetypeId> {
        let type_id = TypeId::of::<T>();
        if let Some(&to) = self.transitions.get(&(from, type_id, add)) {
            return Ok(to);
        }

        let mut signature = self.archetypes[from.index()].signature().clone();
        if add {
            if let Err(pos) = signature.binary_search(&type_id) {
                signature.insert(pos, type_id);
            }
        } else {
            signature.retain(|ty| *ty != type_id);
        }

        let to = match self.archetype_index.get(&signature) {
            Some(&id) => id,
            None => {
                let source = &self.archetypes[from.index()];
                let mut columns = source.empty_columns();
                if add {
                    columns.push((type_id, Box::new(Column::<T>::new())));
                } else {
                    columns.retain(|(ty, _)| *ty != type_id);
                }
                // Removal always succeeds, only growth is capped
                self.get_or_create_archetype(&signature, add, move || columns)?
            }
        };

        self.transitions.insert((from, type_id, add), to);
        Ok(to)
    }

    fn structural_change(&mut self) {
        self.structural_version += 1;
        self.query_cache.get_mut().mark_all_dirty();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Register (or look up) the cached query for fetch type `Q`.
    ///
    /// # Panics
    /// Panics if `Q` borrows a component mutably more than once, or both
    /// mutably and immutably.
    pub fn query<Q: Fetch>(&self) -> QueryHandle<Q> {
        let descriptor = QueryDescriptor::of::<Q>();
        descriptor.assert_no_aliasing();
        let signature = descriptor.signature();
        self.query_cache.lock().resolve(&signature, &self.archetypes);
        QueryHandle::new(signature)
    }

    fn matched_archetypes(&self, signature: &QuerySignature) -> MatchedArchetypes {
        let mut cache = self.query_cache.lock();
        cache
            .resolve(signature, &self.archetypes)
            .archetypes
            .iter()
            .copied()
            .collect()
    }

    /// Iterate `(EntityId, item)` for every match, with mutable access
    pub fn iter<Q: Fetch>(&mut self, handle: &QueryHandle<Q>) -> QueryIter<'_, Q> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.query_iter").entered();

        let matched: MatchedArchetypes = self
            .query_cache
            .get_mut()
            .resolve(handle.signature(), &self.archetypes)
            .archetypes
            .iter()
            .copied()
            .collect();
        QueryIter::new_exclusive(&mut self.archetypes, matched)
    }

    /// Iterate read-only fetches through a shared borrow
    pub fn iter_shared<Q: ReadOnlyFetch>(&self, handle: &QueryHandle<Q>) -> QueryIter<'_, Q> {
        let matched = self.matched_archetypes(handle.signature());
        QueryIter::new_shared(&self.archetypes, matched)
    }

    /// Call `f` once per matching entity
    pub fn iterate<Q, F>(&mut self, handle: &QueryHandle<Q>, mut f: F)
    where
        Q: Fetch,
        F: for<'a> FnMut(EntityId, Q::Item<'a>),
    {
        for (entity, item) in self.iter(handle) {
            f(entity, item);
        }
    }

    /// Number of matching entities, without fetching components
    pub fn count<Q: Fetch>(&self, handle: &QueryHandle<Q>) -> usize {
        let mut cache = self.query_cache.lock();
        cache
            .resolve(handle.signature(), &self.archetypes)
            .entity_count(&self.archetypes)
    }

    /// Flattened entity list of a query, in iteration order
    pub fn query_entities<Q: Fetch>(&mut self, handle: &QueryHandle<Q>) -> &[EntityId] {
        let archetypes = &self.archetypes;
        &self
            .query_cache
            .get_mut()
            .resolve(handle.signature(), archetypes)
            .entities
    }

    /// Read-only iteration spread over matched archetypes with rayon
    #[cfg(feature = "parallel")]
    pub fn par_for_each<Q, F>(&self, handle: &QueryHandle<Q>, f: F)
    where
        Q: ReadOnlyFetch,
        F: for<'a> Fn(EntityId, Q::Item<'a>) + Send + Sync,
    {
        use rayon::prelude::*;

        let matched = self.matched_archetypes(handle.signature());
        matched.as_slice().par_iter().for_each(|id| {
            let archetype = &self.archetypes[id.index()];
            if let Some(state) = Q::prepare_shared(archetype) {
                for (row, &entity) in archetype.entities().iter().enumerate() {
                    // SAFETY: read-only fetch over rows of a borrowed archetype
                    f(entity, unsafe { Q::fetch(state, row) });
                }
            }
        });
    }

    pub fn query_cache_stats(&self) -> QueryCacheStats {
        self.query_cache.lock().stats()
    }

    /// Drop every cached query; handles rebuild their entry on next use
    pub fn clear_query_cache(&mut self) {
        self.query_cache.get_mut().clear();
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.event_bus
    }

    /// Queue an event for delivery at the start of the next tick
    pub fn emit<E: Event>(&mut self, event: E) {
        self.event_bus.emit(event);
    }

    // ------------------------------------------------------------------
    // Deferred commands and replication
    // ------------------------------------------------------------------

    /// Drain a command buffer into the world
    pub fn apply_commands(&mut self, commands: &mut CommandBuffer) -> Result<()> {
        commands.apply(self)
    }

    /// Flag an entity for the next network delta
    pub fn mark_dirty(&mut self, entity: EntityId) {
        if self.is_alive(entity) {
            self.dirty.insert(entity);
        }
    }

    /// Take the dirty set, in ascending id order
    pub fn take_dirty(&mut self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.dirty.drain().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

fn pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeId,
    b: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
    debug_assert_ne!(a, b, "BUG: archetype transition onto itself");
    if a.index() < b.index() {
        let (left, right) = archetypes.split_at_mut(b.index());
        (&mut left[a.index()], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(a.index());
        (&mut right[0], &mut left[b.index()])
    }
}

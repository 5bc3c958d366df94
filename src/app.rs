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

//! Application facade
//!
//! Bundles the world, scheduler, serializer and a snapshot store behind one
//! host-facing API.

use std::time::Duration;

use crate::component::Component;
use crate::config::EcsConfig;
use crate::entity::EntityId;
use crate::error::Result;
use crate::event::{Envelope, Event};
use crate::event_bus::Subscription;
use crate::profiling::TickReport;
use crate::query::{Fetch, QueryHandle};
use crate::schedule::{Scheduler, SystemId};
use crate::serialization::Serializer;
use crate::storage::{MemorySnapshotStore, SnapshotStore};
use crate::system::System;
use crate::world::World;

/// Main application entry point
pub struct App {
    pub world: World,
    pub scheduler: Scheduler,
    pub serializer: Serializer,
    store: Box<dyn SnapshotStore>,
}

impl App {
    /// Create new application with default config and an in-memory store
    pub fn new() -> Self {
        Self::from_config(EcsConfig::default())
    }

    pub fn from_config(config: EcsConfig) -> Self {
        Self {
            world: World::with_config(config.world),
            scheduler: Scheduler::with_config(config.scheduler),
            serializer: Serializer::with_config(config.serializer),
            store: Box::new(MemorySnapshotStore::new()),
        }
    }

    /// Replace the snapshot store
    pub fn with_store(mut self, store: impl SnapshotStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn store(&self) -> &dyn SnapshotStore {
        self.store.as_ref()
    }

    pub fn create_entity(&mut self) -> EntityId {
        self.world.create_entity()
    }

    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        self.world.destroy_entity(entity)
    }

    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<()> {
        self.world.add_component(entity, component)
    }

    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Option<T> {
        self.world.remove_component(entity)
    }

    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.world.get_component(entity)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.world.get_component_mut(entity)
    }

    pub fn query<Q: Fetch>(&self) -> QueryHandle<Q> {
        self.world.query::<Q>()
    }

    pub fn register_system<S: System + 'static>(&mut self, system: S, priority: i32) -> Result<SystemId> {
        self.scheduler.register(&mut self.world, system, priority)
    }

    pub fn unregister_system(&mut self, id: SystemId) -> Result<()> {
        self.scheduler.unregister(&mut self.world, id)
    }

    /// Run one tick
    pub fn tick(&mut self, delta: Duration) -> Result<TickReport> {
        self.scheduler.tick(&mut self.world, delta)
    }

    /// Queue an event; handlers see it at the start of the next tick
    pub fn emit_event<E: Event>(&mut self, event: E) {
        self.world.emit(event);
    }

    pub fn subscribe<E, F>(&mut self, priority: i32, handler: F) -> Subscription
    where
        E: Event,
        F: FnMut(&mut Envelope<E>) + Send + Sync + 'static,
    {
        self.world
            .events_mut()
            .subscribe_with_priority::<E, F>(priority, handler)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.world.events_mut().unsubscribe(subscription)
    }

    /// Snapshot the world into `slot`
    pub fn save(&mut self, slot: &str) -> Result<()> {
        let snapshot = self.serializer.serialize_world(&self.world)?;
        self.store.save(slot, &snapshot)
    }

    /// Restore the world from `slot`. Returns `false` when the slot is empty.
    pub fn load(&mut self, slot: &str) -> Result<bool> {
        let Some(snapshot) = self.store.load(slot)? else {
            return Ok(false);
        };
        self.serializer.deserialize_world(snapshot, &mut self.world)?;
        Ok(true)
    }

    pub fn instantiate(&mut self, prefab: &str) -> Result<EntityId> {
        self.serializer.instantiate(prefab, &mut self.world)
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

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

//! Dirty-entity replication
//!
//! The sender marks entities with `World::mark_dirty` and ships the result of
//! [`Serializer::snapshot_dirty`]; the receiver feeds it to
//! [`Serializer::apply_delta`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityId;
use crate::error::Result;
use crate::serialization::{ComponentRecord, Serializer};
use crate::world::World;

/// Registered components of one changed entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDelta {
    pub id: EntityId,
    /// Payloads keyed by type tag
    pub components: BTreeMap<String, Value>,
}

/// Changes of one sender tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDelta {
    pub tick: u64,
    /// Sorted by id
    pub entities: Vec<EntityDelta>,
}

impl NetworkDelta {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Serializer {
    /// Drain the dirty set into a delta. Entities destroyed since they were
    /// marked are left out.
    pub fn snapshot_dirty(&self, world: &mut World) -> Result<NetworkDelta> {
        let dirty = world.take_dirty();
        let mut entities = Vec::with_capacity(dirty.len());
        for id in dirty {
            if let Some(components) = self.registry().encode_entity(world, id)? {
                entities.push(EntityDelta { id, components });
            }
        }
        Ok(NetworkDelta {
            tick: world.tick(),
            entities,
        })
    }

    /// Apply a delta received from another world.
    ///
    /// Missing entities are created under the sender's ids; listed components
    /// are overwritten, others are left alone. Every payload is decoded before
    /// the world changes. Returns the number of entities touched.
    pub fn apply_delta(&mut self, delta: &NetworkDelta, world: &mut World) -> Result<usize> {
        let mut warnings = Vec::new();
        let mut decoded = Vec::with_capacity(delta.entities.len());
        for entity in &delta.entities {
            let components: Vec<ComponentRecord> = entity
                .components
                .iter()
                .map(|(type_tag, payload)| ComponentRecord {
                    type_tag: type_tag.clone(),
                    payload: payload.clone(),
                })
                .collect();
            decoded.push(self.decode_record(entity.id, &components, &mut warnings)?);
        }
        self.warnings.extend(warnings);

        let touched = decoded.len();
        for entity in decoded {
            let id = entity.id;
            if !world.is_alive(id) {
                world.spawn_with_id(id)?;
            }
            entity.apply(world, id)?;
        }
        tracing::trace!(tick = delta.tick, entities = touched, "delta applied");
        Ok(touched)
    }
}

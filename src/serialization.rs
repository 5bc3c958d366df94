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

//! World snapshots
//!
//! Records carry `(type_tag, payload)` pairs for registered components only.
//! Loading decodes every payload before the world is touched, so a bad
//! snapshot either loads completely or not at all.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::Component;
use crate::config::SerializerConfig;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::prefab::PrefabLibrary;
use crate::registry::{ComponentRegistry, PendingComponent};
use crate::world::World;

/// One persisted component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub type_tag: String,
    pub payload: Value,
}

/// One persisted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    /// Sorted by type tag
    pub components: Vec<ComponentRecord>,
}

/// Whole-world snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    /// Unix time in milliseconds
    pub timestamp: u64,
    /// Id of the singleton entity in the saved world
    #[serde(default)]
    pub singleton: Option<EntityId>,
    /// Sorted by id
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// How `deserialize_entity` picks the entity id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPolicy {
    /// Allocate a new id
    Fresh,
    /// Restore the id stored in the record
    Preserve,
}

/// A component skipped while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    pub entity: EntityId,
    pub type_tag: String,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown component type '{}' on {}, skipped",
            self.type_tag, self.entity
        )
    }
}

/// Outcome of `deserialize_world`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub entities_loaded: usize,
    /// Version the snapshot was migrated from, if it was
    pub migrated_from: Option<u32>,
    pub warnings: Vec<LoadWarning>,
}

/// Upgrades a snapshot by exactly one format version
pub type Migration = Box<dyn Fn(&mut Snapshot) -> Result<()> + Send + Sync>;

pub(crate) struct DecodedEntity {
    pub(crate) id: EntityId,
    pub(crate) components: Vec<PendingComponent>,
}

impl DecodedEntity {
    pub(crate) fn apply(self, world: &mut World, entity: EntityId) -> Result<()> {
        for component in self.components {
            component.apply(world, entity)?;
        }
        Ok(())
    }
}

/// State serializer: registry, migrations and prefabs
pub struct Serializer {
    registry: ComponentRegistry,
    migrations: BTreeMap<u32, Migration>,
    pub(crate) prefabs: PrefabLibrary,
    format_version: u32,
    pub(crate) warnings: Vec<LoadWarning>,
}

impl Serializer {
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self {
            registry: ComponentRegistry::new(),
            migrations: BTreeMap::new(),
            prefabs: PrefabLibrary::new(),
            format_version: config.format_version,
            warnings: Vec::new(),
        }
    }

    /// Format version written by `serialize_world`
    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a persisted component type
    pub fn register<T>(&mut self, type_tag: impl Into<String>) -> Result<()>
    where
        T: Component + Serialize + DeserializeOwned,
    {
        self.registry.register::<T>(type_tag)
    }

    /// Register the upgrade from `from_version` to `from_version + 1`
    pub fn add_migration<F>(&mut self, from_version: u32, migration: F)
    where
        F: Fn(&mut Snapshot) -> Result<()> + Send + Sync + 'static,
    {
        self.migrations.insert(from_version, Box::new(migration));
    }

    /// Warnings collected by loads since the last call
    pub fn take_warnings(&mut self) -> Vec<LoadWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Record of the registered components of `entity`; `None` if dead
    pub fn serialize_entity(&self, world: &World, entity: EntityId) -> Result<Option<EntityRecord>> {
        let Some(components) = self.registry.encode_entity(world, entity)? else {
            return Ok(None);
        };
        Ok(Some(EntityRecord {
            id: entity,
            components: components
                .into_iter()
                .map(|(type_tag, payload)| ComponentRecord { type_tag, payload })
                .collect(),
        }))
    }

    /// Decode a record's payloads, skipping unknown tags with a warning
    pub(crate) fn decode_record(
        &self,
        id: EntityId,
        components: &[ComponentRecord],
        warnings: &mut Vec<LoadWarning>,
    ) -> Result<DecodedEntity> {
        let mut decoded = Vec::with_capacity(components.len());
        for record in components {
            match self.registry.get(&record.type_tag) {
                Some(registration) => decoded.push(registration.decode(record.payload.clone())?),
                None => {
                    tracing::warn!(
                        entity = %id,
                        type_tag = %record.type_tag,
                        "unknown component type tag, skipping"
                    );
                    warnings.push(LoadWarning {
                        entity: id,
                        type_tag: record.type_tag.clone(),
                    });
                }
            }
        }
        Ok(DecodedEntity {
            id,
            components: decoded,
        })
    }

    /// Create an entity from a record.
    ///
    /// Every payload is decoded before the entity is created, so an invalid
    /// payload leaves the world untouched.
    pub fn deserialize_entity(
        &mut self,
        record: &EntityRecord,
        world: &mut World,
        policy: IdPolicy,
    ) -> Result<EntityId> {
        let mut warnings = Vec::new();
        let decoded = self.decode_record(record.id, &record.components, &mut warnings)?;
        self.warnings.extend(warnings);

        let entity = match policy {
            IdPolicy::Fresh => world.create_entity(),
            IdPolicy::Preserve => world.spawn_with_id(record.id)?,
        };
        decoded.apply(world, entity)?;
        Ok(entity)
    }

    /// Snapshot every live entity, in id order
    pub fn serialize_world(&self, world: &World) -> Result<Snapshot> {
        #[cfg(feature = "profiling")]
        let _span = tracing::info_span!("serializer.serialize_world").entered();

        let mut entities = Vec::with_capacity(world.entity_count());
        for id in world.entities() {
            if let Some(record) = self.serialize_entity(world, id)? {
                entities.push(record);
            }
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("tick".to_string(), Value::from(world.tick()));
        metadata.insert("entity_count".to_string(), Value::from(entities.len()));

        Ok(Snapshot {
            format_version: self.format_version,
            timestamp: unix_millis(),
            singleton: Some(world.singleton()),
            entities,
            metadata,
        })
    }

    /// Bring a snapshot up to the current format version
    fn migrate(&self, snapshot: &mut Snapshot) -> Result<Option<u32>> {
        let found = snapshot.format_version;
        let incompatible = EcsError::IncompatibleFormat {
            found,
            expected: self.format_version,
        };
        if found > self.format_version {
            return Err(incompatible);
        }
        if found == self.format_version {
            return Ok(None);
        }

        for version in found..self.format_version {
            let Some(migration) = self.migrations.get(&version) else {
                return Err(incompatible);
            };
            migration(snapshot)?;
            snapshot.format_version = version + 1;
        }
        tracing::info!(from = found, to = self.format_version, "snapshot migrated");
        Ok(Some(found))
    }

    /// Replace the world's contents with a snapshot.
    ///
    /// Ids are preserved; the saved singleton's components go onto this
    /// world's singleton. Any failure (version, payload, duplicate id,
    /// archetype limit) leaves `world` as it was.
    pub fn deserialize_world(&mut self, mut snapshot: Snapshot, world: &mut World) -> Result<LoadReport> {
        #[cfg(feature = "profiling")]
        let _span = tracing::info_span!("serializer.deserialize_world").entered();

        let migrated_from = self.migrate(&mut snapshot)?;

        let mut warnings = Vec::new();
        let mut decoded = Vec::with_capacity(snapshot.entities.len());
        for record in &snapshot.entities {
            decoded.push(self.decode_record(record.id, &record.components, &mut warnings)?);
        }

        // Replay into a staging world; `world` only changes once every
        // record has landed.
        let mut staged = World::with_config(world.config().clone());
        let singleton = staged.singleton();
        let entities_loaded = decoded.len();
        for entity in decoded {
            let target = if Some(entity.id) == snapshot.singleton || entity.id == singleton {
                singleton
            } else {
                staged.spawn_with_id(entity.id)?
            };
            entity.apply(&mut staged, target)?;
        }
        world.adopt_storage(staged);

        tracing::info!(
            entities = entities_loaded,
            warnings = warnings.len(),
            format_version = snapshot.format_version,
            "snapshot loaded"
        );
        self.warnings.extend(warnings.iter().cloned());
        Ok(LoadReport {
            entities_loaded,
            migrated_from,
            warnings,
        })
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

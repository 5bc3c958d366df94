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

//! Component type registry for persistence
//!
//! Binds a stable string tag to each persisted component type. Types that are
//! never registered are runtime-only: the serializer skips them.

use std::any::TypeId;
use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::archetype::Archetype;
use crate::component::Component;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::world::World;

type ViewFn = fn(&Archetype, usize) -> Option<&dyn erased_serde::Serialize>;
type DecodeFn = fn(&str, Value) -> Result<PendingComponent>;
type InsertFn = Box<dyn FnOnce(&mut World, EntityId) -> Result<()> + Send>;

/// A decoded component waiting to be attached to an entity
pub struct PendingComponent {
    type_tag: String,
    insert: InsertFn,
}

impl PendingComponent {
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Attach (or overwrite) the component on `entity`
    pub fn apply(self, world: &mut World, entity: EntityId) -> Result<()> {
        (self.insert)(world, entity)
    }
}

impl std::fmt::Debug for PendingComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingComponent")
            .field("type_tag", &self.type_tag)
            .finish()
    }
}

/// Type registration data
pub struct Registration {
    pub type_tag: String,
    pub type_id: TypeId,
    pub type_name: &'static str,
    view: ViewFn,
    decode: DecodeFn,
}

impl Registration {
    fn of<T>(type_tag: String) -> Self
    where
        T: Component + Serialize + DeserializeOwned,
    {
        Self {
            type_tag,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            view: view_component::<T>,
            decode: decode_component::<T>,
        }
    }

    /// Encode the component at `row` of `archetype` as a JSON payload
    pub fn encode(&self, archetype: &Archetype, row: usize) -> Result<Option<Value>> {
        match (self.view)(archetype, row) {
            Some(component) => Ok(Some(serde_json::to_value(component)?)),
            None => Ok(None),
        }
    }

    /// Decode a payload without touching any world
    pub fn decode(&self, payload: Value) -> Result<PendingComponent> {
        (self.decode)(&self.type_tag, payload)
    }
}

fn view_component<T: Component + Serialize>(
    archetype: &Archetype,
    row: usize,
) -> Option<&dyn erased_serde::Serialize> {
    archetype
        .get::<T>(row)
        .map(|component| component as &dyn erased_serde::Serialize)
}

fn decode_component<T>(type_tag: &str, payload: Value) -> Result<PendingComponent>
where
    T: Component + DeserializeOwned,
{
    let component: T =
        serde_json::from_value(payload).map_err(|e| EcsError::InvalidPayload {
            type_tag: type_tag.to_string(),
            reason: e.to_string(),
        })?;
    Ok(PendingComponent {
        type_tag: type_tag.to_string(),
        insert: Box::new(move |world, entity| world.add_component(entity, component)),
    })
}

/// Registry for persisted component types
#[derive(Default)]
pub struct ComponentRegistry {
    by_tag: BTreeMap<String, Registration>,
    by_type: AHashMap<TypeId, String>,
}

impl ComponentRegistry {
    /// Create new registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `type_tag`.
    ///
    /// Re-registering the same pair is a no-op. A tag already bound to a
    /// different type, or a type already bound to a different tag, fails
    /// with `DuplicateTypeTag`.
    pub fn register<T>(&mut self, type_tag: impl Into<String>) -> Result<()>
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let type_tag = type_tag.into();
        let type_id = TypeId::of::<T>();

        if let Some(existing) = self.by_tag.get(&type_tag) {
            if existing.type_id == type_id {
                return Ok(());
            }
            return Err(EcsError::DuplicateTypeTag(type_tag));
        }
        if let Some(other_tag) = self.by_type.get(&type_id) {
            return Err(EcsError::DuplicateTypeTag(format!(
                "{} is already registered as '{other_tag}'",
                std::any::type_name::<T>()
            )));
        }

        self.by_type.insert(type_id, type_tag.clone());
        self.by_tag
            .insert(type_tag.clone(), Registration::of::<T>(type_tag));
        Ok(())
    }

    /// Get registration by tag
    pub fn get(&self, type_tag: &str) -> Option<&Registration> {
        self.by_tag.get(type_tag)
    }

    /// Tag of a registered type
    pub fn tag_of<T: Component>(&self) -> Option<&str> {
        self.by_type.get(&TypeId::of::<T>()).map(String::as_str)
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.by_tag.contains_key(type_tag)
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Registrations in tag order
    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.by_tag.values()
    }

    /// Encode every registered component of `entity`, keyed (and so sorted)
    /// by tag. `None` when the entity is dead.
    pub fn encode_entity(
        &self,
        world: &World,
        entity: EntityId,
    ) -> Result<Option<BTreeMap<String, Value>>> {
        let Some(location) = world.location(entity) else {
            return Ok(None);
        };
        let Some(archetype) = world.archetype(location.archetype_id) else {
            return Ok(None);
        };

        let mut components = BTreeMap::new();
        for type_id in archetype.signature() {
            let Some(tag) = self.by_type.get(type_id) else {
                continue;
            };
            let Some(registration) = self.by_tag.get(tag) else {
                continue;
            };
            if let Some(payload) = registration.encode(archetype, location.archetype_row)? {
                components.insert(tag.clone(), payload);
            }
        }
        Ok(Some(components))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Health {
        current: u32,
        max: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Name(String);

    #[test]
    fn test_duplicate_tag_for_other_type_fails() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>("health").unwrap();
        registry.register::<Health>("health").unwrap();

        let err = registry.register::<Name>("health").unwrap_err();
        assert!(matches!(err, EcsError::DuplicateTypeTag(tag) if tag == "health"));

        let err = registry.register::<Health>("hp").unwrap_err();
        assert!(matches!(err, EcsError::DuplicateTypeTag(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_encode_skips_unregistered() {
        struct RuntimeOnly;

        let mut registry = ComponentRegistry::new();
        registry.register::<Health>("health").unwrap();
        registry.register::<Name>("name").unwrap();

        let mut world = World::new();
        let e = world
            .spawn((
                Name("orc".into()),
                Health { current: 3, max: 10 },
                RuntimeOnly,
            ))
            .unwrap();

        let components = registry.encode_entity(&world, e).unwrap().unwrap();
        let tags: Vec<&str> = components.keys().map(String::as_str).collect();
        assert_eq!(tags, vec!["health", "name"]);
        assert_eq!(components["health"], serde_json::json!({"current": 3, "max": 10}));
    }

    #[test]
    fn test_decode_invalid_payload() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>("health").unwrap();

        let err = registry
            .get("health")
            .unwrap()
            .decode(serde_json::json!({"current": "lots"}))
            .unwrap_err();
        assert!(matches!(err, EcsError::InvalidPayload { ref type_tag, .. } if type_tag == "health"));
    }

    #[test]
    fn test_pending_component_applies() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Name>("name").unwrap();
        let pending = registry
            .get("name")
            .unwrap()
            .decode(serde_json::json!("goblin"))
            .unwrap();
        assert_eq!(pending.type_tag(), "name");

        let mut world = World::new();
        let e = world.create_entity();
        pending.apply(&mut world, e).unwrap();
        assert_eq!(world.get_component::<Name>(e), Some(&Name("goblin".into())));
    }
}

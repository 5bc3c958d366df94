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

//! Prefabs: named entity templates
//!
//! A prefab has the shape of an entity record without an id. It can be
//! registered directly, loaded from JSON or captured from a live entity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::serialization::{ComponentRecord, Serializer};
use crate::world::World;

/// Named entity template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prefab {
    pub name: String,
    #[serde(default)]
    pub components: Vec<ComponentRecord>,
}

impl Prefab {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    /// Builder-style component entry
    pub fn with(mut self, type_tag: impl Into<String>, payload: serde_json::Value) -> Self {
        self.components.push(ComponentRecord {
            type_tag: type_tag.into(),
            payload,
        });
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PrefabFile {
    Many(Vec<Prefab>),
    One(Prefab),
}

/// Prefabs by name
#[derive(Debug, Clone, Default)]
pub struct PrefabLibrary {
    prefabs: BTreeMap<String, Prefab>,
}

impl PrefabLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing any prefab with the same name
    pub fn insert(&mut self, prefab: Prefab) -> Option<Prefab> {
        self.prefabs.insert(prefab.name.clone(), prefab)
    }

    pub fn get(&self, name: &str) -> Option<&Prefab> {
        self.prefabs.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Prefab> {
        self.prefabs.remove(name)
    }

    pub fn len(&self) -> usize {
        self.prefabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefabs.is_empty()
    }

    /// Prefab names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prefabs.keys().map(String::as_str)
    }
}

impl Serializer {
    pub fn prefabs(&self) -> &PrefabLibrary {
        &self.prefabs
    }

    pub fn register_prefab(&mut self, prefab: Prefab) {
        if self.prefabs.insert(prefab).is_some() {
            tracing::debug!("prefab replaced");
        }
    }

    /// Load one prefab object or an array of them. Returns how many were added.
    pub fn load_prefabs_json(&mut self, json: &str) -> Result<usize> {
        let prefabs = match serde_json::from_str::<PrefabFile>(json)? {
            PrefabFile::Many(prefabs) => prefabs,
            PrefabFile::One(prefab) => vec![prefab],
        };
        let count = prefabs.len();
        for prefab in prefabs {
            self.register_prefab(prefab);
        }
        Ok(count)
    }

    /// Store the registered components of a live entity as a prefab
    pub fn capture_prefab(
        &mut self,
        world: &World,
        entity: EntityId,
        name: impl Into<String>,
    ) -> Result<&Prefab> {
        let record = self
            .serialize_entity(world, entity)?
            .ok_or(EcsError::EntityNotFound(entity))?;
        let name = name.into();
        self.prefabs.insert(Prefab {
            name: name.clone(),
            components: record.components,
        });
        self.prefabs
            .get(&name)
            .ok_or(EcsError::PrefabNotFound(name))
    }

    /// Spawn a fresh entity from a prefab.
    ///
    /// Payloads are decoded first; nothing is created if one is invalid.
    pub fn instantiate(&mut self, name: &str, world: &mut World) -> Result<EntityId> {
        let prefab = self
            .prefabs
            .get(name)
            .ok_or_else(|| EcsError::PrefabNotFound(name.to_string()))?;

        let mut warnings = Vec::new();
        let decoded = self.decode_record(EntityId::from_raw(0), &prefab.components, &mut warnings)?;

        let entity = world.create_entity();
        for mut warning in warnings {
            warning.entity = entity;
            self.warnings.push(warning);
        }
        decoded.apply(world, entity)?;
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Health(u32);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Speed(f32);

    fn serializer() -> Serializer {
        let mut serializer = Serializer::new();
        serializer.register::<Health>("health").unwrap();
        serializer.register::<Speed>("speed").unwrap();
        serializer
    }

    #[test]
    fn test_instantiate_registered_prefab() {
        let mut serializer = serializer();
        serializer.register_prefab(Prefab::new("goblin").with("health", json!(7)).with("speed", json!(1.5)));

        let mut world = World::new();
        let a = serializer.instantiate("goblin", &mut world).unwrap();
        let b = serializer.instantiate("goblin", &mut world).unwrap();
        assert_ne!(a, b);
        assert_eq!(world.get_component::<Health>(b), Some(&Health(7)));
        assert_eq!(world.get_component::<Speed>(a), Some(&Speed(1.5)));
    }

    #[test]
    fn test_unknown_prefab() {
        let mut serializer = serializer();
        let mut world = World::new();
        let err = serializer.instantiate("dragon", &mut world).unwrap_err();
        assert!(matches!(err, EcsError::PrefabNotFound(name) if name == "dragon"));
    }

    #[test]
    fn test_load_one_or_many() {
        let mut serializer = serializer();
        let one = r#"{"name": "rock", "components": [{"type_tag": "health", "payload": 100}]}"#;
        assert_eq!(serializer.load_prefabs_json(one).unwrap(), 1);

        let many = r#"[{"name": "a"}, {"name": "b", "components": []}]"#;
        assert_eq!(serializer.load_prefabs_json(many).unwrap(), 2);

        let names: Vec<&str> = serializer.prefabs().names().collect();
        assert_eq!(names, vec!["a", "b", "rock"]);
    }

    #[test]
    fn test_capture_prefab() {
        let mut serializer = serializer();
        let mut world = World::new();
        let template = world.spawn((Health(3), Speed(2.0))).unwrap();

        let prefab = serializer.capture_prefab(&world, template, "runner").unwrap();
        assert_eq!(prefab.components.len(), 2);

        world.destroy_entity(template);
        let err = serializer.capture_prefab(&world, template, "gone").unwrap_err();
        assert!(matches!(err, EcsError::EntityNotFound(_)));

        let copy = serializer.instantiate("runner", &mut world).unwrap();
        assert_eq!(world.get_component::<Health>(copy), Some(&Health(3)));
    }

    #[test]
    fn test_invalid_prefab_payload_spawns_nothing() {
        let mut serializer = serializer();
        serializer.register_prefab(Prefab::new("broken").with("health", json!("full")));
        let mut world = World::new();
        let before = world.entity_count();
        assert!(matches!(
            serializer.instantiate("broken", &mut world),
            Err(EcsError::InvalidPayload { .. })
        ));
        assert_eq!(world.entity_count(), before);
    }
}

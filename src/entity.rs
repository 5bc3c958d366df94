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

//! Entity identifiers and location metadata.
//!
//! Ids are handed out from a monotonic counter and never recycled within a
//! process, so a stale id can never alias a newer entity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::archetype::ArchetypeId;

/// Opaque entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Rebuild an id from its raw value (snapshots, network deltas)
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value of this id
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Entity location in archetype (archetype_id, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: ArchetypeId,
    pub archetype_row: usize,
}

/// Monotonic id source.
#[derive(Debug, Default)]
pub(crate) struct EntityAllocator {
    next: u64,
}

impl EntityAllocator {
    pub(crate) fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        // u64 exhaustion would take centuries at any realistic spawn rate
        self.next = self
            .next
            .checked_add(1)
            .unwrap_or_else(|| panic!("Entity ID exhaustion at {:#x}", self.next));
        id
    }

    /// Make sure a restored id is never handed out again.
    pub(crate) fn reserve(&mut self, id: EntityId) {
        if id.0 >= self.next {
            self.next = id.0.saturating_add(1);
        }
    }

    pub(crate) fn peek(&self) -> u64 {
        self.next
    }
}

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

//! Error types
//!
//! Absence is not an error in this crate: a missing component, a dead entity
//! on a read path or an empty query all come back as `None` or an empty
//! iterator. `EcsError` is reserved for misuse that the caller must see,
//! incompatible data, and failing systems.

use thiserror::Error;

use crate::entity::EntityId;

/// ECS error type
#[derive(Debug, Error)]
pub enum EcsError {
    /// A command-style operation targeted an entity that is not alive
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// An exact-id restore targeted an id that is still alive
    #[error("Entity already exists: {0}")]
    EntityAlreadyExists(EntityId),

    /// Non-overwriting insert found the component already attached
    #[error("Entity {entity} already has component {component}")]
    DuplicateComponent {
        entity: EntityId,
        component: &'static str,
    },

    /// Too many distinct archetypes
    #[error("Archetype limit exceeded ({0})")]
    ArchetypeLimitExceeded(usize),

    /// System id unknown to the scheduler
    #[error("System not found")]
    SystemNotFound,

    /// An event handler panicked while events were delivered
    #[error("Event handler panicked: {message}")]
    HandlerPanicked { message: String },

    /// A system returned an error from `update`
    #[error("System '{system}' failed: {source}")]
    SystemFailed {
        system: String,
        #[source]
        source: Box<EcsError>,
    },

    /// A system panicked inside `update`
    #[error("System '{system}' panicked: {message}")]
    SystemPanicked { system: String, message: String },

    /// Error raised by user system code
    #[error("System error: {0}")]
    System(String),

    /// Snapshot format version cannot be read by this serializer
    #[error("Incompatible snapshot format: found version {found}, expected {expected}")]
    IncompatibleFormat { found: u32, expected: u32 },

    /// A type tag was registered twice for different component types
    #[error("Type tag already registered: {0}")]
    DuplicateTypeTag(String),

    /// A payload for a known type tag could not be decoded
    #[error("Invalid payload for '{type_tag}': {reason}")]
    InvalidPayload { type_tag: String, reason: String },

    /// Prefab name unknown to the library
    #[error("Prefab not found: {0}")]
    PrefabNotFound(String),

    /// Snapshot slot names are limited to `[A-Za-z0-9_-]`
    #[error("Invalid snapshot slot name: '{0}'")]
    InvalidSlot(String),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EcsError {
    /// Shorthand for failing a system with a message
    pub fn system(message: impl Into<String>) -> Self {
        EcsError::System(message.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

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

//! Runtime configuration
//!
//! Every field has a default, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! [world]
//! query_cache_capacity = 512
//!
//! [scheduler]
//! max_fixed_steps = 4
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};

/// Store and query engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Number of query signatures kept in the LRU cache
    pub query_cache_capacity: usize,
    /// Upper bound on distinct archetypes
    pub archetype_limit: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            query_cache_capacity: 256,
            archetype_limit: 4096,
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Catch-up cap for fixed-interval systems, per tick
    pub max_fixed_steps: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_fixed_steps: 8 }
    }
}

/// Serializer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Snapshot format version written and accepted
    pub format_version: u32,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self { format_version: 1 }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsConfig {
    pub world: WorldConfig,
    pub scheduler: SchedulerConfig,
    pub serializer: SerializerConfig,
}

impl EcsConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| EcsError::Config(format!("Failed to parse config TOML: {e}")))
    }

    /// Load from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            EcsError::Config(msg) => EcsError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }
}

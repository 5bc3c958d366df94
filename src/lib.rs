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

//! Archetype Runtime - embeddable Entity Component System
//!
//! Archetype storage with cached queries, a deferred event bus, a prioritized
//! system scheduler and versioned JSON snapshots.

pub mod app;
pub mod archetype;
pub mod command;
pub mod component;
pub mod config;
pub mod dependency;
pub mod entity;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod event_subscriber;
pub mod prefab;
pub mod prelude;
pub mod profiling;
pub mod query;
pub mod registry;
pub mod replication;
pub mod schedule;
pub mod serialization;
pub mod storage;
pub mod system;
pub mod time;
pub mod world;

pub use app::*;
pub use archetype::*;
pub use command::*;
pub use component::*;
pub use config::*;
pub use dependency::*;
pub use entity::*;
pub use error::*;
pub use event::*;
pub use event_bus::*;
pub use event_subscriber::*;
pub use prefab::*;
pub use profiling::*;
pub use query::*;
pub use registry::*;
pub use replication::*;
pub use schedule::*;
pub use serialization::*;
pub use storage::*;
pub use system::*;
pub use time::*;
pub use world::*;

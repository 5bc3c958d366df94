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

//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use archetype_runtime::prelude::*;
//! ```

pub use crate::app::App;
pub use crate::command::CommandBuffer;
pub use crate::component::{Bundle, Component};
pub use crate::config::EcsConfig;
pub use crate::entity::EntityId;
pub use crate::error::{EcsError, Result};
pub use crate::event::{Envelope, Event};
pub use crate::event_bus::{EventBus, Subscription};
pub use crate::event_subscriber::Inbox;
pub use crate::prefab::Prefab;
pub use crate::query::{QueryHandle, With, Without};
pub use crate::replication::NetworkDelta;
pub use crate::schedule::{Scheduler, SystemId};
pub use crate::serialization::{IdPolicy, Serializer, Snapshot};
pub use crate::storage::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use crate::system::{FixedInterval, FunctionSystem, Reactive, System, SystemAccess};
pub use crate::time::FixedTime;
pub use crate::world::World;

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

//! Deferred structural commands
//!
//! Systems queue spawns, destroys and component changes here while they hold
//! query borrows; the scheduler applies the buffer after each system.

use crate::component::{Bundle, Component};
use crate::entity::EntityId;
use crate::error::Result;
use crate::world::World;

/// Type alias for world mutation closures
pub type CommandClosure = Box<dyn FnOnce(&mut World) -> Result<()> + Send>;

/// Deferred command for world mutations
pub enum Command {
    /// Spawn entity with closure
    Spawn(CommandClosure),

    /// Destroy entity
    Destroy(EntityId),

    /// Custom world mutation
    Custom(CommandClosure),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Spawn(_) => write!(f, "Spawn(...)"),
            Command::Destroy(e) => f.debug_tuple("Destroy").field(e).finish(),
            Command::Custom(_) => write!(f, "Custom(...)"),
        }
    }
}

/// Command buffer for deferred operations
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Create new command buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Queue a spawn of `bundle`
    pub fn spawn<B: Bundle>(&mut self, bundle: B) {
        self.commands
            .push(Command::Spawn(Box::new(move |world| world.spawn(bundle).map(|_| ()))));
    }

    /// Queue a spawn of an empty entity, then `init` on the new id
    pub fn spawn_with<F>(&mut self, init: F)
    where
        F: FnOnce(&mut World, EntityId) -> Result<()> + Send + 'static,
    {
        self.commands.push(Command::Spawn(Box::new(move |world| {
            let entity = world.create_entity();
            init(world, entity)
        })));
    }

    /// Queue destroy command
    pub fn destroy(&mut self, entity: EntityId) {
        self.commands.push(Command::Destroy(entity));
    }

    /// Queue a custom world mutation
    pub fn add<F>(&mut self, f: F)
    where
        F: FnOnce(&mut World) -> Result<()> + Send + 'static,
    {
        self.commands.push(Command::Custom(Box::new(f)));
    }

    /// Queue add component command
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) {
        self.add(move |world| world.add_component(entity, component));
    }

    /// Queue remove component command
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) {
        self.add(move |world| {
            world.remove_component::<T>(entity);
            Ok(())
        });
    }

    /// Queue an event emission
    pub fn emit<E: crate::event::Event>(&mut self, event: E) {
        self.add(move |world| {
            world.emit(event);
            Ok(())
        });
    }

    /// Apply all commands in queue order and clear the buffer.
    ///
    /// Stops at the first failing command; the rest are discarded.
    pub fn apply(&mut self, world: &mut World) -> Result<()> {
        let mut result = Ok(());
        for command in self.commands.drain(..) {
            if result.is_err() {
                continue;
            }
            result = match command {
                Command::Spawn(f) | Command::Custom(f) => f(world),
                Command::Destroy(entity) => {
                    world.destroy_entity(entity);
                    Ok(())
                }
            };
        }
        result
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Get length
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Clear buffer
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.commands).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EcsError;

    #[derive(Debug, PartialEq)]
    struct Tag(u8);

    #[test]
    fn test_command_buffer() {
        let mut buffer = CommandBuffer::new();
        assert!(buffer.is_empty());

        buffer.destroy(EntityId::from_raw(3));
        assert_eq!(buffer.len(), 1);

        buffer.clear();
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_apply_in_order() {
        let mut world = World::new();
        let e = world.create_entity();

        let mut buffer = CommandBuffer::new();
        buffer.add_component(e, Tag(1));
        buffer.add_component(e, Tag(2));
        buffer.spawn((Tag(9),));
        buffer.apply(&mut world).unwrap();

        assert!(buffer.is_empty());
        assert_eq!(world.get_component::<Tag>(e), Some(&Tag(2)));
        assert_eq!(world.entity_count(), 3);
    }

    #[test]
    fn test_spawn_with_sees_new_id() {
        let mut world = World::new();
        let mut buffer = CommandBuffer::new();
        buffer.spawn_with(|world, entity| world.add_component(entity, Tag(4)));
        world.apply_commands(&mut buffer).unwrap();

        let q = world.query::<&Tag>();
        assert_eq!(world.count(&q), 1);
    }

    #[test]
    fn test_failure_discards_remaining() {
        let mut world = World::new();
        let dead = world.create_entity();
        world.destroy_entity(dead);

        let mut buffer = CommandBuffer::new();
        buffer.add_component(dead, Tag(1));
        buffer.spawn((Tag(2),));
        let err = buffer.apply(&mut world).unwrap_err();

        assert!(matches!(err, EcsError::EntityNotFound(_)));
        assert!(buffer.is_empty());
        assert_eq!(world.entity_count(), 1);
    }
}

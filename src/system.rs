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

//! System trait and built-in system wrappers

use std::any::TypeId;
use std::marker::PhantomData;
use std::time::Duration;

use crate::command::CommandBuffer;
use crate::component::Component;
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::event::Event;
use crate::event_bus::Subscription;
use crate::event_subscriber::Inbox;
use crate::query::{Fetch, QueryDescriptor};
use crate::time::{FixedSteps, FixedTime};
use crate::world::World;

/// System access metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemAccess {
    pub reads: Vec<TypeId>,
    pub writes: Vec<TypeId>,
}

impl SystemAccess {
    /// Create empty access
    pub fn empty() -> Self {
        Self::default()
    }

    /// Access declared by fetch type `Q`
    pub fn from_query<Q: Fetch>() -> Self {
        let descriptor = QueryDescriptor::of::<Q>();
        Self {
            reads: descriptor.reads().collect(),
            writes: descriptor.writes().collect(),
        }
    }

    /// Builder: declare a read
    pub fn reading<T: Component>(mut self) -> Self {
        self.reads.push(TypeId::of::<T>());
        self
    }

    /// Builder: declare a write
    pub fn writing<T: Component>(mut self) -> Self {
        self.writes.push(TypeId::of::<T>());
        self
    }

    /// Merge two accesses (union of all reads/writes)
    pub fn merge(&self, other: &SystemAccess) -> SystemAccess {
        let mut merged = self.clone();
        for read in &other.reads {
            if !merged.reads.contains(read) {
                merged.reads.push(*read);
            }
        }
        for write in &other.writes {
            if !merged.writes.contains(write) {
                merged.writes.push(*write);
            }
        }
        merged
    }

    /// Check if this access conflicts with another
    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        // Write/write or write/read on the same component
        self.writes
            .iter()
            .any(|w| other.writes.contains(w) || other.reads.contains(w))
            || other.writes.iter().any(|w| self.reads.contains(w))
    }

    /// Check if two systems can run in parallel
    pub fn can_run_parallel(&self, other: &SystemAccess) -> bool {
        !self.conflicts_with(other)
    }
}

/// Unit of per-tick logic run by the [`Scheduler`](crate::schedule::Scheduler)
pub trait System: Send {
    /// Get system name
    fn name(&self) -> &str;

    /// Components this system reads and writes
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }

    /// Called once when registered
    fn setup(&mut self, _world: &mut World) -> Result<()> {
        Ok(())
    }

    /// Run system logic against the world.
    ///
    /// Structural changes that must wait until iteration is done go into
    /// `commands`; the scheduler applies them right after this call.
    fn update(
        &mut self,
        world: &mut World,
        commands: &mut CommandBuffer,
        delta: Duration,
    ) -> Result<()>;

    /// Called once when unregistered
    fn cleanup(&mut self, _world: &mut World) {}
}

/// Boxed system
pub type BoxedSystem = Box<dyn System>;

/// System built from a closure
pub struct FunctionSystem<F> {
    name: String,
    access: SystemAccess,
    func: F,
}

impl<F> FunctionSystem<F>
where
    F: FnMut(&mut World, &mut CommandBuffer, Duration) -> Result<()> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            access: SystemAccess::empty(),
            func,
        }
    }

    pub fn with_access(mut self, access: SystemAccess) -> Self {
        self.access = access;
        self
    }
}

impl<F> System for FunctionSystem<F>
where
    F: FnMut(&mut World, &mut CommandBuffer, Duration) -> Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn access(&self) -> SystemAccess {
        self.access.clone()
    }

    fn update(
        &mut self,
        world: &mut World,
        commands: &mut CommandBuffer,
        delta: Duration,
    ) -> Result<()> {
        (self.func)(world, commands, delta)
    }
}

/// Runs the inner system at a constant step, zero or more times per tick
pub struct FixedInterval<S> {
    inner: S,
    clock: FixedTime,
    max_steps: u32,
}

impl<S: System> FixedInterval<S> {
    /// Step `inner` every `step`, with the default catch-up cap
    pub fn new(inner: S, step: Duration) -> Self {
        Self {
            inner,
            clock: FixedTime::from_duration(step),
            max_steps: SchedulerConfig::default().max_fixed_steps,
        }
    }

    /// Cap on steps run in a single tick
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn step(&self) -> Duration {
        self.clock.timestep()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: System> System for FixedInterval<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn access(&self) -> SystemAccess {
        self.inner.access()
    }

    fn setup(&mut self, world: &mut World) -> Result<()> {
        self.inner.setup(world)
    }

    fn update(
        &mut self,
        world: &mut World,
        commands: &mut CommandBuffer,
        delta: Duration,
    ) -> Result<()> {
        let FixedSteps { steps, dropped } = self.clock.tick_capped(delta, self.max_steps);
        if !dropped.is_zero() {
            tracing::warn!(
                system = self.inner.name(),
                max_steps = self.max_steps,
                dropped_ms = dropped.as_secs_f64() * 1000.0,
                "fixed-step catch-up capped, dropping time"
            );
        }

        let step = self.clock.timestep();
        for _ in 0..steps {
            self.inner.update(world, commands, step)?;
        }
        Ok(())
    }

    fn cleanup(&mut self, world: &mut World) {
        self.inner.cleanup(world);
    }
}

/// Runs only on events of type `E` delivered since the previous tick
pub struct Reactive<E, F> {
    name: String,
    priority: i32,
    inbox: Inbox<E>,
    subscription: Option<Subscription>,
    func: F,
    _marker: PhantomData<fn(E)>,
}

impl<E, F> Reactive<E, F>
where
    E: Event + Clone,
    F: FnMut(&mut World, &mut CommandBuffer, Vec<E>) -> Result<()> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            inbox: Inbox::new(),
            subscription: None,
            func,
            _marker: PhantomData,
        }
    }

    /// Priority of the inbox handler on the event bus
    pub fn with_handler_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<E, F> System for Reactive<E, F>
where
    E: Event + Clone,
    F: FnMut(&mut World, &mut CommandBuffer, Vec<E>) -> Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, world: &mut World) -> Result<()> {
        if self.subscription.is_none() {
            self.subscription = Some(self.inbox.subscribe(world.events_mut(), self.priority));
        }
        Ok(())
    }

    fn update(
        &mut self,
        world: &mut World,
        commands: &mut CommandBuffer,
        _delta: Duration,
    ) -> Result<()> {
        let events = self.inbox.drain();
        if events.is_empty() {
            return Ok(());
        }
        (self.func)(world, commands, events)
    }

    fn cleanup(&mut self, world: &mut World) {
        if let Some(subscription) = self.subscription.take() {
            world.events_mut().unsubscribe(subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Position;
    struct Velocity;

    #[test]
    fn test_system_access_conflicts() {
        let a = SystemAccess::empty().writing::<i32>();
        let b = SystemAccess::empty().writing::<i32>();
        assert!(a.conflicts_with(&b));

        let reader = SystemAccess::empty().reading::<i32>();
        assert!(a.conflicts_with(&reader));
        assert!(reader.conflicts_with(&a));
    }

    #[test]
    fn test_system_access_no_conflicts() {
        let a = SystemAccess::empty().reading::<i32>();
        let b = SystemAccess::empty().reading::<i32>();
        assert!(a.can_run_parallel(&b));
    }

    #[test]
    fn test_access_from_query() {
        let access = SystemAccess::from_query::<(&mut Position, &Velocity)>();
        assert_eq!(access.writes, vec![TypeId::of::<Position>()]);
        assert_eq!(access.reads, vec![TypeId::of::<Velocity>()]);
    }

    #[test]
    fn test_merge_dedups() {
        let a = SystemAccess::empty().reading::<i32>();
        let b = SystemAccess::empty().reading::<i32>().writing::<u8>();
        let merged = a.merge(&b);
        assert_eq!(merged.reads.len(), 1);
        assert_eq!(merged.writes.len(), 1);
    }

    #[test]
    fn test_fixed_interval_runs_per_step() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let inner = FunctionSystem::new("physics", move |_, _, step| {
            assert_eq!(step, Duration::from_millis(10));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let mut fixed = FixedInterval::new(inner, Duration::from_millis(10)).with_max_steps(3);

        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        fixed.update(&mut world, &mut commands, Duration::from_millis(25)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // 5ms carried over + 100ms: 10 steps available, capped at 3
        fixed.update(&mut world, &mut commands, Duration::from_millis(100)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 5);
        assert_eq!(fixed.name(), "physics");
    }

    #[test]
    fn test_reactive_only_sees_new_events() {
        #[derive(Clone)]
        struct Ping(u32);

        let seen = Arc::new(AtomicU32::new(0));
        let sink = seen.clone();
        let mut reactive = Reactive::new("pong", move |_, _, events: Vec<Ping>| {
            for ping in events {
                sink.fetch_add(ping.0, Ordering::SeqCst);
            }
            Ok(())
        });

        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        reactive.setup(&mut world).unwrap();
        assert_eq!(world.events().subscriber_count::<Ping>(), 1);

        world.emit(Ping(2));
        world.begin_tick();
        reactive.update(&mut world, &mut commands, Duration::ZERO).unwrap();
        reactive.update(&mut world, &mut commands, Duration::ZERO).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        reactive.cleanup(&mut world);
        assert_eq!(world.events().subscriber_count::<Ping>(), 0);
    }
}

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

//! System scheduler
//!
//! Systems run one after another in ascending priority order (registration
//! order breaks ties). A tick first lets the world deliver the events queued
//! during the previous tick, then runs every enabled system, applying its
//! command buffer before the next one starts.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use slotmap::{new_key_type, SlotMap};

use crate::command::CommandBuffer;
use crate::config::SchedulerConfig;
use crate::dependency::DependencyGraph;
use crate::error::{EcsError, Result};
use crate::profiling::{SystemProfiler, SystemTiming, TickReport};
use crate::system::{BoxedSystem, FixedInterval, System};
use crate::world::World;

new_key_type! {
    /// Handle of a registered system
    pub struct SystemId;
}

struct SystemEntry {
    system: BoxedSystem,
    priority: i32,
    enabled: bool,
}

/// One batch of the conflict-free execution plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub systems: Vec<SystemId>,
    pub names: Vec<String>,
}

/// Ordered, prioritised system runner
pub struct Scheduler {
    systems: SlotMap<SystemId, SystemEntry>,
    /// Execution order
    order: Vec<SystemId>,
    commands: CommandBuffer,
    profiler: SystemProfiler,
    last_report: Option<TickReport>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            systems: SlotMap::with_key(),
            order: Vec::new(),
            commands: CommandBuffer::with_capacity(64),
            profiler: SystemProfiler::new(),
            last_report: None,
            config,
        }
    }

    /// Register a system; its `setup` runs before this returns.
    ///
    /// Lower priorities run first; equal priorities keep registration order.
    /// A failing `setup` leaves the system unregistered.
    pub fn register<S: System + 'static>(
        &mut self,
        world: &mut World,
        system: S,
        priority: i32,
    ) -> Result<SystemId> {
        self.register_boxed(world, Box::new(system), priority)
    }

    pub fn register_boxed(
        &mut self,
        world: &mut World,
        mut system: BoxedSystem,
        priority: i32,
    ) -> Result<SystemId> {
        system.setup(world)?;
        tracing::debug!(system = system.name(), priority, "system registered");

        let id = self.systems.insert(SystemEntry {
            system,
            priority,
            enabled: true,
        });
        let systems = &self.systems;
        let pos = self
            .order
            .partition_point(|other| systems[*other].priority <= priority);
        self.order.insert(pos, id);
        Ok(id)
    }

    /// Wrap `system` in a [`FixedInterval`] using the configured catch-up cap
    pub fn fixed_interval<S: System>(&self, system: S, step: Duration) -> FixedInterval<S> {
        FixedInterval::new(system, step).with_max_steps(self.config.max_fixed_steps)
    }

    /// Remove a system after running its `cleanup`
    pub fn unregister(&mut self, world: &mut World, id: SystemId) -> Result<()> {
        let mut entry = self.systems.remove(id).ok_or(EcsError::SystemNotFound)?;
        self.order.retain(|other| *other != id);
        self.profiler.forget(id);
        entry.system.cleanup(world);
        tracing::debug!(system = entry.system.name(), "system unregistered");
        Ok(())
    }

    pub fn set_enabled(&mut self, id: SystemId, enabled: bool) -> Result<()> {
        let entry = self.systems.get_mut(id).ok_or(EcsError::SystemNotFound)?;
        entry.enabled = enabled;
        Ok(())
    }

    pub fn is_enabled(&self, id: SystemId) -> Option<bool> {
        self.systems.get(id).map(|entry| entry.enabled)
    }

    /// System names in execution order
    pub fn system_names(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|id| self.systems[*id].system.name())
            .collect()
    }

    /// Total number of registered systems
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    /// Report of the most recent tick, failed or not
    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    /// Consecutive batches of systems with non-conflicting declared access.
    ///
    /// Analysis only: `tick` always runs sequentially.
    pub fn parallel_plan(&self) -> Vec<PlannedStage> {
        let accesses: Vec<_> = self
            .order
            .iter()
            .map(|id| self.systems[*id].system.access())
            .collect();
        DependencyGraph::new(&accesses)
            .stages()
            .iter()
            .map(|stage| {
                let systems: Vec<SystemId> = stage
                    .system_indices
                    .iter()
                    .map(|&idx| self.order[idx])
                    .collect();
                let names = systems
                    .iter()
                    .map(|id| self.systems[*id].system.name().to_string())
                    .collect();
                PlannedStage { systems, names }
            })
            .collect()
    }

    /// Run one tick.
    ///
    /// On failure the failing system's commands are discarded, the report is
    /// still recorded, and no later system runs this tick.
    pub fn tick(&mut self, world: &mut World, delta: Duration) -> Result<TickReport> {
        #[cfg(feature = "profiling")]
        let _span = tracing::info_span!("scheduler.tick", systems = self.order.len()).entered();

        let started = Instant::now();
        let delivery = catch_unwind(AssertUnwindSafe(|| world.begin_tick()));
        let mut report = TickReport {
            tick: world.tick(),
            events_delivered: 0,
            system_timings: Vec::with_capacity(self.order.len()),
            total_time: Duration::ZERO,
        };
        match delivery {
            Ok(delivered) => report.events_delivered = delivered,
            Err(payload) => {
                let err = EcsError::HandlerPanicked {
                    message: panic_message(payload.as_ref()),
                };
                tracing::error!(error = %err, tick = report.tick, "tick aborted");
                report.total_time = started.elapsed();
                self.last_report = Some(report);
                return Err(err);
            }
        }

        for idx in 0..self.order.len() {
            let id = self.order[idx];
            let Some(entry) = self.systems.get_mut(id) else {
                continue;
            };
            if !entry.enabled {
                continue;
            }

            #[cfg(feature = "profiling")]
            let _system_span = tracing::info_span!("system", name = entry.system.name()).entered();

            let commands = &mut self.commands;
            let system_started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                entry.system.update(world, commands, delta)
            }));
            let elapsed = system_started.elapsed();

            self.profiler.record_execution(id, elapsed);
            report.system_timings.push(SystemTiming {
                name: entry.system.name().to_string(),
                duration: elapsed,
            });

            let failure = match outcome {
                Ok(Ok(())) => self.commands.apply(world).err().map(|source| {
                    EcsError::SystemFailed {
                        system: entry.system.name().to_string(),
                        source: Box::new(source),
                    }
                }),
                Ok(Err(source)) => {
                    self.commands.clear();
                    Some(EcsError::SystemFailed {
                        system: entry.system.name().to_string(),
                        source: Box::new(source),
                    })
                }
                Err(payload) => {
                    self.commands.clear();
                    Some(EcsError::SystemPanicked {
                        system: entry.system.name().to_string(),
                        message: panic_message(payload.as_ref()),
                    })
                }
            };

            if let Some(err) = failure {
                tracing::error!(error = %err, tick = report.tick, "tick aborted");
                report.total_time = started.elapsed();
                self.last_report = Some(report);
                return Err(err);
            }
        }

        report.total_time = started.elapsed();
        self.last_report = Some(report.clone());
        Ok(report)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

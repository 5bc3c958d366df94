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

//! Profiling support
//!
//! Per-system timings are always collected by the scheduler into a
//! [`SystemProfiler`] and a [`TickReport`]. With the `profiling` feature the
//! hot paths also open `tracing` spans (`world.spawn`, `world.query_iter`,
//! `event_bus.process`, `scheduler.tick`, one per system); install a
//! subscriber to collect them:
//!
//! ```ignore
//! let _guard = archetype_runtime::profiling::init_json_tracing("logs", "trace.json")?;
//! ```
//!
//! Profile in release mode for accurate numbers, and use `RUST_LOG=debug`
//! to see archetype creation and query cache misses.

use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::schedule::SystemId;

/// Aggregated timings of one system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemStats {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub call_count: u64,
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    min: Duration,
    max: Duration,
    total: Duration,
    calls: u64,
}

/// System profiler for collecting timing data
#[derive(Debug, Default)]
pub struct SystemProfiler {
    timings: FxHashMap<SystemId, Accumulator>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_execution(&mut self, id: SystemId, duration: Duration) {
        self.timings
            .entry(id)
            .and_modify(|acc| {
                acc.min = acc.min.min(duration);
                acc.max = acc.max.max(duration);
                acc.total += duration;
                acc.calls += 1;
            })
            .or_insert(Accumulator {
                min: duration,
                max: duration,
                total: duration,
                calls: 1,
            });
    }

    pub fn get_stats(&self, id: SystemId) -> Option<SystemStats> {
        let acc = self.timings.get(&id)?;
        Some(SystemStats {
            min: acc.min,
            max: acc.max,
            avg: acc.total / acc.calls.max(1) as u32,
            call_count: acc.calls,
        })
    }

    pub(crate) fn forget(&mut self, id: SystemId) {
        self.timings.remove(&id);
    }

    pub fn clear(&mut self) {
        self.timings.clear();
    }
}

/// Per-system timing data for a single tick
#[derive(Debug, Clone)]
pub struct SystemTiming {
    pub name: String,
    pub duration: Duration,
}

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// World tick number
    pub tick: u64,
    /// Events delivered at the start of the tick
    pub events_delivered: usize,
    /// Systems that ran, in order; a failed tick ends with the failing one
    pub system_timings: Vec<SystemTiming>,
    pub total_time: Duration,
}

impl TickReport {
    /// Slowest system of the tick
    pub fn slowest(&self) -> Option<&SystemTiming> {
        self.system_timings.iter().max_by_key(|timing| timing.duration)
    }
}

/// Install a JSON `tracing` subscriber writing to `directory/file_name`.
///
/// Keep the returned guard alive for as long as events should be flushed.
/// The filter comes from `RUST_LOG`, defaulting to `info`.
#[cfg(feature = "profiling")]
pub fn init_json_tracing(
    directory: impl AsRef<std::path::Path>,
    file_name: &str,
) -> crate::error::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| crate::error::EcsError::Config(format!("tracing init failed: {e}")))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_profiler_stats() {
        let mut ids: SlotMap<SystemId, ()> = SlotMap::with_key();
        let id = ids.insert(());

        let mut profiler = SystemProfiler::new();
        assert!(profiler.get_stats(id).is_none());

        profiler.record_execution(id, Duration::from_micros(10));
        profiler.record_execution(id, Duration::from_micros(30));
        let stats = profiler.get_stats(id).unwrap();
        assert_eq!(stats.min, Duration::from_micros(10));
        assert_eq!(stats.max, Duration::from_micros(30));
        assert_eq!(stats.avg, Duration::from_micros(20));
        assert_eq!(stats.call_count, 2);

        profiler.clear();
        assert!(profiler.get_stats(id).is_none());
    }

    #[test]
    fn test_slowest() {
        let report = TickReport {
            system_timings: vec![
                SystemTiming {
                    name: "a".into(),
                    duration: Duration::from_micros(5),
                },
                SystemTiming {
                    name: "b".into(),
                    duration: Duration::from_micros(50),
                },
            ],
            ..TickReport::default()
        };
        assert_eq!(report.slowest().map(|t| t.name.as_str()), Some("b"));
    }
}

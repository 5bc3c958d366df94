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

//! Ready-made subscribers

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{Envelope, Event};
use crate::event_bus::{EventBus, Subscription};

/// Shared buffer collecting delivered events for later draining.
///
/// Handlers have no world access, so a system that reacts to events
/// subscribes an inbox and drains it from its own `update`.
pub struct Inbox<E> {
    buffer: Arc<Mutex<Vec<E>>>,
}

impl<E: Event + Clone> Inbox<E> {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handler that clones each delivered payload into this inbox
    pub fn handler(&self) -> impl FnMut(&mut Envelope<E>) + Send + Sync + 'static {
        let buffer = Arc::clone(&self.buffer);
        move |envelope| buffer.lock().push(envelope.payload().clone())
    }

    /// Subscribe this inbox to `bus`
    pub fn subscribe(&self, bus: &mut EventBus, priority: i32) -> Subscription {
        bus.subscribe_with_priority::<E, _>(priority, self.handler())
    }

    /// Take every event received so far, oldest first
    pub fn drain(&self) -> Vec<E> {
        std::mem::take(&mut *self.buffer.lock())
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl<E: Event + Clone> Default for Inbox<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Inbox<E> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Handler that traces every delivered event
pub fn logging_handler<E: Event + Debug>(
    label: &'static str,
) -> impl FnMut(&mut Envelope<E>) + Send + Sync + 'static {
    move |envelope| {
        tracing::trace!(
            subscriber = label,
            emitted_at = envelope.emitted_at(),
            event = ?envelope.payload(),
            "event delivered"
        );
    }
}

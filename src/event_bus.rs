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

//! Deferred, typed publish/subscribe
//!
//! `emit` never runs handlers. Events wait in a per-type queue until the
//! next [`EventBus::process`], which swaps every queue into its processing
//! buffer first, so anything emitted while processing waits for the call
//! after. Events are dispatched in global emission order; within one event,
//! handlers run from highest to lowest priority until one cancels it.

use std::any::{Any, TypeId};
use std::collections::VecDeque;

use ahash::AHashMap;
use slotmap::{new_key_type, SlotMap};

use crate::event::{Envelope, Event, EventStats};

new_key_type! {
    /// Key of a registered handler
    struct SubscriptionKey;
}

/// Token returned by `subscribe`; pass it to `unsubscribe` to remove the
/// handler. Tokens of removed handlers are detected as stale.
#[must_use = "dropping the token makes the handler impossible to unsubscribe"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    key: SubscriptionKey,
}

type Handler<E> = Box<dyn FnMut(&mut Envelope<E>) + Send + Sync>;

struct HandlerEntry<E> {
    key: SubscriptionKey,
    priority: i32,
    handler: Handler<E>,
}

/// Trait representing a type-erased event channel
trait EventChannel: Any + Send + Sync {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Move queued events into the processing buffer
    fn swap_buffers(&mut self);
    /// Dispatch the oldest event of the processing buffer; `Some(cancelled)`
    fn dispatch_next(&mut self) -> Option<bool>;
    fn remove_handler(&mut self, key: SubscriptionKey) -> bool;
    /// Drop whatever a panicking handler left undelivered
    fn discard_processing(&mut self);
    fn pending(&self) -> usize;
    fn handler_count(&self) -> usize;
    fn clear(&mut self);
}

/// Queues and handlers for one event type
struct TypedChannel<E: Event> {
    next: VecDeque<Envelope<E>>,
    processing: VecDeque<Envelope<E>>,
    handlers: Vec<HandlerEntry<E>>,
}

impl<E: Event> TypedChannel<E> {
    fn new() -> Self {
        Self {
            next: VecDeque::new(),
            processing: VecDeque::new(),
            handlers: Vec::new(),
        }
    }

    fn insert_handler(&mut self, entry: HandlerEntry<E>) {
        // After every handler of equal or higher priority
        let pos = self
            .handlers
            .partition_point(|existing| existing.priority >= entry.priority);
        self.handlers.insert(pos, entry);
    }
}

impl<E: Event> EventChannel for TypedChannel<E> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn swap_buffers(&mut self) {
        debug_assert!(self.processing.is_empty());
        std::mem::swap(&mut self.next, &mut self.processing);
    }

    fn dispatch_next(&mut self) -> Option<bool> {
        let mut envelope = self.processing.pop_front()?;
        for entry in &mut self.handlers {
            (entry.handler)(&mut envelope);
            if envelope.is_cancelled() {
                break;
            }
        }
        Some(envelope.is_cancelled())
    }

    fn remove_handler(&mut self, key: SubscriptionKey) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|entry| entry.key != key);
        self.handlers.len() != before
    }

    fn discard_processing(&mut self) {
        self.processing.clear();
    }

    fn pending(&self) -> usize {
        self.next.len()
    }

    fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn clear(&mut self) {
        self.next.clear();
        self.processing.clear();
    }
}

struct ProcessGuard<'a> {
    bus: &'a mut EventBus,
}

impl Drop for ProcessGuard<'_> {
    fn drop(&mut self) {
        self.bus.processing_order.clear();
        for channel in &mut self.bus.channels {
            channel.discard_processing();
        }
    }
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    channels: Vec<Box<dyn EventChannel>>,
    channel_index: AHashMap<TypeId, usize>,
    subscriptions: SlotMap<SubscriptionKey, usize>,
    /// Channel of every queued event, in emission order
    emission_order: Vec<usize>,
    /// Reused buffer for the batch being processed
    processing_order: Vec<usize>,
    frame: u64,
    stats: EventStats,
}

impl EventBus {
    /// Create new event bus
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            channel_index: AHashMap::new(),
            subscriptions: SlotMap::with_key(),
            emission_order: Vec::new(),
            processing_order: Vec::new(),
            frame: 0,
            stats: EventStats::default(),
        }
    }

    fn channel_slot<E: Event>(&mut self) -> usize {
        let channels = &mut self.channels;
        *self
            .channel_index
            .entry(TypeId::of::<E>())
            .or_insert_with(|| {
                channels.push(Box::new(TypedChannel::<E>::new()));
                channels.len() - 1
            })
    }

    fn channel_mut<E: Event>(&mut self, slot: usize) -> &mut TypedChannel<E> {
        match self.channels[slot].as_any_mut().downcast_mut::<TypedChannel<E>>() {
            Some(channel) => channel,
            None => unreachable!(
                "event channel {slot} does not hold {}",
                std::any::type_name::<E>()
            ),
        }
    }

    /// Queue an event for the next `process` call
    pub fn emit<E: Event>(&mut self, event: E) {
        let slot = self.channel_slot::<E>();
        let frame = self.frame;
        self.channel_mut::<E>(slot)
            .next
            .push_back(Envelope::new(event, frame));
        self.emission_order.push(slot);
        self.stats.emitted += 1;
    }

    /// Subscribe a handler at priority 0
    pub fn subscribe<E, F>(&mut self, handler: F) -> Subscription
    where
        E: Event,
        F: FnMut(&mut Envelope<E>) + Send + Sync + 'static,
    {
        self.subscribe_with_priority(0, handler)
    }

    /// Subscribe a handler; higher priorities run first, ties in
    /// subscription order
    pub fn subscribe_with_priority<E, F>(&mut self, priority: i32, handler: F) -> Subscription
    where
        E: Event,
        F: FnMut(&mut Envelope<E>) + Send + Sync + 'static,
    {
        let slot = self.channel_slot::<E>();
        let key = self.subscriptions.insert(slot);
        self.channel_mut::<E>(slot).insert_handler(HandlerEntry {
            key,
            priority,
            handler: Box::new(handler),
        });
        Subscription { key }
    }

    /// Remove a handler. Returns false for stale tokens.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        match self.subscriptions.remove(subscription.key) {
            Some(slot) => self.channels[slot].remove_handler(subscription.key),
            None => false,
        }
    }

    /// Deliver every event queued before this call.
    ///
    /// Returns the number of events processed.
    pub fn process(&mut self) -> usize {
        #[cfg(feature = "profiling")]
        let _span = tracing::info_span!("event_bus.process", queued = self.emission_order.len())
            .entered();

        std::mem::swap(&mut self.emission_order, &mut self.processing_order);
        for channel in &mut self.channels {
            channel.swap_buffers();
        }
        self.frame += 1;

        // Resets the batch even if a handler unwinds
        let mut guard = ProcessGuard { bus: self };
        let bus = &mut *guard.bus;
        let mut processed = 0;
        for idx in 0..bus.processing_order.len() {
            let slot = bus.processing_order[idx];
            if let Some(cancelled) = bus.channels[slot].dispatch_next() {
                processed += 1;
                if cancelled {
                    bus.stats.cancelled += 1;
                } else {
                    bus.stats.delivered += 1;
                }
            }
        }
        processed
    }

    /// Events waiting for the next `process`
    pub fn pending(&self) -> usize {
        self.emission_order.len()
    }

    /// Events of type `E` waiting for the next `process`
    pub fn pending_of<E: Event>(&self) -> usize {
        self.channel_index
            .get(&TypeId::of::<E>())
            .map(|&slot| self.channels[slot].pending())
            .unwrap_or(0)
    }

    /// Number of `process` calls so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn stats(&self) -> EventStats {
        self.stats
    }

    /// Get subscriber count for event type
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.channel_index
            .get(&TypeId::of::<E>())
            .map(|&slot| self.channels[slot].handler_count())
            .unwrap_or(0)
    }

    /// Drop every queued event without delivering it
    pub fn clear_queue(&mut self) {
        for channel in &mut self.channels {
            channel.clear();
        }
        self.emission_order.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    struct Damage(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Heal(u32);

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (log.clone(), log)
    }

    #[test]
    fn test_emit_is_deferred() {
        let mut bus = EventBus::new();
        let (log, seen) = recorder();
        let _sub = bus.subscribe::<Damage, _>(move |e| {
            log.lock().unwrap().push(format!("dmg {}", e.payload().0));
        });

        bus.emit(Damage(5));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(bus.pending(), 1);

        assert_eq!(bus.process(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["dmg 5"]);
        assert_eq!(bus.process(), 0);
    }

    #[test]
    fn test_priority_order_and_cancellation() {
        let mut bus = EventBus::new();
        let (log, seen) = recorder();

        let low = log.clone();
        let _a = bus.subscribe_with_priority::<Damage, _>(-1, move |_| {
            low.lock().unwrap().push("low".into());
        });
        let high = log.clone();
        let _b = bus.subscribe_with_priority::<Damage, _>(10, move |e| {
            high.lock().unwrap().push("high".into());
            if e.payload().0 == 0 {
                e.cancel();
            }
        });
        let mid = log;
        let _c = bus.subscribe::<Damage, _>(move |_| {
            mid.lock().unwrap().push("mid".into());
        });

        bus.emit(Damage(1));
        bus.emit(Damage(0));
        bus.process();

        assert_eq!(*seen.lock().unwrap(), vec!["high", "mid", "low", "high"]);
        let stats = bus.stats();
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.cancelled, 1);
    }

    #[test]
    fn test_equal_priority_keeps_subscription_order() {
        let mut bus = EventBus::new();
        let (log, seen) = recorder();
        for name in ["first", "second", "third"] {
            let log = log.clone();
            let _ = bus.subscribe::<Damage, _>(move |_| log.lock().unwrap().push(name.into()));
        }
        bus.emit(Damage(1));
        bus.process();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_global_emission_order_across_types() {
        let mut bus = EventBus::new();
        let (log, seen) = recorder();
        let dmg_log = log.clone();
        let _d = bus.subscribe::<Damage, _>(move |e| {
            dmg_log.lock().unwrap().push(format!("d{}", e.payload().0))
        });
        let _h = bus.subscribe::<Heal, _>(move |e| {
            log.lock().unwrap().push(format!("h{}", e.payload().0))
        });

        bus.emit(Damage(1));
        bus.emit(Heal(2));
        bus.emit(Damage(3));
        bus.process();
        assert_eq!(*seen.lock().unwrap(), vec!["d1", "h2", "d3"]);
    }

    #[test]
    fn test_unsubscribe_and_stale_token() {
        let mut bus = EventBus::new();
        let (log, seen) = recorder();
        let sub = bus.subscribe::<Damage, _>(move |_| log.lock().unwrap().push("x".into()));
        assert_eq!(bus.subscriber_count::<Damage>(), 1);

        assert!(bus.unsubscribe(sub));
        assert!(!bus.unsubscribe(sub));
        assert_eq!(bus.subscriber_count::<Damage>(), 0);

        bus.emit(Damage(1));
        assert_eq!(bus.process(), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_emitted_at_is_frame() {
        let mut bus = EventBus::new();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = frames.clone();
        let _s = bus.subscribe::<Heal, _>(move |e| sink.lock().unwrap().push(e.emitted_at()));

        bus.emit(Heal(1));
        bus.process();
        bus.emit(Heal(1));
        bus.process();
        assert_eq!(*frames.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_clear_queue_drops_pending() {
        let mut bus = EventBus::new();
        bus.emit(Damage(1));
        bus.emit(Heal(1));
        assert_eq!(bus.pending_of::<Damage>(), 1);
        bus.clear_queue();
        assert_eq!(bus.pending(), 0);
        assert_eq!(bus.process(), 0);
    }

    #[test]
    fn test_bus_recovers_after_handler_panic() {
        let mut bus = EventBus::new();
        let (log, seen) = recorder();
        let _sub = bus.subscribe::<Damage, _>(move |env| {
            if env.payload().0 == 1 {
                panic!("bad damage");
            }
            log.lock().unwrap().push(format!("damage {}", env.payload().0));
        });

        bus.emit(Damage(1));
        bus.emit(Damage(2));
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| bus.process()));
        assert!(outcome.is_err());

        // The rest of the failed batch is dropped, later events flow normally
        bus.emit(Damage(3));
        assert_eq!(bus.pending(), 1);
        assert_eq!(bus.process(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["damage 3".to_string()]);
        assert_eq!(bus.pending(), 0);
    }
}

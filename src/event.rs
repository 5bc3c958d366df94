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

//! Event payloads and delivery envelopes

/// Marker trait for events
///
/// Any `'static + Send + Sync` value can be emitted.
pub trait Event: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Event for T {}

/// An event in flight, as seen by handlers
#[derive(Debug, Clone)]
pub struct Envelope<E> {
    payload: E,
    emitted_at: u64,
    cancelled: bool,
}

impl<E> Envelope<E> {
    pub(crate) fn new(payload: E, emitted_at: u64) -> Self {
        Self {
            payload,
            emitted_at,
            cancelled: false,
        }
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    /// Bus frame during which the event was emitted
    pub fn emitted_at(&self) -> u64 {
        self.emitted_at
    }

    /// Stop delivery to lower-priority handlers
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    /// Events queued with `emit`
    pub emitted: u64,
    /// Events that reached every handler
    pub delivered: u64,
    /// Events stopped by a handler
    pub cancelled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_sticky() {
        let mut envelope = Envelope::new("hit", 3);
        assert!(!envelope.is_cancelled());
        envelope.cancel();
        envelope.cancel();
        assert!(envelope.is_cancelled());
        assert_eq!(envelope.emitted_at(), 3);
        assert_eq!(envelope.into_payload(), "hit");
    }
}

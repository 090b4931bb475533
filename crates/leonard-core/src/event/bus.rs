// Copyright 2025 eraflo
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

/// A thread-safe broadcast point for one event type.
///
/// The scheduler publishes on it after each committed tick and the owner of
/// the bus drains it. Consumers that may fall behind, e.g. an embedder that
/// never calls [`EventBus::drain`], should use a [`EventBus::bounded`] bus: once
/// it is full, publishing drops the oldest waiting event instead of growing.
#[derive(Debug)]
pub struct EventBus<T: Clone + Send + Sync + 'static> {
    sender: flume::Sender<T>,
    receiver: flume::Receiver<T>,
    capacity: Option<usize>,
}

impl<T: Clone + Send + Sync + 'static> EventBus<T> {
    /// Creates a new bus with an unbounded channel.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            capacity: None,
        }
    }

    /// Creates a bus that keeps at most `capacity` waiting events.
    ///
    /// A capacity of zero is raised to one.
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = flume::bounded(capacity);
        Self {
            sender,
            receiver,
            capacity: Some(capacity),
        }
    }

    /// The maximum number of waiting events, `None` if unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Sends an event without blocking.
    ///
    /// On a full bounded bus the oldest waiting events are discarded to make
    /// room. Returns how many were discarded.
    pub fn publish(&self, event: T) -> usize {
        let mut dropped = 0;
        let mut event = event;
        loop {
            match self.sender.try_send(event) {
                Ok(()) => return dropped,
                Err(flume::TrySendError::Full(rejected)) => {
                    if self.receiver.try_recv().is_ok() {
                        dropped += 1;
                    }
                    event = rejected;
                }
                Err(flume::TrySendError::Disconnected(_)) => {
                    log::error!("Failed to publish event: receiver disconnected.");
                    return dropped;
                }
            }
        }
    }

    /// Returns a clone of the receiving end, for consumers on other threads.
    pub fn subscribe(&self) -> flume::Receiver<T> {
        self.receiver.clone()
    }

    /// Takes every event currently queued without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` if no event is waiting.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[derive(Debug, Clone, PartialEq)]
    enum TestEvent {
        Touched { a: u64, b: u64 },
        Separated,
    }

    #[test]
    fn event_bus_starts_empty() {
        let bus = EventBus::<TestEvent>::new();
        assert!(bus.is_empty());
        assert!(bus.drain().is_empty());
        assert_eq!(bus.capacity(), None);
    }

    #[test]
    fn drain_preserves_publish_order() {
        let bus = EventBus::<TestEvent>::new();
        bus.publish(TestEvent::Touched { a: 1, b: 2 });
        bus.publish(TestEvent::Separated);

        assert_eq!(bus.len(), 2);
        assert_eq!(
            bus.drain(),
            vec![TestEvent::Touched { a: 1, b: 2 }, TestEvent::Separated]
        );
        assert!(bus.is_empty());
    }

    #[test]
    fn subscriber_receives_from_thread() {
        let bus = std::sync::Arc::new(EventBus::<TestEvent>::new());
        let receiver = bus.subscribe();

        let publisher = std::sync::Arc::clone(&bus);
        let handle = thread::spawn(move || {
            publisher.publish(TestEvent::Separated);
        });

        let received = receiver
            .recv_timeout(Duration::from_secs(1))
            .expect("Failed to receive event from thread");
        assert_eq!(received, TestEvent::Separated);
        handle.join().expect("Thread join failed");
    }

    #[test]
    fn bounded_bus_drops_oldest_when_full() {
        let bus = EventBus::<TestEvent>::bounded(3);
        let mut dropped = 0;
        for a in 0..10 {
            dropped += bus.publish(TestEvent::Touched { a, b: a + 1 });
        }

        assert_eq!(dropped, 7);
        assert_eq!(bus.len(), 3);
        assert_eq!(
            bus.drain(),
            vec![
                TestEvent::Touched { a: 7, b: 8 },
                TestEvent::Touched { a: 8, b: 9 },
                TestEvent::Touched { a: 9, b: 10 },
            ]
        );
    }

    #[test]
    fn zero_capacity_still_keeps_the_latest_event() {
        let bus = EventBus::<TestEvent>::bounded(0);
        bus.publish(TestEvent::Touched { a: 1, b: 2 });
        bus.publish(TestEvent::Separated);
        assert_eq!(bus.capacity(), Some(1));
        assert_eq!(bus.drain(), vec![TestEvent::Separated]);
    }
}

//! Bounded FIFO of messages sent while the socket is not open.
//!
//! TRADE-OFFS
//! ==========
//! A long outage could otherwise grow the queue without limit. When the
//! queue is full the oldest entry is evicted, so a reconnect flushes the most
//! recent `capacity` messages in their original order.

use std::collections::VecDeque;

use crate::net::types::OutboundMessage;

#[derive(Debug, Clone)]
pub struct OutboundQueue {
    items: VecDeque<OutboundMessage>,
    capacity: usize,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { items: VecDeque::with_capacity(capacity.min(64)), capacity }
    }

    /// Append at the tail. Returns the evicted head when the queue was full.
    pub fn push(&mut self, message: OutboundMessage) -> Option<OutboundMessage> {
        let evicted = if self.items.len() >= self.capacity { self.items.pop_front() } else { None };
        self.items.push_back(message);
        evicted
    }

    /// Remove every queued message, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = OutboundMessage> + '_ {
        self.items.drain(..)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;

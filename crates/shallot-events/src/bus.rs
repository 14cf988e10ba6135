//! Typed broadcast bus.

use crate::subscribers::{Subscribers, Subscription};
use std::fmt;
use tracing::debug;

/// Broadcast channel for shell-wide events.
///
/// Publishing is fire-and-forget: the publisher learns how many receivers
/// handled the event but never waits for an acknowledgment.
pub struct EventBus<E> {
    subscribers: Subscribers<E>,
}

impl<E: fmt::Debug + 'static> EventBus<E> {
    /// Create a bus with no receivers.
    pub fn new() -> Self {
        Self {
            subscribers: Subscribers::new(),
        }
    }

    /// Register a receiver for every event published on this bus.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    /// Publish an event to all current receivers.
    ///
    /// Returns the number of receivers that handled it without panicking.
    pub fn publish(&self, event: E) -> usize {
        let delivered = self.subscribers.notify(&event);
        debug!("Published {:?} to {} receiver(s)", event, delivered);
        delivered
    }

    /// Number of registered receivers.
    pub fn receiver_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<E: fmt::Debug + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

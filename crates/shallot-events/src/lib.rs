//! Shallot Events
//!
//! In-process publish/subscribe primitives shared by the session core:
//! - `Subscribers`: multi-listener fan-out with per-listener panic isolation
//! - `Subscription`: handle returned by every `subscribe`, unsubscribes on drop
//! - `EventBus`: typed broadcast channel for shell-wide events
//!
//! Delivery is synchronous on the publisher's thread. Listeners are invoked
//! from a snapshot taken after the registry lock is released, so a listener
//! may subscribe or unsubscribe while it is being called.

mod bus;
mod subscribers;

pub use bus::EventBus;
pub use subscribers::{Subscribers, Subscription};

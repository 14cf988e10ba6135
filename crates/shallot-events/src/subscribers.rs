//! Listener registry with panic isolation.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, error};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Listener<T>>>,
}

impl<T> Registry<T> {
    fn remove(&self, id: u64) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if listeners.remove(&id).is_some() {
            debug!("Listener {} unsubscribed", id);
        }
    }
}

/// A set of listeners that all receive every notified value.
///
/// Cloning a `Subscribers` yields another handle to the same registry.
pub struct Subscribers<T> {
    inner: Arc<Registry<T>>,
}

impl<T: 'static> Subscribers<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Register a listener.
    ///
    /// The listener stays registered until the returned `Subscription` is
    /// dropped or explicitly unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));

        let registry: Weak<Registry<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(id);
            }
        })
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `value` to every listener.
    ///
    /// A panicking listener is logged and skipped; the remaining listeners
    /// still receive the value. Returns the number of listeners that
    /// completed without panicking.
    pub fn notify(&self, value: &T) -> usize {
        let snapshot: Vec<(u64, Listener<T>)> = {
            let listeners = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.iter().map(|(id, l)| (*id, l.clone())).collect()
        };

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(value))) {
                Ok(()) => delivered += 1,
                Err(panic_info) => {
                    let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    error!("Listener {} panicked: {}", id, msg);
                }
            }
        }
        delivered
    }
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Subscribers<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("Subscribers").field("listeners", &count).finish()
    }
}

/// Handle to a registered listener.
///
/// Dropping the handle unsubscribes. Use [`Subscription::detach`] to keep the
/// listener registered for the lifetime of the publisher.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Build a subscription from an unsubscribe action.
    ///
    /// External push sources use this to hand out handles for their own
    /// registration mechanism.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Leave the listener registered and discard the handle.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

//! Observable proxy status.

use crate::signal::{SignalHandler, StatusSignalSource};
use crate::status::ProxyStatus;
use shallot_events::{Subscribers, Subscription};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tracing::{debug, info};

struct MonitorInner {
    status: RwLock<ProxyStatus>,
    /// Held from the status write through fan-out so listeners see updates
    /// in the order they were applied. Readers never take it.
    apply: Mutex<()>,
    listeners: Subscribers<ProxyStatus>,
    source: Mutex<Option<Subscription>>,
}

impl MonitorInner {
    fn handle_signal(&self, label: &str) -> ProxyStatus {
        let status = ProxyStatus::from_label(label);
        let _apply = self.apply.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = {
            let mut current = self.status.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, status)
        };

        if previous != status {
            info!("Proxy status: {} -> {}", previous, status);
        } else {
            debug!("Proxy status unchanged: {}", status);
        }
        if status == ProxyStatus::Unknown && !label.trim().eq_ignore_ascii_case("UNKNOWN") {
            debug!("Unrecognized status label '{}'", label);
        }

        self.listeners.notify(&status);
        status
    }
}

/// Tracks the proxy lifecycle as reported by external signals.
///
/// The status only changes when a signal arrives; silence never downgrades
/// it. Every signal is forwarded to subscribers, repeated values included.
#[derive(Clone)]
pub struct ProxyStatusMonitor {
    inner: Arc<MonitorInner>,
}

impl ProxyStatusMonitor {
    /// New monitor in the `Unknown` state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                status: RwLock::new(ProxyStatus::Unknown),
                apply: Mutex::new(()),
                listeners: Subscribers::new(),
                source: Mutex::new(None),
            }),
        }
    }

    pub fn current(&self) -> ProxyStatus {
        *self.inner.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Observe every status update.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ProxyStatus) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(listener)
    }

    /// Apply a raw status label. The new status is visible through
    /// [`current`](Self::current) before any listener runs.
    ///
    /// Listeners must not call back into `handle_signal`.
    pub fn handle_signal(&self, label: &str) -> ProxyStatus {
        self.inner.handle_signal(label)
    }

    /// Feed this monitor from `source`, replacing any previous source.
    pub fn attach(&self, source: &dyn StatusSignalSource) {
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let handler: SignalHandler = Arc::new(move |label: &str| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_signal(label);
            }
        });

        let subscription = source.subscribe(handler);
        let previous = self
            .inner
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(subscription);
        drop(previous);
        debug!("Status monitor attached to signal source");
    }

    /// Stop listening to the attached source. The last status is kept.
    pub fn detach(&self) {
        let previous = self
            .inner
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            debug!("Status monitor detached");
        }
    }
}

impl Default for ProxyStatusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProxyStatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyStatusMonitor")
            .field("status", &self.current())
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

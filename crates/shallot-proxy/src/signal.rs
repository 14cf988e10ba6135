//! External status signal sources.
//!
//! The proxy app reports its lifecycle as raw string labels ("ON",
//! "STARTING", ...). A [`StatusSignalSource`] is anything that can push those
//! labels to a handler.

use crossbeam_channel::{Receiver, Sender};
use shallot_events::{Subscribers, Subscription};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::{debug, warn};

/// Callback receiving raw status labels
pub type SignalHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Push source of raw status labels.
pub trait StatusSignalSource: Send + Sync {
    /// Deliver every future label to `handler` until the subscription is
    /// dropped.
    fn subscribe(&self, handler: SignalHandler) -> Subscription;
}

/// Source that never emits. Used where the platform has no signal channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSignalSource;

impl StatusSignalSource for NullSignalSource {
    fn subscribe(&self, _handler: SignalHandler) -> Subscription {
        Subscription::noop()
    }
}

/// Source fed by a crossbeam channel.
///
/// A named pump thread drains the channel and fans each label out to the
/// subscribed handlers. The thread exits once every sender is dropped.
pub struct ChannelSignalSource {
    handlers: Subscribers<String>,
    pump: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ChannelSignalSource {
    /// Start pumping labels from `rx`.
    pub fn new(rx: Receiver<String>) -> io::Result<Self> {
        let handlers: Subscribers<String> = Subscribers::new();
        let fan_out = handlers.clone();

        let pump = thread::Builder::new()
            .name("proxy-status-pump".to_string())
            .spawn(move || {
                debug!("Status pump started");
                for label in rx.iter() {
                    let delivered = fan_out.notify(&label);
                    debug!("Status signal '{}' delivered to {} handler(s)", label, delivered);
                }
                debug!("Status pump stopped");
            })?;

        Ok(Self {
            handlers,
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Create a source together with the sender that feeds it.
    pub fn channel() -> io::Result<(Sender<String>, Self)> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Ok((tx, Self::new(rx)?))
    }

    /// Block until every sender is gone and all queued labels were delivered.
    pub fn join(&self) {
        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pump) = pump {
            if pump.join().is_err() {
                warn!("Status pump thread panicked");
            }
        }
    }
}

impl StatusSignalSource for ChannelSignalSource {
    fn subscribe(&self, handler: SignalHandler) -> Subscription {
        self.handlers.subscribe(move |label: &String| handler(label))
    }
}

impl std::fmt::Debug for ChannelSignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSignalSource")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_source_delivers_in_order() {
        let (tx, source) = ChannelSignalSource::channel().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let _sub = source.subscribe(Arc::new(move |label: &str| {
            s.lock().unwrap().push(label.to_string());
        }));

        tx.send("STARTING".into()).unwrap();
        tx.send("ON".into()).unwrap();
        drop(tx);
        source.join();

        assert_eq!(*seen.lock().unwrap(), vec!["STARTING", "ON"]);
    }

    #[test]
    fn test_dropped_subscription_stops_delivery() {
        let (tx, source) = ChannelSignalSource::channel().unwrap();
        let seen = Arc::new(Mutex::new(0usize));

        let s = seen.clone();
        let sub = source.subscribe(Arc::new(move |_: &str| {
            *s.lock().unwrap() += 1;
        }));
        drop(sub);

        tx.send("ON".into()).unwrap();
        drop(tx);
        source.join();
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn test_null_source_is_silent() {
        let sub = NullSignalSource.subscribe(Arc::new(|_: &str| panic!("unexpected signal")));
        sub.unsubscribe();
    }
}

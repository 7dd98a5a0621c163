//! Push-style observables with per-subscriber queues.
//!
//! Two flavours:
//! - [`Observable`] holds a current value. New subscribers receive it
//!   immediately, then every later update in publish order.
//! - [`EventFeed`] is a discrete feed. Each item reaches the subscribers that
//!   exist when it is published, exactly once. Nothing is replayed.
//!
//! Every subscriber owns an unbounded queue, so a slow consumer never causes
//! another subscriber to miss an update and publishing never blocks.

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

/// Receiving half of an [`Observable`] or [`EventFeed`] subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next update. `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next queued update, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// All updates queued so far.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            out.push(item);
        }
        out
    }

    /// Consume the subscription as a `futures::Stream`.
    pub fn into_stream(self) -> UnboundedReceiverStream<T> {
        UnboundedReceiverStream::new(self.rx)
    }
}

/// Fan-out list shared by both observable flavours.
struct Subscribers<T> {
    senders: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone> Subscribers<T> {
    fn new() -> Self {
        Self {
            senders: Vec::new(),
        }
    }

    fn add(&mut self) -> (mpsc::UnboundedSender<T>, Subscription<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.push(tx.clone());
        (tx, Subscription { rx })
    }

    /// Deliver to every live subscriber, dropping the ones whose receiver is gone.
    fn publish(&mut self, item: &T) {
        let before = self.senders.len();
        self.senders.retain(|tx| tx.send(item.clone()).is_ok());
        let pruned = before - self.senders.len();
        if pruned > 0 {
            trace!(pruned, "dropped closed subscribers");
        }
    }

    fn len(&self) -> usize {
        self.senders.iter().filter(|tx| !tx.is_closed()).count()
    }
}

struct ObservableInner<T> {
    value: T,
    subscribers: Subscribers<T>,
}

/// A value with change notification.
pub struct Observable<T> {
    inner: Mutex<ObservableInner<T>>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Mutex::new(ObservableInner {
                value: initial,
                subscribers: Subscribers::new(),
            }),
        }
    }

    /// Replace the value and publish it.
    pub fn set(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.value = value;
        let ObservableInner { value, subscribers } = &mut *inner;
        subscribers.publish(value);
    }

    /// Subscribe. The current value is queued before any later update.
    pub fn subscribe(&self) -> Subscription<T> {
        let mut inner = self.inner.lock();
        let (tx, subscription) = inner.subscribers.add();
        // Holding the lock keeps a concurrent `set` from slipping in between.
        let _ = tx.send(inner.value.clone());
        subscription
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl<T: Clone + PartialEq> Observable<T> {
    /// Publish only when the value differs. Returns whether it changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.value == value {
            return false;
        }
        inner.value = value;
        let ObservableInner { value, subscribers } = &mut *inner;
        subscribers.publish(value);
        true
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("subscribers", &inner.subscribers.senders.len())
            .finish()
    }
}

/// Discrete event feed without replay.
pub struct EventFeed<T> {
    subscribers: Mutex<Subscribers<T>>,
}

impl<T: Clone> EventFeed<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Subscribers::new()),
        }
    }

    pub fn emit(&self, event: T) {
        self.subscribers.lock().publish(&event);
    }

    pub fn subscribe(&self) -> Subscription<T> {
        self.subscribers.lock().add().1
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T: Clone> Default for EventFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventFeed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFeed")
            .field("subscribers", &self.subscribers.lock().senders.len())
            .finish()
    }
}

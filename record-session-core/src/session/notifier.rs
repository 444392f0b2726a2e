//! Multi-observer event broadcaster.
//!
//! Contract: any number of [`Event::Next`], then exactly one of
//! [`Event::Error`] / [`Event::Completed`], then the stream is closed.
//! Every observer has its own unbounded channel, so a slow observer never
//! loses events and never slows down the publisher.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

/// One item of a notification stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<T, E> {
    Next(T),
    Error(E),
    Completed,
}

impl<T, E> Event<T, E> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Completed)
    }
}

struct Observers<T, E> {
    senders: Vec<(u64, Sender<Event<T, E>>)>,
    next_id: u64,
    closed: bool,
}

/// Broadcasts events to every current subscriber, in publish order.
pub struct Notifier<T, E> {
    observers: Mutex<Observers<T, E>>,
}

impl<T, E> Notifier<T, E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            observers: Mutex::new(Observers {
                senders: Vec::new(),
                next_id: 0,
                closed: false,
            }),
        })
    }

    /// Observe events published from now on. Earlier events are not replayed;
    /// subscribing to a closed notifier yields an exhausted subscription.
    pub fn subscribe(self: &Arc<Self>) -> Subscription<T, E> {
        let (tx, rx) = mpsc::channel();
        let mut observers = self.observers.lock();
        let id = observers.next_id;
        observers.next_id += 1;
        if !observers.closed {
            observers.senders.push((id, tx));
        }
        Subscription {
            id,
            rx,
            notifier: Arc::downgrade(self),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.observers.lock().closed
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().senders.len()
    }

    fn unsubscribe(&self, id: u64) {
        self.observers.lock().senders.retain(|(sid, _)| *sid != id);
    }
}

impl<T: Clone, E: Clone> Notifier<T, E> {
    /// Publish a data event. Returns `false` once the stream is closed.
    pub fn next(&self, value: T) -> bool {
        self.publish(Event::Next(value))
    }

    /// Terminate the stream with an error.
    pub fn error(&self, error: E) -> bool {
        self.publish(Event::Error(error))
    }

    /// Terminate the stream successfully.
    pub fn complete(&self) -> bool {
        self.publish(Event::Completed)
    }

    fn publish(&self, event: Event<T, E>) -> bool {
        let mut observers = self.observers.lock();
        if observers.closed {
            return false;
        }
        // Observers whose receiver is gone are dropped on the way.
        observers
            .senders
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());

        if event.is_terminal() {
            observers.closed = true;
            observers.senders.clear();
        }
        true
    }
}

/// Receiving end of one observer.
///
/// Dropping or disposing it stops delivery to this observer only.
pub struct Subscription<T, E> {
    id: u64,
    rx: Receiver<Event<T, E>>,
    notifier: Weak<Notifier<T, E>>,
}

impl<T, E> Subscription<T, E> {
    /// Block for the next event. `None` once the stream is closed and drained.
    pub fn recv(&self) -> Option<Event<T, E>> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event<T, E>, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Next event if one is already queued.
    pub fn try_recv(&self) -> Option<Event<T, E>> {
        self.rx.try_recv().ok()
    }

    /// Blocking iterator over the remaining events; ends after the terminal one.
    pub fn iter(&self) -> mpsc::Iter<'_, Event<T, E>> {
        self.rx.iter()
    }

    /// Stop observing.
    pub fn dispose(self) {}
}

impl<T, E> Drop for Subscription<T, E> {
    fn drop(&mut self) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.unsubscribe(self.id);
        }
    }
}

//! Optional subscriber slots for connection events.
//!
//! Each event has a single slot. Notifying an empty slot is a no-op. The
//! callback is cloned out of its slot before it runs, so a callback may
//! replace or clear subscriptions (or close the connection) without
//! deadlocking.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use streamframe_frame::Frame;

type MessageFn = dyn Fn(Frame) + Send + Sync;
type DisconnectFn = dyn Fn() + Send + Sync;

/// Subscriber slots for "a message arrived" and "the stream died".
#[derive(Default)]
pub struct Subscribers {
    message: Mutex<Option<Arc<MessageFn>>>,
    disconnected: Mutex<Option<Arc<DisconnectFn>>>,
}

impl Subscribers {
    /// Create empty slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to complete frames, replacing any previous subscriber.
    pub fn set_message<F>(&self, callback: F)
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        *lock(&self.message) = Some(Arc::new(callback));
    }

    /// Subscribe to the disconnect event, replacing any previous subscriber.
    pub fn set_disconnected<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *lock(&self.disconnected) = Some(Arc::new(callback));
    }

    /// Deliver a frame. Returns false when nobody is subscribed.
    pub fn notify_message(&self, frame: Frame) -> bool {
        let callback = lock(&self.message).clone();
        match callback {
            Some(callback) => {
                callback(frame);
                true
            }
            None => false,
        }
    }

    /// Deliver the disconnect event. Returns false when nobody is subscribed.
    pub fn notify_disconnected(&self) -> bool {
        let callback = lock(&self.disconnected).clone();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Drop both subscribers.
    ///
    /// Callbacks often capture a handle to their own connection; clearing the
    /// slots once the connection is down releases that cycle.
    pub fn clear(&self) {
        lock(&self.message).take();
        lock(&self.disconnected).take();
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("message", &lock(&self.message).is_some())
            .field("disconnected", &lock(&self.disconnected).is_some())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

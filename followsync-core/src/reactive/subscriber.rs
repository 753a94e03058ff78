//! Subscriber types for the reactive layer.
//!
//! A subscriber is any consumer that wants to hear about changes: a follow
//! button bound to one author, a feed view re-rendering its rows, a test
//! probe. Subscriptions are released by dropping their [`Subscription`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered notification callback for events of type `E`.
///
/// The callback is shared behind an `Arc` so a notifier can snapshot the
/// subscriber list, release its locks, and then invoke callbacks that are
/// free to read back into the structure that notified them.
pub struct Subscriber<E: ?Sized> {
    id: SubscriberId,
    notify: Arc<dyn Fn(&E) + Send + Sync>,
}

impl<E: ?Sized> Subscriber<E> {
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Arc::new(notify),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn notify(&self, event: &E) {
        (self.notify)(event);
    }
}

impl<E: ?Sized> Clone for Subscriber<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            notify: Arc::clone(&self.notify),
        }
    }
}

impl<E: ?Sized> fmt::Debug for Subscriber<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

/// Handle to a live subscription.
///
/// Dropping the handle unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriberId,
    release: Option<Box<dyn FnOnce(SubscriberId) + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new<F>(id: SubscriberId, release: F) -> Self
    where
        F: FnOnce(SubscriberId) + Send + Sync + 'static,
    {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

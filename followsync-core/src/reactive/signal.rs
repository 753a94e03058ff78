//! Signal Implementation
//!
//! A Signal holds one value and tells its subscribers whenever the value is
//! replaced. The feed controller keeps its posts, its viewer and its load
//! status in signals so a view can re-render on every change.
//!
//! # How Signals Work
//!
//! 1. `set` swaps the value under a write lock.
//!
//! 2. The lock is released, the subscriber list is snapshotted, and every
//!    subscriber is called with the new value before `set` returns.
//!
//! 3. Subscribers may read the signal again from inside their callback.
//!
//! # Thread Safety
//!
//! The value and the subscriber list sit behind `parking_lot` locks; clones
//! of a signal share both.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::subscriber::{Subscriber, SubscriberId, Subscription};

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

type Subscribers<T> = RwLock<Vec<Subscriber<T>>>;

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust
/// use followsync_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// let _sub = count.subscribe(|value| println!("count is {value}"));
///
/// count.set(5); // prints "count is 5"
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: u64,
    value: Arc<RwLock<T>>,
    subscribers: Arc<Subscribers<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            id: next_signal_id(),
            value: Arc::new(RwLock::new(value)),
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Read the current value in place without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.notify_subscribers();
    }

    /// Update the value in place and notify subscribers.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        f(&mut self.value.write());
        self.notify_subscribers();
    }

    /// Register a callback invoked with the new value after every change.
    pub fn subscribe<F>(&self, notify: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(notify);
        let id = subscriber.id();
        self.subscribers.write().push(subscriber);

        let subscribers: Weak<Subscribers<T>> = Arc::downgrade(&self.subscribers);
        Subscription::new(id, move |id: SubscriberId| {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.write().retain(|s| s.id() != id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn notify_subscribers(&self) {
        let subscribers = self.subscribers.read().clone();
        if subscribers.is_empty() {
            return;
        }
        let value = self.get();
        for subscriber in &subscribers {
            subscriber.notify(&value);
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for Signal<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &*self.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

//! Reactive Primitives
//!
//! The two building blocks every consumer-facing piece of this crate is made
//! of: a [`Signal`] (one observable value) and the [`Subscriber`] /
//! [`Subscription`] pair used by signals and by the follow-status store.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Writing it calls every
//! subscriber with the new value before the write returns.
//!
//! ## Subscriptions
//!
//! Subscribing hands back a [`Subscription`]. Holding it keeps the callback
//! registered; dropping it unregisters. There is no other way to
//! unsubscribe, so a consumer that goes away cannot leave a dangling
//! callback behind.
//!
//! # Implementation Notes
//!
//! Notification is synchronous and runs with no lock held, which is what
//! lets a callback read back into the structure that notified it, and what
//! makes every consumer observe a write before the writer moves on.

mod signal;
mod subscriber;

pub use signal::Signal;
pub use subscriber::{Subscriber, SubscriberId, Subscription};

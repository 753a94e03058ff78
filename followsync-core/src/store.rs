//! Follow-Status Store
//!
//! An observable map from author to "the viewer follows this author". It is
//! the only shared mutable state between a feed and its follow buttons: the
//! controller seeds it from a batched lookup, buttons write optimistic and
//! confirmed values into it, and every write is fanned out to subscribers
//! before the write returns. Two buttons bound to the same author therefore
//! never disagree once a write has settled.
//!
//! # Reads
//!
//! An author with no entry reads as `false`. "Unknown" never reaches a
//! renderer.
//!
//! # Viewer
//!
//! The store knows whose follow graph it mirrors. Writes for the viewer's
//! own id are dropped, and changing the viewer empties the map.
//!
//! # Sequencing
//!
//! Every toggle takes a [`Ticket`] before it writes optimistically. When the
//! request comes back the result is applied through [`FollowStatusStore::resolve`],
//! which drops it if a newer ticket was issued for the same author or the
//! viewer changed in the meantime. Seeds from the same viewer do not
//! invalidate tickets: a mutation outcome is newer than any lookup that was
//! issued before it.
//!
//! # Scopes
//!
//! Several lists may share one store. Each takes a [`SeedScope`] and seeds
//! through [`FollowStatusStore::seed_scoped`], which replaces only the keys
//! that scope seeded last time. An entry leaves the map once no scope holds
//! it, so one list reloading never drops an author another list shows.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::model::AuthorId;
use crate::reactive::{Subscriber, SubscriberId, Subscription};

/// What changed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The map was replaced wholesale.
    Seeded,
    /// Entries were dropped: all of them, or one scope's share.
    Cleared,
    /// One author's entry was written.
    Updated { author: AuthorId, following: bool },
}

impl StoreEvent {
    /// Whether a consumer bound to `author` needs to re-read.
    pub fn touches(&self, author: &AuthorId) -> bool {
        match self {
            StoreEvent::Seeded | StoreEvent::Cleared => true,
            StoreEvent::Updated { author: updated, .. } => updated == author,
        }
    }
}

/// Proof that a toggle was issued, used to apply its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    author: AuthorId,
    seq: u64,
    epoch: u64,
}

impl Ticket {
    pub fn author(&self) -> &AuthorId {
        &self.author
    }
}

/// One seeding party of a shared store, typically one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeedScope(u64);

/// Outcome of [`FollowStatusStore::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    /// A newer toggle or a viewer change superseded this one.
    Stale,
}

#[derive(Default)]
struct State {
    entries: HashMap<AuthorId, bool>,
    viewer: Option<AuthorId>,
    /// Bumped on every viewer change; tickets from an older epoch are stale.
    epoch: u64,
    scopes: HashMap<SeedScope, HashSet<AuthorId>>,
}

impl State {
    fn accepts(&self, author: &AuthorId) -> bool {
        !author.is_empty() && self.viewer.as_ref() != Some(author)
    }

    fn held(&self, author: &AuthorId) -> bool {
        self.scopes.values().any(|keys| keys.contains(author))
    }

    /// Drop `authors` from the map unless some scope still holds them.
    fn release(&mut self, authors: HashSet<AuthorId>) -> usize {
        let mut dropped = 0;
        for author in authors {
            if !self.held(&author) && self.entries.remove(&author).is_some() {
                dropped += 1;
            }
        }
        dropped
    }
}

type KeyedSubscribers = HashMap<AuthorId, SmallVec<[Subscriber<StoreEvent>; 2]>>;

struct Inner {
    state: RwLock<State>,
    keyed: RwLock<KeyedSubscribers>,
    global: RwLock<Vec<Subscriber<StoreEvent>>>,
    tickets: DashMap<AuthorId, u64>,
    next_seq: AtomicU64,
    next_scope: AtomicU64,
}

/// Shared handle to a follow-status map. Clones share state.
#[derive(Clone)]
pub struct FollowStatusStore {
    inner: Arc<Inner>,
}

impl FollowStatusStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                keyed: RwLock::new(HashMap::new()),
                global: RwLock::new(Vec::new()),
                tickets: DashMap::new(),
                next_seq: AtomicU64::new(0),
                next_scope: AtomicU64::new(0),
            }),
        }
    }

    /// Create a store already bound to a viewer.
    pub fn for_viewer(viewer: impl Into<AuthorId>) -> Self {
        let store = Self::new();
        store.inner.state.write().viewer = Some(viewer.into());
        store
    }

    pub fn viewer(&self) -> Option<AuthorId> {
        self.inner.state.read().viewer.clone()
    }

    /// Rebind the store to another viewer.
    ///
    /// A different viewer empties the map and invalidates every outstanding
    /// ticket. Setting the same viewer again is a no-op.
    pub fn set_viewer(&self, viewer: Option<AuthorId>) {
        {
            let mut state = self.inner.state.write();
            if state.viewer == viewer {
                return;
            }
            state.viewer = viewer;
            state.entries.clear();
            state.scopes.clear();
            state.epoch += 1;
            self.inner.tickets.clear();
        }
        debug!("follow store rebound to a new viewer");
        self.notify(&StoreEvent::Cleared);
    }

    /// Register a new seeding party.
    pub fn scope(&self) -> SeedScope {
        SeedScope(self.inner.next_scope.fetch_add(1, Ordering::Relaxed))
    }

    /// Replace the map wholesale, forgetting every scope.
    ///
    /// Entries for the viewer and for empty ids are dropped.
    pub fn seed<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (AuthorId, bool)>,
    {
        let len = {
            let mut state = self.inner.state.write();
            let entries: HashMap<_, _> = entries
                .into_iter()
                .filter(|(author, _)| state.accepts(author))
                .collect();
            state.entries = entries;
            state.scopes.clear();
            state.entries.len()
        };
        debug!(authors = len, "follow store seeded");
        self.notify(&StoreEvent::Seeded);
    }

    /// Replace what `scope` seeded last time with `entries`.
    ///
    /// Keys the scope no longer lists are dropped unless another scope holds
    /// them. Values for keys shared with another scope are overwritten: a
    /// fresh answer for the same viewer is never older than the one it
    /// replaces.
    pub fn seed_scoped<I>(&self, scope: SeedScope, entries: I)
    where
        I: IntoIterator<Item = (AuthorId, bool)>,
    {
        let (len, dropped) = {
            let mut state = self.inner.state.write();
            let entries: Vec<(AuthorId, bool)> = entries
                .into_iter()
                .filter(|(author, _)| state.accepts(author))
                .collect();
            let keys: HashSet<AuthorId> = entries.iter().map(|(author, _)| author.clone()).collect();
            let previous = state.scopes.insert(scope, keys).unwrap_or_default();
            let dropped = state.release(previous);
            let len = entries.len();
            state.entries.extend(entries);
            (len, dropped)
        };
        debug!(?scope, authors = len, dropped, "follow store seeded for scope");
        self.notify(&StoreEvent::Seeded);
    }

    /// Seed `scope` from a batched lookup: every queried author is present,
    /// `true` exactly when it came back in `followed`.
    pub fn seed_lookup<'a, Q, F>(&self, scope: SeedScope, queried: Q, followed: &F)
    where
        Q: IntoIterator<Item = &'a AuthorId>,
        F: Contains<AuthorId> + ?Sized,
    {
        self.seed_scoped(
            scope,
            queried
                .into_iter()
                .map(|author| (author.clone(), followed.has(author))),
        );
    }

    /// Drop what `scope` seeded, keeping keys other scopes still hold.
    pub fn clear_scope(&self, scope: SeedScope) {
        let dropped = {
            let mut state = self.inner.state.write();
            let Some(keys) = state.scopes.remove(&scope) else {
                return;
            };
            state.release(keys)
        };
        debug!(?scope, dropped, "follow store scope cleared");
        self.notify(&StoreEvent::Cleared);
    }

    /// Write one entry and notify subscribers before returning.
    ///
    /// Returns `false` if the write was refused (viewer's own id or an empty
    /// id).
    pub fn set(&self, author: &AuthorId, following: bool) -> bool {
        {
            let mut state = self.inner.state.write();
            if !state.accepts(author) {
                trace!(%author, "refusing follow-store write");
                return false;
            }
            state.entries.insert(author.clone(), following);
        }
        self.updated(author, following);
        true
    }

    fn updated(&self, author: &AuthorId, following: bool) {
        debug!(%author, following, "follow store updated");
        self.notify(&StoreEvent::Updated {
            author: author.clone(),
            following,
        });
    }

    /// `false` when the author has no entry.
    pub fn get(&self, author: &AuthorId) -> bool {
        self.inner
            .state
            .read()
            .entries
            .get(author)
            .copied()
            .unwrap_or(false)
    }

    pub fn contains(&self, author: &AuthorId) -> bool {
        self.inner.state.read().entries.contains_key(author)
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the map and forget every scope. The viewer binding and
    /// outstanding tickets survive.
    pub fn clear(&self) {
        {
            let mut state = self.inner.state.write();
            state.entries.clear();
            state.scopes.clear();
        }
        debug!("follow store cleared");
        self.notify(&StoreEvent::Cleared);
    }

    /// Ordered copy of the current entries.
    pub fn snapshot(&self) -> BTreeMap<AuthorId, bool> {
        self.inner
            .state
            .read()
            .entries
            .iter()
            .map(|(author, following)| (author.clone(), *following))
            .collect()
    }

    /// Issue a ticket for a toggle on `author`. Any earlier ticket for the
    /// same author becomes stale.
    pub fn begin(&self, author: &AuthorId) -> Ticket {
        // Held so a concurrent viewer change cannot split the epoch read
        // from the ticket insert.
        let state = self.inner.state.read();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.tickets.insert(author.clone(), seq);
        Ticket {
            author: author.clone(),
            seq,
            epoch: state.epoch,
        }
    }

    /// Apply a toggle outcome if its ticket is still current.
    ///
    /// The check and the write happen under one lock, so an outcome can
    /// never land in the map of a viewer bound after the check.
    pub fn resolve(&self, ticket: &Ticket, following: bool) -> Resolution {
        let written = {
            let mut state = self.inner.state.write();
            if ticket.epoch != state.epoch {
                debug!(author = %ticket.author, "discarding toggle outcome from a previous viewer");
                return Resolution::Stale;
            }
            let current = self
                .inner
                .tickets
                .remove_if(&ticket.author, |_, seq| *seq == ticket.seq);
            if current.is_none() {
                debug!(author = %ticket.author, "discarding superseded toggle outcome");
                return Resolution::Stale;
            }
            let accepted = state.accepts(&ticket.author);
            if accepted {
                state.entries.insert(ticket.author.clone(), following);
            }
            accepted
        };
        if written {
            self.updated(&ticket.author, following);
        }
        Resolution::Applied
    }

    /// Whether `ticket` is still the newest for its author.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.epoch == self.inner.state.read().epoch
            && self
                .inner
                .tickets
                .get(&ticket.author)
                .is_some_and(|seq| *seq == ticket.seq)
    }

    /// Subscribe to changes that affect one author.
    pub fn subscribe<F>(&self, author: &AuthorId, notify: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(notify);
        let id = subscriber.id();
        self.inner
            .keyed
            .write()
            .entry(author.clone())
            .or_default()
            .push(subscriber);

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let author = author.clone();
        Subscription::new(id, move |id: SubscriberId| {
            if let Some(inner) = inner.upgrade() {
                let mut keyed = inner.keyed.write();
                if let Some(list) = keyed.get_mut(&author) {
                    list.retain(|s| s.id() != id);
                    if list.is_empty() {
                        keyed.remove(&author);
                    }
                }
            }
        })
    }

    /// Subscribe to every change.
    pub fn subscribe_all<F>(&self, notify: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(notify);
        let id = subscriber.id();
        self.inner.global.write().push(subscriber);

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Subscription::new(id, move |id: SubscriberId| {
            if let Some(inner) = inner.upgrade() {
                inner.global.write().retain(|s| s.id() != id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        let keyed: usize = self.inner.keyed.read().values().map(|list| list.len()).sum();
        keyed + self.inner.global.read().len()
    }

    /// Call every affected subscriber. Runs with no store lock held, so
    /// callbacks may read the store.
    fn notify(&self, event: &StoreEvent) {
        let mut targets: Vec<Subscriber<StoreEvent>> = {
            let keyed = self.inner.keyed.read();
            match event {
                StoreEvent::Updated { author, .. } => keyed
                    .get(author)
                    .map(|list| list.iter().cloned().collect())
                    .unwrap_or_default(),
                StoreEvent::Seeded | StoreEvent::Cleared => {
                    keyed.values().flatten().cloned().collect()
                }
            }
        };
        targets.extend(self.inner.global.read().iter().cloned());

        for subscriber in &targets {
            subscriber.notify(event);
        }
    }
}

impl Default for FollowStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FollowStatusStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FollowStatusStore")
            .field("viewer", &self.viewer())
            .field("entries", &self.snapshot())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Membership test used by [`FollowStatusStore::seed_lookup`].
pub trait Contains<T> {
    fn has(&self, item: &T) -> bool;
}

impl<T: std::hash::Hash + Eq, S: std::hash::BuildHasher> Contains<T>
    for std::collections::HashSet<T, S>
{
    fn has(&self, item: &T) -> bool {
        self.contains(item)
    }
}

impl<T: std::hash::Hash + Eq, S: std::hash::BuildHasher> Contains<T> for indexmap::IndexSet<T, S> {
    fn has(&self, item: &T) -> bool {
        self.contains(item)
    }
}

impl<T: PartialEq> Contains<T> for [T] {
    fn has(&self, item: &T) -> bool {
        self.contains(item)
    }
}

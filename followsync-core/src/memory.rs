//! In-Memory Backend
//!
//! A process-local stand-in for the hosted backend: posts, follow edges and
//! the signed-in viewer, with switches to make individual calls fail. Used by
//! the demo binary and by tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use indexmap::IndexSet;
use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::backend::{BackendResult, FollowMutations, PostSource, RelationshipLookup, ViewerProvider};
use crate::config::DEFAULT_FEED_LIMIT;
use crate::error::BackendError;
use crate::model::{recency_order, AuthorId, FollowResult, Post, PostsChanged, Viewer};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct Faults {
    posts: AtomicBool,
    lookups: AtomicBool,
    mutations: AtomicBool,
}

pub struct InMemoryBackend {
    posts: RwLock<Vec<Post>>,
    /// (follower, followed)
    follows: RwLock<HashSet<(AuthorId, AuthorId)>>,
    viewer: watch::Sender<Option<Viewer>>,
    changes: broadcast::Sender<PostsChanged>,
    faults: Faults,
    lookup_calls: AtomicUsize,
    mutation_calls: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let (viewer, _) = watch::channel(None);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            posts: RwLock::new(Vec::new()),
            follows: RwLock::new(HashSet::new()),
            viewer,
            changes,
            faults: Faults::default(),
            lookup_calls: AtomicUsize::new(0),
            mutation_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_posts(self, posts: impl IntoIterator<Item = Post>) -> Self {
        self.posts.write().extend(posts);
        self
    }

    pub fn with_follow(self, follower: impl Into<AuthorId>, followed: impl Into<AuthorId>) -> Self {
        self.follow_directly(follower, followed);
        self
    }

    /// Record a follow edge server-side, bypassing the mutation API.
    pub fn follow_directly(&self, follower: impl Into<AuthorId>, followed: impl Into<AuthorId>) {
        self.follows.write().insert((follower.into(), followed.into()));
    }

    pub fn login(&self, viewer: Viewer) {
        debug!(viewer = %viewer.id, "login");
        self.viewer.send_replace(Some(viewer));
    }

    pub fn logout(&self) {
        debug!("logout");
        self.viewer.send_replace(None);
    }

    pub fn create_post(&self, post: Post) {
        self.posts.write().push(post);
        self.announce_change();
    }

    /// Returns whether a post was removed.
    pub fn delete_post(&self, post_id: &str) -> bool {
        let removed = {
            let mut posts = self.posts.write();
            let before = posts.len();
            posts.retain(|p| p.id != post_id);
            posts.len() != before
        };
        if removed {
            self.announce_change();
        }
        removed
    }

    pub fn is_following(&self, follower: &AuthorId, followed: &AuthorId) -> bool {
        self.follows
            .read()
            .contains(&(follower.clone(), followed.clone()))
    }

    pub fn fail_posts(&self, fail: bool) {
        self.faults.posts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.faults.lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.faults.mutations.store(fail, Ordering::SeqCst);
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    fn announce_change(&self) {
        // No receivers is fine: nobody is watching the feed.
        let _ = self.changes.send(PostsChanged);
    }

    fn signed_in(&self) -> BackendResult<AuthorId> {
        self.viewer
            .borrow()
            .as_ref()
            .map(|v| v.id.clone())
            .ok_or(BackendError::Unauthenticated)
    }

    fn check_fault(flag: &AtomicBool, what: &str) -> BackendResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(BackendError::Transport(format!("{what} unavailable")));
        }
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostSource for InMemoryBackend {
    async fn list_posts(&self) -> BackendResult<Vec<Post>> {
        Self::check_fault(&self.faults.posts, "posts")?;
        let mut posts = self.posts.read().clone();
        posts.sort_by(recency_order);
        Ok(posts)
    }

    async fn get_feed(&self, limit: u32, offset: u32) -> BackendResult<Vec<Post>> {
        Self::check_fault(&self.faults.posts, "feed")?;
        let Ok(viewer) = self.signed_in() else {
            return Ok(Vec::new());
        };
        let limit = if limit == 0 { DEFAULT_FEED_LIMIT } else { limit };

        let followed: HashSet<AuthorId> = self
            .follows
            .read()
            .iter()
            .filter(|(follower, _)| *follower == viewer)
            .map(|(_, followed)| followed.clone())
            .collect();

        let mut posts: Vec<Post> = self
            .posts
            .read()
            .iter()
            .filter(|p| followed.contains(&p.author_id))
            .cloned()
            .collect();
        posts.sort_by(recency_order);

        Ok(posts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<PostsChanged> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl RelationshipLookup for InMemoryBackend {
    async fn follow_states(
        &self,
        viewer: &AuthorId,
        authors: &IndexSet<AuthorId>,
    ) -> BackendResult<HashSet<AuthorId>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        Self::check_fault(&self.faults.lookups, "relationship lookup")?;
        let follows = self.follows.read();
        Ok(authors
            .iter()
            .filter(|author| follows.contains(&(viewer.clone(), (*author).clone())))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FollowMutations for InMemoryBackend {
    async fn follow(&self, author: &AuthorId) -> BackendResult<FollowResult> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        Self::check_fault(&self.faults.mutations, "follow")?;
        let viewer = self.signed_in()?;
        if viewer == *author {
            return Err(BackendError::SelfFollow);
        }
        if !self.follows.write().insert((viewer, author.clone())) {
            return Err(BackendError::AlreadyFollowing(author.clone()));
        }
        Ok(FollowResult {
            author_id: author.clone(),
            is_following: true,
        })
    }

    async fn unfollow(&self, author: &AuthorId) -> BackendResult<FollowResult> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        Self::check_fault(&self.faults.mutations, "unfollow")?;
        let viewer = self.signed_in()?;
        if !self.follows.write().remove(&(viewer, author.clone())) {
            return Err(BackendError::NotFollowing(author.clone()));
        }
        Ok(FollowResult {
            author_id: author.clone(),
            is_following: false,
        })
    }
}

#[async_trait]
impl ViewerProvider for InMemoryBackend {
    async fn current_viewer(&self) -> BackendResult<Option<Viewer>> {
        Ok(self.viewer.borrow().clone())
    }

    fn watch(&self) -> watch::Receiver<Option<Viewer>> {
        self.viewer.subscribe()
    }
}

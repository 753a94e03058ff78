//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use indexmap::IndexSet;
use tokio::sync::Notify;

use tokio::sync::broadcast;

use followsync_core::backend::{
    BackendResult, Collaborators, FollowMutations, PostSource, RelationshipLookup,
};
use followsync_core::memory::InMemoryBackend;
use followsync_core::{AuthorId, FollowResult, Post, PostsChanged};

pub fn post(id: &str, author: &str, secs: i64) -> Post {
    Post::new(id, author, "body", Utc.timestamp_opt(secs, 0).single().unwrap())
}

pub fn id(s: &str) -> AuthorId {
    AuthorId::from(s)
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within a second");
}

/// Wait until a counter reaches `n`.
pub async fn wait_for_calls(counter: &AtomicUsize, n: usize) {
    eventually(|| counter.load(Ordering::SeqCst) >= n).await;
}

/// Relationship lookup that holds its first call until `release` fires.
pub struct GatedLookup {
    pub inner: Arc<InMemoryBackend>,
    pub release: Notify,
    pub hold_first: AtomicBool,
    pub calls: AtomicUsize,
}

impl GatedLookup {
    pub fn new(inner: Arc<InMemoryBackend>) -> Self {
        Self {
            inner,
            release: Notify::new(),
            hold_first: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RelationshipLookup for GatedLookup {
    async fn follow_states(
        &self,
        viewer: &AuthorId,
        authors: &IndexSet<AuthorId>,
    ) -> BackendResult<HashSet<AuthorId>> {
        let hold = self.hold_first.swap(false, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if hold {
            self.release.notified().await;
        }
        self.inner.follow_states(viewer, authors).await
    }
}

/// Post source whose first fetch reads the backend at once but answers
/// only after `release` fires, like a slow response carrying old data.
pub struct GatedPosts {
    pub inner: Arc<InMemoryBackend>,
    pub release: Notify,
    pub hold_first: AtomicBool,
    pub calls: AtomicUsize,
}

impl GatedPosts {
    pub fn new(inner: Arc<InMemoryBackend>) -> Self {
        Self {
            inner,
            release: Notify::new(),
            hold_first: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    async fn answer(&self, fetched: BackendResult<Vec<Post>>) -> BackendResult<Vec<Post>> {
        let hold = self.hold_first.swap(false, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if hold {
            self.release.notified().await;
        }
        fetched
    }
}

#[async_trait]
impl PostSource for GatedPosts {
    async fn list_posts(&self) -> BackendResult<Vec<Post>> {
        let fetched = self.inner.list_posts().await;
        self.answer(fetched).await
    }

    async fn get_feed(&self, limit: u32, offset: u32) -> BackendResult<Vec<Post>> {
        let fetched = self.inner.get_feed(limit, offset).await;
        self.answer(fetched).await
    }

    fn changes(&self) -> broadcast::Receiver<PostsChanged> {
        self.inner.changes()
    }
}

/// Mutations that always succeed with the requested value, each call
/// parked until `release` fires.
#[derive(Default)]
pub struct GatedMutations {
    pub release: Notify,
    pub calls: AtomicUsize,
}

impl GatedMutations {
    async fn answer(&self, author: &AuthorId, following: bool) -> BackendResult<FollowResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(FollowResult {
            author_id: author.clone(),
            is_following: following,
        })
    }
}

#[async_trait]
impl FollowMutations for GatedMutations {
    async fn follow(&self, author: &AuthorId) -> BackendResult<FollowResult> {
        self.answer(author, true).await
    }

    async fn unfollow(&self, author: &AuthorId) -> BackendResult<FollowResult> {
        self.answer(author, false).await
    }
}

pub fn collaborators_with_lookup(
    backend: &Arc<InMemoryBackend>,
    lookup: Arc<GatedLookup>,
) -> Collaborators {
    Collaborators {
        relationships: lookup,
        ..Collaborators::from_backend(backend.clone())
    }
}

pub fn collaborators_with_posts(
    backend: &Arc<InMemoryBackend>,
    posts: Arc<GatedPosts>,
) -> Collaborators {
    Collaborators {
        posts,
        ..Collaborators::from_backend(backend.clone())
    }
}

pub fn collaborators_with_mutations(
    backend: &Arc<InMemoryBackend>,
    mutations: Arc<GatedMutations>,
) -> Collaborators {
    Collaborators {
        mutations,
        ..Collaborators::from_backend(backend.clone())
    }
}

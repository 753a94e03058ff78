//! External Collaborators
//!
//! The post source, relationship lookup, follow mutations and viewer
//! identity all live in a hosted backend. These traits are the call shapes
//! the feed and the buttons depend on; transport encoding is somebody
//! else's problem.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexSet;
use tokio::sync::{broadcast, watch};

use crate::error::BackendError;
use crate::model::{AuthorId, FollowResult, Post, PostsChanged, Viewer};

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait PostSource: Send + Sync {
    /// Every post.
    async fn list_posts(&self) -> BackendResult<Vec<Post>>;

    /// Posts by authors the viewer follows, one page at a time.
    async fn get_feed(&self, limit: u32, offset: u32) -> BackendResult<Vec<Post>>;

    /// Fires whenever any row in the post collection may have changed.
    fn changes(&self) -> broadcast::Receiver<PostsChanged>;
}

#[async_trait]
pub trait RelationshipLookup: Send + Sync {
    /// The subset of `authors` that `viewer` currently follows.
    async fn follow_states(
        &self,
        viewer: &AuthorId,
        authors: &IndexSet<AuthorId>,
    ) -> BackendResult<HashSet<AuthorId>>;
}

#[async_trait]
pub trait FollowMutations: Send + Sync {
    async fn follow(&self, author: &AuthorId) -> BackendResult<FollowResult>;

    async fn unfollow(&self, author: &AuthorId) -> BackendResult<FollowResult>;
}

#[async_trait]
pub trait ViewerProvider: Send + Sync {
    async fn current_viewer(&self) -> BackendResult<Option<Viewer>>;

    /// Login/logout notifications.
    fn watch(&self) -> watch::Receiver<Option<Viewer>>;
}

/// The set of collaborators a feed controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub posts: Arc<dyn PostSource>,
    pub relationships: Arc<dyn RelationshipLookup>,
    pub mutations: Arc<dyn FollowMutations>,
    pub viewer: Arc<dyn ViewerProvider>,
}

impl Collaborators {
    /// Use one object for every role.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: PostSource + RelationshipLookup + FollowMutations + ViewerProvider + 'static,
    {
        Self {
            posts: backend.clone(),
            relationships: backend.clone(),
            mutations: backend.clone(),
            viewer: backend,
        }
    }
}

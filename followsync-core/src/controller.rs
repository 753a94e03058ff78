//! Feed Controller
//!
//! Owns one post list and its follow-status store. A load goes:
//!
//! 1. fetch posts (all posts, or a page of the viewer's feed), newest first
//! 2. collect the distinct authors other than the viewer
//! 3. one batched lookup of which of them the viewer follows
//! 4. seed the store with the answer
//!
//! Steps 2-4 re-run whenever the posts or the viewer change; a post change
//! notification refetches first. Post fetches and lookups are both
//! numbered and only the newest of each may land, so a slow answer for an
//! old post set or an old viewer cannot overwrite a newer one.
//!
//! A personalised feed only lists followed authors, so it also refetches
//! after any follow or unfollow confirmed through one of its buttons.
//!
//! Each controller seeds the store under its own [`SeedScope`]; lists sharing
//! a store never drop each other's entries.
//!
//! Failures never leave a previous viewer's entries behind: the list's share
//! of the store is cleared and the error is parked in [`FeedStatus`] for the
//! view to offer a retry. Posts that did load keep rendering, their buttons
//! reading "not following" until the retry succeeds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::backend::Collaborators;
use crate::button::FollowButton;
use crate::config::{FeedConfig, PostQuery, DEFAULT_FEED_LIMIT};
use crate::error::FeedError;
use crate::model::{recency_order, AuthorId, Post, Viewer};
use crate::reactive::Signal;
use crate::store::{FollowStatusStore, SeedScope};

/// Load state for the view layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStatus {
    pub loading_posts: bool,
    pub loading_follow_states: bool,
    /// Set when the last load failed; cleared by the next successful one.
    pub error: Option<FeedError>,
}

/// One rendered post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRow {
    pub post: Post,
    pub following: bool,
    pub show_follow_button: bool,
}

pub struct FeedController {
    collaborators: Collaborators,
    config: FeedConfig,
    store: FollowStatusStore,
    scope: SeedScope,
    posts: Signal<Vec<Post>>,
    viewer: Signal<Option<Viewer>>,
    status: Signal<FeedStatus>,
    hidden: Signal<IndexSet<String>>,
    post_generation: AtomicU64,
    lookup_generation: AtomicU64,
    /// Signalled when one of this list's buttons gets a server answer.
    follow_confirmed: Arc<Notify>,
}

impl FeedController {
    pub fn new(collaborators: Collaborators, config: FeedConfig) -> Self {
        Self::with_store(collaborators, config, FollowStatusStore::new())
    }

    /// Build a controller over an existing store, e.g. a notifications feed
    /// sharing the main feed's follow states.
    pub fn with_store(
        collaborators: Collaborators,
        config: FeedConfig,
        store: FollowStatusStore,
    ) -> Self {
        Self {
            collaborators,
            config,
            scope: store.scope(),
            store,
            posts: Signal::new(Vec::new()),
            viewer: Signal::new(None),
            status: Signal::new(FeedStatus::default()),
            hidden: Signal::new(IndexSet::new()),
            post_generation: AtomicU64::new(0),
            lookup_generation: AtomicU64::new(0),
            follow_confirmed: Arc::new(Notify::new()),
        }
    }

    pub fn store(&self) -> &FollowStatusStore {
        &self.store
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn posts(&self) -> Signal<Vec<Post>> {
        self.posts.clone()
    }

    pub fn viewer(&self) -> Signal<Option<Viewer>> {
        self.viewer.clone()
    }

    pub fn status(&self) -> Signal<FeedStatus> {
        self.status.clone()
    }

    /// Fetch the viewer, then the posts, then the follow states.
    pub async fn load(&self) -> Result<(), FeedError> {
        let viewer = match self.collaborators.viewer.current_viewer().await {
            Ok(viewer) => viewer,
            Err(error) => {
                warn!(%error, "could not resolve the current viewer, continuing signed out");
                None
            }
        };
        self.bind_viewer(viewer);
        self.refresh_posts().await
    }

    /// Same as [`load`](Self::load); what a retry affordance calls.
    pub async fn retry(&self) -> Result<(), FeedError> {
        self.load().await
    }

    /// Refetch the posts, then re-derive follow states.
    ///
    /// A fetch overtaken by a newer one, or by a viewer change on a
    /// personalised feed, is dropped and returns `Ok`.
    pub async fn refresh_posts(&self) -> Result<(), FeedError> {
        let generation = self.invalidate_post_fetches();
        self.status.update(|s| s.loading_posts = true);

        let fetched = match self.config.query {
            PostQuery::All => self.collaborators.posts.list_posts().await,
            PostQuery::Feed { limit, offset } => {
                let limit = if limit == 0 { DEFAULT_FEED_LIMIT } else { limit };
                self.collaborators.posts.get_feed(limit, offset).await
            }
        };

        if self.post_generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding superseded post fetch");
            return Ok(());
        }

        let mut posts = match fetched {
            Ok(posts) => posts,
            Err(error) => {
                warn!(%error, "post fetch failed");
                self.invalidate_lookups();
                self.posts.set(Vec::new());
                self.store.clear_scope(self.scope);
                let error = FeedError::Posts(error);
                self.status.update(|s| {
                    s.loading_posts = false;
                    s.loading_follow_states = false;
                    s.error = Some(error.clone());
                });
                return Err(error);
            }
        };
        posts.sort_by(recency_order);
        info!(posts = posts.len(), "posts loaded");

        self.posts.set(posts);
        self.status.update(|s| {
            s.loading_posts = false;
            s.error = None;
        });
        self.reconcile().await
    }

    /// Switch to another viewer (or sign out) and re-derive.
    ///
    /// A personalised feed depends on who is looking, so it is refetched;
    /// the all-posts list only needs new follow states.
    pub async fn set_viewer(&self, viewer: Option<Viewer>) -> Result<(), FeedError> {
        if self.viewer.with(|current| *current == viewer) {
            return Ok(());
        }
        self.bind_viewer(viewer);
        match self.config.query {
            PostQuery::All => self.reconcile().await,
            PostQuery::Feed { .. } => self.refresh_posts().await,
        }
    }

    /// Re-derive the follow states for the loaded posts.
    pub async fn reconcile(&self) -> Result<(), FeedError> {
        let generation = self.invalidate_lookups();

        let Some(viewer) = self.viewer.get() else {
            self.store.clear_scope(self.scope);
            self.status.update(|s| s.loading_follow_states = false);
            return Ok(());
        };
        let authors = self.author_ids(&viewer.id);
        if authors.is_empty() {
            self.store.clear_scope(self.scope);
            self.status.update(|s| s.loading_follow_states = false);
            return Ok(());
        }

        self.status.update(|s| s.loading_follow_states = true);
        let result = self
            .collaborators
            .relationships
            .follow_states(&viewer.id, &authors)
            .await;

        if self.lookup_generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding superseded follow lookup");
            return Ok(());
        }

        match result {
            Ok(followed) => {
                info!(
                    authors = authors.len(),
                    followed = followed.len(),
                    "follow states loaded"
                );
                self.store.seed_lookup(self.scope, &authors, &followed);
                self.status.update(|s| {
                    s.loading_follow_states = false;
                    s.error = None;
                });
                Ok(())
            }
            Err(error) => {
                warn!(%error, "follow lookup failed");
                self.store.clear_scope(self.scope);
                let error = FeedError::Lookup(error);
                self.status.update(|s| {
                    s.loading_follow_states = false;
                    s.error = Some(error.clone());
                });
                Err(error)
            }
        }
    }

    /// Distinct authors of the loaded posts, in feed order, without the
    /// viewer and without empty ids.
    pub fn author_ids(&self, viewer: &AuthorId) -> IndexSet<AuthorId> {
        self.posts.with(|posts| {
            posts
                .iter()
                .map(|post| &post.author_id)
                .filter(|author| !author.is_empty() && *author != viewer)
                .cloned()
                .collect()
        })
    }

    /// Hide a post from this list. Survives refreshes.
    pub fn hide_post(&self, post_id: &str) {
        self.hidden.update(|hidden| {
            hidden.insert(post_id.to_string());
        });
    }

    /// Undo [`hide_post`](Self::hide_post). Returns whether it was hidden.
    pub fn unhide_post(&self, post_id: &str) -> bool {
        let was_hidden = self.hidden.with(|hidden| hidden.contains(post_id));
        if was_hidden {
            self.hidden.update(|hidden| {
                hidden.shift_remove(post_id);
            });
        }
        was_hidden
    }

    /// Every loaded post with its resolved follow state.
    pub fn rows(&self) -> Vec<PostRow> {
        let viewer = self.viewer.get();
        self.posts.with(|posts| {
            posts
                .iter()
                .map(|post| self.row(post, viewer.as_ref()))
                .collect()
        })
    }

    /// Like [`rows`](Self::rows), minus hidden posts.
    pub fn visible_rows(&self) -> Vec<PostRow> {
        let hidden = self.hidden.get();
        self.rows()
            .into_iter()
            .filter(|row| !hidden.contains(&row.post.id))
            .collect()
    }

    /// A follow button for the post's author, or `None` when there is no
    /// viewer or the author is the viewer.
    ///
    /// On a personalised feed the button tells the run loop about every
    /// server answer so the list refetches.
    pub fn button_for(&self, post: &Post) -> Option<FollowButton> {
        let viewer = self.viewer.get()?;
        if !Self::shows_button(&post.author_id, Some(&viewer)) {
            return None;
        }
        let button = FollowButton::new(
            post.author_id.clone(),
            Some(&viewer.id),
            self.store.clone(),
            self.collaborators.mutations.clone(),
        );
        Some(match self.config.query {
            PostQuery::All => button,
            PostQuery::Feed { .. } => {
                let confirmed = Arc::clone(&self.follow_confirmed);
                button.on_confirmed(move |_| confirmed.notify_one())
            }
        })
    }

    /// Load, then keep the list current until the post change stream or the
    /// viewer channel closes. A personalised feed also refetches after its
    /// buttons' follows and unfollows.
    pub async fn run(&self) {
        let mut changes = self.collaborators.posts.changes();
        let mut viewers = self.collaborators.viewer.watch();
        viewers.mark_unchanged();

        if let Err(error) = self.load().await {
            warn!(%error, "initial feed load failed");
        }

        loop {
            tokio::select! {
                change = changes.recv() => match change {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        debug!("post collection changed, refetching");
                        if let Err(error) = self.refresh_posts().await {
                            warn!(%error, "refresh after post change failed");
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = viewers.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let viewer = viewers.borrow_and_update().clone();
                    if let Err(error) = self.set_viewer(viewer).await {
                        warn!(%error, "reload after viewer change failed");
                    }
                }
                _ = self.follow_confirmed.notified() => {
                    debug!("follow graph changed, refetching feed");
                    if let Err(error) = self.refresh_posts().await {
                        warn!(%error, "refresh after follow change failed");
                    }
                }
            }
        }
        debug!("feed controller stopped");
    }

    fn bind_viewer(&self, viewer: Option<Viewer>) {
        self.invalidate_lookups();
        if matches!(self.config.query, PostQuery::Feed { .. }) {
            self.invalidate_post_fetches();
        }
        self.store.set_viewer(viewer.as_ref().map(|v| v.id.clone()));
        self.viewer.set(viewer);
    }

    /// Bump the post generation so any fetch in flight is discarded.
    fn invalidate_post_fetches(&self) -> u64 {
        self.post_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Bump the lookup generation so any lookup in flight is discarded.
    fn invalidate_lookups(&self) -> u64 {
        self.lookup_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn row(&self, post: &Post, viewer: Option<&Viewer>) -> PostRow {
        PostRow {
            post: post.clone(),
            following: self.store.get(&post.author_id),
            show_follow_button: Self::shows_button(&post.author_id, viewer),
        }
    }

    fn shows_button(author: &AuthorId, viewer: Option<&Viewer>) -> bool {
        viewer.is_some_and(|viewer| !author.is_empty() && viewer.id != *author)
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        self.store.clear_scope(self.scope);
    }
}

impl std::fmt::Debug for FeedController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedController")
            .field("config", &self.config)
            .field("viewer", &self.viewer.get())
            .field("posts", &self.posts.with(|p| p.len()))
            .field("store", &self.store)
            .finish()
    }
}

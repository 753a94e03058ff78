//! Followsync Core
//!
//! Client-side follow-status reconciliation for a social feed. It
//! implements:
//!
//! - A follow-status store: an observable map from author to "the viewer
//!   follows them", fanned out synchronously to every consumer
//! - A feed controller that loads posts, looks up follow states for their
//!   authors in one batch, and keeps both current
//! - A follow button with optimistic toggles, exact rollback and a
//!   double-submit guard
//!
//! Authentication, persistence and change delivery belong to an external
//! backend, reached through the traits in [`backend`].
//!
//! # Architecture
//!
//! - `reactive`: signals and subscriptions
//! - `store`: the follow-status store and toggle tickets
//! - `controller`: post loading and follow-state reconciliation
//! - `button`: the follow/unfollow control
//! - `backend`: collaborator traits; `memory` is an in-process stand-in
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use followsync_core::backend::Collaborators;
//! use followsync_core::config::FeedConfig;
//! use followsync_core::controller::FeedController;
//! use followsync_core::memory::InMemoryBackend;
//! use followsync_core::model::Viewer;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(InMemoryBackend::new());
//! backend.login(Viewer::new("V"));
//!
//! let feed = FeedController::new(Collaborators::from_backend(backend), FeedConfig::default());
//! feed.load().await?;
//!
//! for row in feed.visible_rows() {
//!     if let Some(button) = feed.button_for(&row.post) {
//!         button.activate().await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod button;
pub mod config;
pub mod controller;
pub mod error;
pub mod memory;
pub mod model;
pub mod reactive;
pub mod store;

pub use button::{ButtonState, ButtonView, Direction, FollowButton, Toggle};
pub use controller::{FeedController, FeedStatus, PostRow};
pub use error::{BackendError, ConfigError, FeedError, FollowError};
pub use model::{AuthorId, FollowResult, Post, PostsChanged, Viewer};
pub use store::{FollowStatusStore, Resolution, SeedScope, StoreEvent, Ticket};

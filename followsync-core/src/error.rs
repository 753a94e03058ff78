//! Error types.
//!
//! Nothing in this crate is fatal. Collaborator failures arrive as
//! [`BackendError`], and the components wrap them with the context a caller
//! needs to decide what to show (a retry affordance for feed loads, a
//! transient indicator for toggles).

use thiserror::Error;

use crate::model::AuthorId;

/// A failure reported by one of the external collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("already following {0}")]
    AlreadyFollowing(AuthorId),

    #[error("not following {0}")]
    NotFollowing(AuthorId),

    #[error("cannot follow yourself")]
    SelfFollow,
}

/// A follow or unfollow request that did not go through.
///
/// By the time this is returned the button and the store have already been
/// rolled back to the value they held before the toggle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FollowError {
    #[error("failed to follow {author}: {source}")]
    Follow {
        author: AuthorId,
        #[source]
        source: BackendError,
    },

    #[error("failed to unfollow {author}: {source}")]
    Unfollow {
        author: AuthorId,
        #[source]
        source: BackendError,
    },
}

impl FollowError {
    pub fn author(&self) -> &AuthorId {
        match self {
            FollowError::Follow { author, .. } | FollowError::Unfollow { author, .. } => author,
        }
    }
}

/// A feed load that failed. Retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("failed to load posts: {0}")]
    Posts(#[source] BackendError),

    #[error("failed to look up follow states: {0}")]
    Lookup(#[source] BackendError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("malformed config: {0}")]
    Malformed(#[from] serde_json::Error),
}

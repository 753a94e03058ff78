//! Data Model
//!
//! The types exchanged between the store, the controller, the buttons and
//! the external collaborators. Wire names follow the camelCase used by the
//! GraphQL layer.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of an account.
///
/// Used both for post authors and for the viewer; a viewer can only be
/// compared against an author because they share this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(String);

impl AuthorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty id never becomes a map key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AuthorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AuthorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A post as far as follow reconciliation cares.
///
/// Everything except `author_id` is display-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "postId")]
    pub id: String,
    pub author_id: AuthorId,
    #[serde(default)]
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
}

impl Post {
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<AuthorId>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            title: String::new(),
            content: content.into(),
            created_at,
            author_name: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_author_name(mut self, name: impl Into<String>) -> Self {
        self.author_name = Some(name.into());
        self
    }
}

/// Newest first; equal timestamps fall back to the post id so the order is
/// stable across refetches.
pub fn recency_order(a: &Post, b: &Post) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// The authenticated identity looking at the feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewer {
    pub id: AuthorId,
}

impl Viewer {
    pub fn new(id: impl Into<AuthorId>) -> Self {
        Self { id: id.into() }
    }
}

/// Server confirmation of a follow or unfollow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResult {
    pub author_id: AuthorId,
    pub is_following: bool,
}

/// Coarse "something in the post collection changed" signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostsChanged;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn recency_order_newest_first_then_id() {
        let mut posts = vec![
            Post::new("b", "A", "x", at(10)),
            Post::new("c", "A", "x", at(20)),
            Post::new("a", "B", "x", at(10)),
        ];
        posts.sort_by(recency_order);

        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn post_reads_graphql_shape() {
        let json = r#"{
            "postId": "1",
            "authorId": "A",
            "title": "hello",
            "content": "world",
            "createdAt": "2024-05-01T12:00:00Z"
        }"#;
        let post: Post = serde_json::from_str(json).unwrap();

        assert_eq!(post.id, "1");
        assert_eq!(post.author_id, AuthorId::from("A"));
        assert_eq!(post.author_name, None);
    }

    #[test]
    fn follow_result_reads_graphql_shape() {
        let result: FollowResult =
            serde_json::from_str(r#"{"authorId":"B","isFollowing":true}"#).unwrap();
        assert_eq!(
            result,
            FollowResult {
                author_id: "B".into(),
                is_following: true
            }
        );
    }

    #[test]
    fn empty_author_id() {
        assert!(AuthorId::from("").is_empty());
        assert!(!AuthorId::from("A").is_empty());
    }
}

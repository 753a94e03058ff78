//! Walks through a feed load, a confirmed follow and a rolled-back unfollow
//! against the in-memory backend.
//!
//! `RUST_LOG=followsync_core=debug cargo run --bin followsync-demo`

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use followsync_core::backend::Collaborators;
use followsync_core::config::FeedConfig;
use followsync_core::memory::InMemoryBackend;
use followsync_core::{FeedController, Post, Viewer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = FeedConfig::from_env()?;
    let now = Utc::now();
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_posts([
                Post::new("1", "ada", "first light", now - Duration::minutes(30))
                    .with_author_name("Ada"),
                Post::new("2", "brian", "hello feed", now - Duration::minutes(10))
                    .with_author_name("Brian"),
                Post::new("3", "me", "my own post", now).with_author_name("Me"),
            ])
            .with_follow("me", "ada"),
    );
    backend.login(Viewer::new("me"));

    let feed = FeedController::new(Collaborators::from_backend(backend.clone()), config);
    feed.load().await?;
    print_rows(&feed);

    let rows = feed.visible_rows();
    if let Some(button) = rows.iter().find_map(|row| feed.button_for(&row.post)) {
        let outcome = button.activate().await?;
        info!(author = %button.author(), ?outcome, "toggled");
    }
    print_rows(&feed);

    backend.fail_mutations(true);
    if let Some(button) = rows
        .iter()
        .filter(|row| row.following)
        .find_map(|row| feed.button_for(&row.post))
    {
        if let Err(err) = button.activate().await {
            error!(%err, "toggle rolled back");
        }
    }
    print_rows(&feed);

    Ok(())
}

fn print_rows(feed: &FeedController) {
    for row in feed.visible_rows() {
        let label = match (row.show_follow_button, row.following) {
            (false, _) => "",
            (true, true) => "Following",
            (true, false) => "Follow",
        };
        println!(
            "{:<8} {:<20} {}",
            row.post.author_name.as_deref().unwrap_or(row.post.author_id.as_str()),
            row.post.content,
            label
        );
    }
    println!();
}

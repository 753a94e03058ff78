//! Feed configuration.
//!
//! Loaded from the environment (`FOLLOWSYNC_*`) or from JSON. Missing keys
//! fall back to defaults; malformed values are errors.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// Page size used when a feed request does not ask for a positive limit.
pub const DEFAULT_FEED_LIMIT: u32 = 20;

pub const SOURCE_VAR: &str = "FOLLOWSYNC_SOURCE";
pub const FEED_LIMIT_VAR: &str = "FOLLOWSYNC_FEED_LIMIT";
pub const FEED_OFFSET_VAR: &str = "FOLLOWSYNC_FEED_OFFSET";

/// Which posts a controller shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum PostQuery {
    /// Every post, newest first.
    #[default]
    All,
    /// Posts by followed authors, paged.
    Feed {
        #[serde(default = "default_limit")]
        limit: u32,
        #[serde(default)]
        offset: u32,
    },
}

impl PostQuery {
    pub fn feed() -> Self {
        PostQuery::Feed {
            limit: DEFAULT_FEED_LIMIT,
            offset: 0,
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_FEED_LIMIT
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub query: PostQuery,
}

impl FeedConfig {
    pub fn new(query: PostQuery) -> Self {
        Self { query }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key/value source. `from_env` is this over `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source: String = try_load(&lookup, SOURCE_VAR, "all")?;
        let query = match source.trim().to_ascii_lowercase().as_str() {
            "all" => PostQuery::All,
            "feed" => PostQuery::Feed {
                limit: try_load(&lookup, FEED_LIMIT_VAR, &DEFAULT_FEED_LIMIT.to_string())?,
                offset: try_load(&lookup, FEED_OFFSET_VAR, "0")?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: SOURCE_VAR.to_string(),
                    reason: format!("expected `all` or `feed`, got `{other}`"),
                })
            }
        };
        Ok(Self { query })
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })
}

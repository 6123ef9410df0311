//! Stream sources and the polling engine that drives them.
//!
//! A [`StreamSource`] knows how to talk to one livestreaming network: how to
//! recognize its URLs, how to build a canonical stream URL, and how to find
//! out who is live. The [`polling::StreamAdapter`] wraps a source with the
//! shared machinery (snapshot, persistence, diffing, timing loop).

use std::time::Duration;
use async_trait::async_trait;
use regex::Regex;
use watchcat_common::models::Stream;
use crate::Error;

pub mod polling;
pub mod picarto;
pub mod piczel;
pub mod twitch;
pub mod pomf;

pub use polling::{PollOutcome, StreamAdapter, StreamDiff, StreamEvents};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How a source finds out who is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// One request returns the roster of live streamers. When
    /// `scoped_to_watch_list` is set the request has to name the streamers,
    /// so the aggregated watch list of every guild is passed in.
    BulkListing { scoped_to_watch_list: bool },
    /// The network has no listing; every watched username is checked one by
    /// one.
    PerUserCheck,
}

/// Which field identifies "the same stream" across two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKey {
    /// Network ids, for sources whose ids are known to be stable.
    Id,
    /// Case-folded username.
    Username,
}

/// Result of a single per-user liveness check.
#[derive(Debug, Clone, PartialEq)]
pub enum UserStatus {
    Online(Stream),
    Offline,
    /// The network does not know this user.
    Unknown,
    /// The network answered something we do not understand.
    Unrecognized(String),
}

#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Stable id used as store key, e.g. `piczel_tv`.
    fn network_id(&self) -> &str;

    /// Human readable name, e.g. `Piczel.tv`.
    fn display_name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    fn diff_key(&self) -> DiffKey {
        DiffKey::Username
    }

    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Extracts the streamer id from a URL on this network. Pure.
    fn match_url(&self, url: &str) -> Option<String>;

    fn resolve_stream_url(&self, username: &str) -> String;

    /// Fetches the live roster. Only called for [`SourceKind::BulkListing`].
    async fn fetch_live(&self, _watched: &[String]) -> Result<Vec<Stream>, Error> {
        Err(Error::Internal(format!(
            "{} does not support bulk listing",
            self.display_name()
        )))
    }

    /// Checks one user. Only called for [`SourceKind::PerUserCheck`].
    async fn check_user(&self, _username: &str) -> Result<UserStatus, Error> {
        Err(Error::Internal(format!(
            "{} does not support per-user checks",
            self.display_name()
        )))
    }
}

/// Applies a URL pattern with one capture group. An empty capture counts as
/// no match.
pub(crate) fn capture_streamer(pattern: &Regex, url: &str) -> Option<String> {
    pattern
        .captures(url.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
}

// File: watchcat-common/src/models/stream.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A normalized snapshot of one streamer's state on one network.
///
/// Built fresh on every poll by a stream source and never mutated afterwards;
/// the next poll's snapshot simply replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    /// Network-local id. Some networks hand out stable numeric ids, others
    /// have none and reuse the username.
    pub id: String,
    pub network_id: String,
    pub username: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub follower_count: Option<u64>,
    #[serde(default)]
    pub live_since: Option<String>,
    #[serde(default)]
    pub adult: Option<bool>,
    #[serde(default)]
    pub in_multi: Option<bool>,
    #[serde(default)]
    pub viewer_count: Option<u64>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub preview_image_url: Option<String>,
    pub url: String,
    /// Raw payload as the network returned it.
    #[serde(default)]
    pub source: Value,
}

impl Stream {
    /// Minimal stream with only the required fields set.
    pub fn new(id: impl Into<String>, network_id: &str, username: &str, url: String) -> Self {
        Self {
            id: id.into(),
            network_id: network_id.to_string(),
            username: username.to_string(),
            title: None,
            description: None,
            follower_count: None,
            live_since: None,
            adult: None,
            in_multi: None,
            viewer_count: None,
            avatar_url: None,
            preview_image_url: None,
            url,
            source: Value::Null,
        }
    }

    /// Case-folded username, the identity key used across the store.
    pub fn normalized_username(&self) -> String {
        normalize_username(&self.username)
    }

    pub fn is_user(&self, username: &str) -> bool {
        self.normalized_username() == normalize_username(username)
    }
}

/// Watch lists and managed message keys store usernames in this form.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

// File: watchcat-common/src/models/message.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bot-authored notification that is still posted and may be retracted.
///
/// There is at most one per `(guild_id, network_id, stream_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedMessage {
    pub channel_id: String,
    pub message_id: String,
    pub guild_id: String,
    pub network_id: String,
    /// Lower-cased streamer username.
    pub stream_id: String,
    pub created_at: DateTime<Utc>,
}

impl ManagedMessage {
    pub fn new(
        channel_id: &str,
        message_id: &str,
        guild_id: &str,
        network_id: &str,
        stream_id: &str,
    ) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            guild_id: guild_id.to_string(),
            network_id: network_id.to_string(),
            stream_id: crate::models::normalize_username(stream_id),
            created_at: Utc::now(),
        }
    }
}

/// A resolved chat channel: enough to know which guild it belongs to and
/// what to call it in log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub channel_id: String,
    pub guild_id: String,
    pub name: String,
}

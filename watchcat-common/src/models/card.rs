// File: watchcat-common/src/models/card.rs

use chrono::{DateTime, Utc};

/// Content of a "streamer is live" notification, independent of how a chat
/// platform renders it.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationCard {
    pub title: String,
    pub url: String,
    pub author: String,
    pub thumbnail_url: Option<String>,
    pub image_url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub footer: String,
}

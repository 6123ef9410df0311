// File: watchcat-core/src/services/card.rs

use chrono::{DateTime, Utc};
use watchcat_common::models::{NotificationCard, Stream};

/// Discord rejects embed titles longer than this many characters.
pub const MAX_TITLE_CHARS: usize = 256;

/// Builds the "is live" card for a stream on the network named `network_name`.
pub fn build_card(network_name: &str, stream: &Stream) -> NotificationCard {
    let mut footer = vec![network_name.to_string()];
    // Only label SFW when the network actually said so.
    if let Some(adult) = stream.adult {
        footer.push(if adult { "NSFW" } else { "SFW" }.to_string());
    }
    if let Some(followers) = stream.follower_count {
        footer.push(format!("{followers} followers"));
    }

    let title = stream
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(&stream.username);

    NotificationCard {
        title: clip_title(title),
        url: stream.url.clone(),
        author: format!("{} is live!", stream.username),
        thumbnail_url: stream.avatar_url.clone(),
        image_url: stream.preview_image_url.clone(),
        timestamp: stream
            .live_since
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)),
        footer: footer.join(" | "),
    }
}

fn clip_title(title: &str) -> String {
    match title.char_indices().nth(MAX_TITLE_CHARS - 1) {
        Some((cut, _)) if title.chars().count() > MAX_TITLE_CHARS => {
            format!("{}…", &title[..cut])
        }
        _ => title.to_string(),
    }
}

// watchcat-core/src/adapters/piczel.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use watchcat_common::models::Stream;

use crate::adapters::{capture_streamer, DiffKey, SourceKind, StreamSource};
use crate::config::HandlerConfig;
use crate::http::HttpClient;
use crate::Error;

pub const NETWORK_ID: &str = "piczel_tv";
const STREAMS_URL: &str =
    "https://piczel.tv/api/streams?followedStreams=false&live_only=false&sfw=false";

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)piczel\.tv/watch/(.*)$").unwrap());

#[derive(Debug, Deserialize)]
struct PiczelResource {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PiczelUser {
    #[serde(default)]
    avatar: Option<PiczelResource>,
}

#[derive(Debug, Deserialize)]
struct PiczelStream {
    id: u64,
    username: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    follower_count: Option<u64>,
    #[serde(default)]
    live: Option<bool>,
    #[serde(default)]
    live_since: Option<String>,
    #[serde(default)]
    adult: Option<bool>,
    #[serde(default)]
    in_multi: Option<bool>,
    #[serde(default)]
    viewers: Option<u64>,
    #[serde(default)]
    user: Option<PiczelUser>,
}

pub struct PiczelSource {
    http: Arc<dyn HttpClient>,
    poll_interval: Duration,
}

impl PiczelSource {
    pub fn new(http: Arc<dyn HttpClient>, config: &HandlerConfig) -> Self {
        Self {
            http,
            poll_interval: config.poll_interval(),
        }
    }

    /// `None` for entries the API marks as not live.
    fn to_stream(&self, raw: Value) -> Result<Option<Stream>, Error> {
        let ps: PiczelStream = serde_json::from_value(raw.clone())?;
        if ps.live == Some(false) {
            return Ok(None);
        }

        let url = self.resolve_stream_url(&ps.username);
        let mut stream = Stream::new(ps.id.to_string(), NETWORK_ID, &ps.username, url);
        stream.preview_image_url = Some(format!(
            "https://piczel.tv/screenshots/stream_{}.jpg?s={}",
            ps.id,
            ps.live_since.as_deref().unwrap_or_default()
        ));
        stream.avatar_url = ps.user.and_then(|u| u.avatar).and_then(|a| a.url);
        stream.title = ps.title;
        stream.description = ps.description;
        stream.follower_count = ps.follower_count;
        stream.live_since = ps.live_since;
        stream.adult = ps.adult;
        stream.in_multi = ps.in_multi;
        stream.viewer_count = ps.viewers;
        stream.source = raw;
        Ok(Some(stream))
    }
}

#[async_trait]
impl StreamSource for PiczelSource {
    fn network_id(&self) -> &str {
        NETWORK_ID
    }

    fn display_name(&self) -> &str {
        "Piczel.tv"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::BulkListing { scoped_to_watch_list: false }
    }

    fn diff_key(&self) -> DiffKey {
        DiffKey::Id
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn match_url(&self, url: &str) -> Option<String> {
        capture_streamer(&URL_PATTERN, url)
    }

    fn resolve_stream_url(&self, username: &str) -> String {
        format!("https://piczel.tv/watch/{username}")
    }

    async fn fetch_live(&self, _watched: &[String]) -> Result<Vec<Stream>, Error> {
        let response = self.http.get(STREAMS_URL, &[("Accept", "application/json")]).await?;
        if !response.is_success() {
            return Err(Error::Platform(format!("piczel streams returned {}", response.status)));
        }

        let entries: Vec<Value> = serde_json::from_str(&response.body)?;
        let mut streams = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(stream) = self.to_stream(entry)? {
                streams.push(stream);
            }
        }
        Ok(streams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeHttpClient;

    fn source(http: Arc<FakeHttpClient>) -> PiczelSource {
        PiczelSource::new(http, &HandlerConfig::default())
    }

    #[tokio::test]
    async fn test_fetch_live_maps_streams_and_drops_offline_entries() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(
            "https://piczel.tv/api/streams",
            200,
            r#"[
                {"id":7,"username":"UserA","title":"Sketching","description":"hi",
                 "follower_count":120,"live":true,"live_since":"2024-01-01T00:00:00.000Z",
                 "adult":false,"in_multi":false,"viewers":3,
                 "user":{"id":1,"username":"UserA","avatar":{"url":"https://a/usera.png"}}},
                {"id":8,"username":"Sleepy","live":false}
            ]"#,
        );

        let streams = source(http).fetch_live(&[]).await.unwrap();
        assert_eq!(streams.len(), 1);
        let s = &streams[0];
        assert_eq!(s.id, "7");
        assert_eq!(s.url, "https://piczel.tv/watch/UserA");
        assert_eq!(s.follower_count, Some(120));
        assert_eq!(s.avatar_url.as_deref(), Some("https://a/usera.png"));
        assert_eq!(
            s.preview_image_url.as_deref(),
            Some("https://piczel.tv/screenshots/stream_7.jpg?s=2024-01-01T00:00:00.000Z")
        );
    }

    #[tokio::test]
    async fn test_fetch_live_fails_on_garbage() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond("https://piczel.tv/api/streams", 200, "<html>");
        assert!(source(http).fetch_live(&[]).await.is_err());
    }

    #[test]
    fn test_match_url() {
        let src = source(Arc::new(FakeHttpClient::new()));
        assert_eq!(src.match_url("https://piczel.tv/watch/UserA"), Some("UserA".into()));
        assert_eq!(src.match_url("https://piczel.tv/watch/"), None);
        assert_eq!(src.match_url("https://piczel.tv/UserA"), None);
    }
}

// watchcat-core/src/adapters/picarto.rs

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

pub const NETWORK_ID: &str = "picarto_tv";
const EXPLORE_URL: &str = "https://picarto.tv/process/explore";

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)picarto\.tv/(.*)$").unwrap());

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    #[serde(default)]
    channels: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PicartoChannel {
    id: u64,
    channel_name: String,
    #[serde(default)]
    channel_title: Option<String>,
    #[serde(default)]
    channel_viewers: Option<u64>,
    #[serde(default)]
    adult: Option<bool>,
    #[serde(default)]
    is_multistream: Option<bool>,
    #[serde(default)]
    thumbnail: Option<String>,
}

/// Picarto's explore page lists every live channel in one request.
pub struct PicartoSource {
    http: Arc<dyn HttpClient>,
    poll_interval: Duration,
}

impl PicartoSource {
    pub fn new(http: Arc<dyn HttpClient>, config: &HandlerConfig) -> Self {
        Self {
            http,
            poll_interval: config.poll_interval(),
        }
    }

    fn to_stream(&self, raw: Value) -> Result<Stream, Error> {
        let channel: PicartoChannel = serde_json::from_value(raw.clone())?;
        let url = self.resolve_stream_url(&channel.channel_name);
        let mut stream = Stream::new(channel.id.to_string(), NETWORK_ID, &channel.channel_name, url);
        stream.title = channel.channel_title;
        stream.viewer_count = channel.channel_viewers;
        stream.adult = channel.adult;
        stream.in_multi = channel.is_multistream;
        stream.preview_image_url = channel.thumbnail;
        stream.source = raw;
        Ok(stream)
    }
}

#[async_trait]
impl StreamSource for PicartoSource {
    fn network_id(&self) -> &str {
        NETWORK_ID
    }

    fn display_name(&self) -> &str {
        "Picarto.tv"
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
        format!("https://picarto.tv/{username}")
    }

    async fn fetch_live(&self, _watched: &[String]) -> Result<Vec<Stream>, Error> {
        let response = self
            .http
            .post(
                EXPLORE_URL,
                "initial=".to_string(),
                &[("Content-Type", "application/x-www-form-urlencoded")],
            )
            .await?;
        if !response.is_success() {
            return Err(Error::Platform(format!("picarto explore returned {}", response.status)));
        }

        let explore: ExploreResponse = serde_json::from_str(&response.body)?;
        explore.channels.into_iter().map(|c| self.to_stream(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeHttpClient;

    fn source(http: Arc<FakeHttpClient>) -> PicartoSource {
        PicartoSource::new(http, &HandlerConfig::default())
    }

    #[tokio::test]
    async fn test_fetch_live_maps_channels() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(
            EXPLORE_URL,
            200,
            r#"{"channels":[{"id":42,"channel_name":"Foo","channel_title":"Drawing",
                "channel_viewers":7,"adult":true,"is_multistream":false,
                "thumbnail":"https://thumb/foo.jpg","cat_name":"Art"}]}"#,
        );

        let streams = source(http.clone()).fetch_live(&[]).await.unwrap();
        assert_eq!(streams.len(), 1);
        let s = &streams[0];
        assert_eq!(s.id, "42");
        assert_eq!(s.username, "Foo");
        assert_eq!(s.url, "https://picarto.tv/Foo");
        assert_eq!(s.title.as_deref(), Some("Drawing"));
        assert_eq!(s.viewer_count, Some(7));
        assert_eq!(s.adult, Some(true));
        assert_eq!(s.preview_image_url.as_deref(), Some("https://thumb/foo.jpg"));
        assert_eq!(s.source["cat_name"], "Art");

        let requests = http.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].body.as_deref(), Some("initial="));
    }

    #[tokio::test]
    async fn test_fetch_live_rejects_error_status() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(EXPLORE_URL, 503, "maintenance");
        assert!(source(http).fetch_live(&[]).await.is_err());
    }

    #[test]
    fn test_match_url() {
        let src = source(Arc::new(FakeHttpClient::new()));
        assert_eq!(src.match_url("https://picarto.tv/Foo"), Some("Foo".into()));
        assert_eq!(src.match_url("HTTPS://PICARTO.TV/Foo"), Some("Foo".into()));
        assert_eq!(src.match_url("https://picarto.tv/"), None);
        assert_eq!(src.match_url("https://piczel.tv/watch/foo"), None);
    }
}

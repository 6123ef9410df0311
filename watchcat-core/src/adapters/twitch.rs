// ========================================================
// File: watchcat-core/src/adapters/twitch.rs
// ========================================================
//! Twitch via the Helix "Get Streams" endpoint.
//!
//! Helix can only be asked about named users (at most 100 per request), so
//! this source is scoped to the aggregated watch list. Requests carry an app
//! access token obtained with the client-credentials grant; the token is
//! fetched lazily and re-obtained once when Helix answers 401.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use watchcat_common::models::Stream;

use crate::adapters::{capture_streamer, SourceKind, StreamSource};
use crate::config::HandlerConfig;
use crate::http::{HttpClient, HttpResponse};
use crate::Error;

pub const NETWORK_ID: &str = "twitch_tv";
const HELIX_STREAMS_URL: &str = "https://api.twitch.tv/helix/streams";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const MAX_LOGINS_PER_REQUEST: usize = 100;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)twitch\.tv/([^/?#]+)").unwrap());
static LOGIN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,25}$").unwrap());

/// Response from "Get Streams" endpoint.
#[derive(Debug, Deserialize)]
struct StreamsResponse {
    data: Vec<Value>,
}

/// Single stream data record.
#[derive(Debug, Deserialize)]
struct StreamData {
    id: String,
    user_login: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    viewer_count: Option<u64>,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    is_mature: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct TwitchSource {
    http: Arc<dyn HttpClient>,
    poll_interval: Duration,
    client_id: String,
    client_secret: String,
    access_token: Mutex<Option<String>>,
}

impl TwitchSource {
    pub fn new(http: Arc<dyn HttpClient>, config: &HandlerConfig) -> Result<Self, Error> {
        let (Some(client_id), Some(client_secret)) =
            (config.client_id.clone(), config.client_secret.clone())
        else {
            return Err(Error::Config(
                "twitch_tv requires clientId and clientSecret".to_string(),
            ));
        };

        Ok(Self {
            http,
            poll_interval: config.poll_interval(),
            client_id,
            client_secret,
            access_token: Mutex::new(None),
        })
    }

    /// Client-credentials grant.
    async fn request_token(&self) -> Result<String, Error> {
        let url = Url::parse_with_params(
            TOKEN_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ],
        )
        .map_err(|e| Error::Internal(format!("bad token url: {e}")))?;

        let response = self.http.post(url.as_str(), String::new(), &[]).await?;
        if !response.is_success() {
            return Err(Error::Auth(format!(
                "twitch token request returned {}",
                response.status
            )));
        }
        let token: TokenResponse = serde_json::from_str(&response.body)?;
        info!("Obtained Twitch app access token");
        Ok(token.access_token)
    }

    async fn current_token(&self, refresh: bool) -> Result<String, Error> {
        let mut guard = self.access_token.lock().await;
        if !refresh {
            if let Some(token) = guard.as_ref() {
                return Ok(token.clone());
            }
        }
        let token = self.request_token().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn helix_get(&self, url: &str, token: &str) -> Result<HttpResponse, Error> {
        let bearer = format!("Bearer {token}");
        self.http
            .get(
                url,
                &[("Client-Id", self.client_id.as_str()), ("Authorization", bearer.as_str())],
            )
            .await
    }

    /// GET with the current token, retried once with a fresh token on 401.
    async fn authorized_get(&self, url: &str) -> Result<HttpResponse, Error> {
        let token = self.current_token(false).await?;
        let response = self.helix_get(url, &token).await?;
        if response.status != 401 {
            return Ok(response);
        }

        debug!("Twitch rejected the access token; refreshing");
        let token = self.current_token(true).await?;
        self.helix_get(url, &token).await
    }

    fn to_stream(&self, raw: Value) -> Result<Stream, Error> {
        let data: StreamData = serde_json::from_value(raw.clone())?;
        let url = self.resolve_stream_url(&data.user_login);
        let mut stream = Stream::new(data.id, NETWORK_ID, &data.user_login, url);
        stream.title = data.title;
        stream.viewer_count = data.viewer_count;
        stream.live_since = data.started_at;
        stream.adult = data.is_mature;
        stream.preview_image_url = data
            .thumbnail_url
            .map(|t| t.replace("{width}", "640").replace("{height}", "360"));
        stream.source = raw;
        Ok(stream)
    }
}

#[async_trait]
impl StreamSource for TwitchSource {
    fn network_id(&self) -> &str {
        NETWORK_ID
    }

    fn display_name(&self) -> &str {
        "twitch.tv"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::BulkListing { scoped_to_watch_list: true }
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn match_url(&self, url: &str) -> Option<String> {
        capture_streamer(&URL_PATTERN, url)
    }

    fn resolve_stream_url(&self, username: &str) -> String {
        format!("https://twitch.tv/{username}")
    }

    async fn fetch_live(&self, watched: &[String]) -> Result<Vec<Stream>, Error> {
        // Helix rejects the whole request if any login in it is invalid.
        let (logins, rejected): (Vec<&String>, Vec<&String>) =
            watched.iter().partition(|login| LOGIN_PATTERN.is_match(login));
        if !rejected.is_empty() {
            warn!("Skipping {} malformed Twitch login(s): {:?}", rejected.len(), rejected);
        }

        let mut streams = Vec::new();
        for chunk in logins.chunks(MAX_LOGINS_PER_REQUEST) {
            let params: Vec<(&str, &str)> =
                chunk.iter().map(|login| ("user_login", login.as_str())).collect();
            let url = Url::parse_with_params(HELIX_STREAMS_URL, &params)
                .map_err(|e| Error::Internal(format!("bad helix url: {e}")))?;

            let response = self.authorized_get(url.as_str()).await?;
            if !response.is_success() {
                return Err(Error::Platform(format!(
                    "helix streams returned {}",
                    response.status
                )));
            }

            let parsed: StreamsResponse = serde_json::from_str(&response.body)?;
            for raw in parsed.data {
                streams.push(self.to_stream(raw)?);
            }
        }

        Ok(streams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeHttpClient;

    fn config() -> HandlerConfig {
        HandlerConfig {
            client_id: Some("cid".into()),
            client_secret: Some("secret".into()),
            ..Default::default()
        }
    }

    const STREAM_JSON: &str = r#"{"data":[{"id":"991","user_id":"5","user_login":"foo",
        "user_name":"Foo","game_id":"1","game_name":"Art","type":"live","title":"hello",
        "viewer_count":12,"started_at":"2024-05-01T10:00:00Z","language":"en",
        "thumbnail_url":"https://static/foo-{width}x{height}.jpg","is_mature":false}]}"#;

    #[test]
    fn test_requires_credentials() {
        let http = Arc::new(FakeHttpClient::new());
        assert!(matches!(
            TwitchSource::new(http, &HandlerConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_live_authorizes_and_maps() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(TOKEN_URL, 200, r#"{"access_token":"tok1","expires_in":3600,"token_type":"bearer"}"#);
        http.respond(HELIX_STREAMS_URL, 200, STREAM_JSON);

        let src = TwitchSource::new(http.clone(), &config()).unwrap();
        let streams = src.fetch_live(&["foo".into(), "bar".into()]).await.unwrap();

        assert_eq!(streams.len(), 1);
        let s = &streams[0];
        assert_eq!(s.id, "991");
        assert_eq!(s.username, "foo");
        assert_eq!(s.url, "https://twitch.tv/foo");
        assert_eq!(s.preview_image_url.as_deref(), Some("https://static/foo-640x360.jpg"));
        assert_eq!(s.live_since.as_deref(), Some("2024-05-01T10:00:00Z"));

        let helix: Vec<_> = http
            .requests()
            .into_iter()
            .filter(|r| r.url.starts_with(HELIX_STREAMS_URL))
            .collect();
        assert_eq!(helix.len(), 1);
        assert!(helix[0].url.contains("user_login=foo"));
        assert!(helix[0].url.contains("user_login=bar"));
        assert!(helix[0]
            .headers
            .iter()
            .any(|(k, v)| k == "Authorization" && v == "Bearer tok1"));
    }

    #[tokio::test]
    async fn test_refreshes_token_once_on_unauthorized() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(TOKEN_URL, 200, r#"{"access_token":"tok","expires_in":3600,"token_type":"bearer"}"#);
        http.respond_once(HELIX_STREAMS_URL, 401, r#"{"error":"Unauthorized"}"#);
        http.respond(HELIX_STREAMS_URL, 200, STREAM_JSON);

        let src = TwitchSource::new(http.clone(), &config()).unwrap();
        let streams = src.fetch_live(&["foo".into()]).await.unwrap();
        assert_eq!(streams.len(), 1);

        let token_requests = http
            .requests()
            .iter()
            .filter(|r| r.url.starts_with(TOKEN_URL))
            .count();
        assert_eq!(token_requests, 2);
    }

    #[tokio::test]
    async fn test_large_watch_lists_are_chunked() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(TOKEN_URL, 200, r#"{"access_token":"tok"}"#);
        http.respond(HELIX_STREAMS_URL, 200, r#"{"data":[]}"#);

        let watched: Vec<String> = (0..250).map(|i| format!("user{i}")).collect();
        let src = TwitchSource::new(http.clone(), &config()).unwrap();
        assert!(src.fetch_live(&watched).await.unwrap().is_empty());

        let helix = http
            .requests()
            .iter()
            .filter(|r| r.url.starts_with(HELIX_STREAMS_URL))
            .count();
        assert_eq!(helix, 3);
    }

    #[test]
    fn test_match_url() {
        let src = TwitchSource::new(Arc::new(FakeHttpClient::new()), &config()).unwrap();
        assert_eq!(src.match_url("https://www.twitch.tv/Foo"), Some("Foo".into()));
        assert_eq!(src.match_url("https://twitch.tv/"), None);
        assert_eq!(
            src.match_url("https://www.twitch.tv/foo/videos?filter=all"),
            Some("foo".into())
        );
        assert_eq!(src.match_url("https://twitch.tv/Foo?referrer=raid"), Some("Foo".into()));
    }

    #[tokio::test]
    async fn test_malformed_login_does_not_block_valid_ones() {
        let http = Arc::new(FakeHttpClient::new());
        http.respond(TOKEN_URL, 200, r#"{"access_token":"tok"}"#);
        http.respond(HELIX_STREAMS_URL, 400, r#"{"error":"Bad Request"}"#);
        http.respond(&format!("{HELIX_STREAMS_URL}?user_login=foo"), 200, STREAM_JSON);

        let src = TwitchSource::new(http.clone(), &config()).unwrap();
        let watched = vec!["foo".to_string(), "bar/videos?filter=all".to_string()];
        let streams = src.fetch_live(&watched).await.unwrap();

        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].username, "foo");
        let helix: Vec<_> = http
            .requests()
            .into_iter()
            .filter(|r| r.url.starts_with(HELIX_STREAMS_URL))
            .collect();
        assert_eq!(helix.len(), 1);
        assert!(!helix[0].url.contains("bar"));
    }

    #[tokio::test]
    async fn test_only_malformed_logins_sends_no_request() {
        let http = Arc::new(FakeHttpClient::new());
        let src = TwitchSource::new(http.clone(), &config()).unwrap();

        let streams = src.fetch_live(&["not a login".to_string()]).await.unwrap();
        assert!(streams.is_empty());
        assert!(http.requests().is_empty());
    }
}

// watchcat-core/src/adapters/pomf.rs
//
// Pomf has no listing endpoint. `checklive.php?stream=<user>` answers "1"
// when the user is live, "0" when not, and an empty body for unknown users.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use url::Url;

use watchcat_common::models::Stream;

use crate::adapters::{capture_streamer, SourceKind, StreamSource, UserStatus};
use crate::config::HandlerConfig;
use crate::http::HttpClient;
use crate::Error;

pub const NETWORK_ID: &str = "pomf_tv";
const CHECK_LIVE_URL: &str = "https://pomf.tv/include/checklive.php";

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)pomf\.tv/stream/(.*)$").unwrap());

pub struct PomfSource {
    http: Arc<dyn HttpClient>,
    poll_interval: Duration,
}

impl PomfSource {
    pub fn new(http: Arc<dyn HttpClient>, config: &HandlerConfig) -> Self {
        Self {
            http,
            poll_interval: config.poll_interval(),
        }
    }

    fn online_stream(&self, username: &str) -> Stream {
        // No stable id is exposed, so the username doubles as one.
        let mut stream = Stream::new(username, NETWORK_ID, username, self.resolve_stream_url(username));
        stream.avatar_url = Some(format!("https://pomf.tv/img/stream/{username}.png"));
        stream.source = json!({});
        stream
    }
}

#[async_trait]
impl StreamSource for PomfSource {
    fn network_id(&self) -> &str {
        NETWORK_ID
    }

    fn display_name(&self) -> &str {
        "Pomf.TV"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::PerUserCheck
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn match_url(&self, url: &str) -> Option<String> {
        capture_streamer(&URL_PATTERN, url)
    }

    fn resolve_stream_url(&self, username: &str) -> String {
        format!("https://pomf.tv/stream/{username}")
    }

    async fn check_user(&self, username: &str) -> Result<UserStatus, Error> {
        let url = Url::parse_with_params(CHECK_LIVE_URL, &[("stream", username)])
            .map_err(|e| Error::Internal(format!("bad pomf url: {e}")))?;
        let response = self.http.get(url.as_str(), &[]).await?;
        if !response.is_success() {
            return Err(Error::Platform(format!("pomf checklive returned {}", response.status)));
        }

        let status = match response.body.trim() {
            "1" => UserStatus::Online(self.online_stream(username)),
            "0" => UserStatus::Offline,
            "" => UserStatus::Unknown,
            other => UserStatus::Unrecognized(other.to_string()),
        };
        Ok(status)
    }
}

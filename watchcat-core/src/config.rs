// watchcat-core/src/config.rs
//
// The JSON config file: which handlers to load and their settings.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::DEFAULT_POLL_INTERVAL;
use crate::http::DEFAULT_USER_AGENT;
use crate::Error;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerConfig {
    /// Milliseconds between two polls.
    #[serde(default)]
    pub poll_interval: Option<u64>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl HandlerConfig {
    pub fn poll_interval(&self) -> Duration {
        match self.poll_interval {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchcatConfig {
    /// Handlers to load, keyed by network id.
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerConfig>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl WatchcatConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn handler(&self, network_id: &str) -> Option<&HandlerConfig> {
        self.handlers.get(network_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_camel_case_handler_settings() {
        let cfg = WatchcatConfig::from_json(
            r#"{
                "handlers": {
                    "piczel_tv": { "pollInterval": 60000 },
                    "twitch_tv": { "clientId": "abc", "clientSecret": "shh" }
                },
                "userAgent": "test agent"
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.user_agent(), "test agent");
        assert_eq!(cfg.handler("piczel_tv").unwrap().poll_interval(), Duration::from_secs(60));

        let twitch = cfg.handler("twitch_tv").unwrap();
        assert_eq!(twitch.client_id.as_deref(), Some("abc"));
        assert_eq!(twitch.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(cfg.handler("pomf_tv").is_none());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = WatchcatConfig::from_json("{}").unwrap();
        assert!(cfg.handlers.is_empty());
        assert_eq!(cfg.user_agent(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_malformed_config_is_a_config_error() {
        let err = WatchcatConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let err = WatchcatConfig::load("/nonexistent/watchcat.json").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("cannot read")));
    }
}

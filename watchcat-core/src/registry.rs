// ========================================================
// File: watchcat-core/src/registry.rs
// ========================================================
//! Loaded stream adapters, in registration order.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use watchcat_common::traits::repository_traits::{GuildRepository, SnapshotRepository};

use crate::adapters::picarto::PicartoSource;
use crate::adapters::piczel::PiczelSource;
use crate::adapters::pomf::PomfSource;
use crate::adapters::twitch::TwitchSource;
use crate::adapters::{picarto, piczel, pomf, twitch, StreamAdapter, StreamSource};
use crate::config::{HandlerConfig, WatchcatConfig};
use crate::http::HttpClient;
use crate::services::dispatcher::{Dispatcher, NotificationHooks};
use crate::Error;

/// Built-in networks, in the order they are registered.
pub const BUILTIN_NETWORKS: [&str; 4] = [
    picarto::NETWORK_ID,
    piczel::NETWORK_ID,
    twitch::NETWORK_ID,
    pomf::NETWORK_ID,
];

/// A URL that some adapter recognized.
#[derive(Clone)]
pub struct ResolvedUrl {
    pub adapter: Arc<StreamAdapter>,
    pub streamer_id: String,
}

#[derive(Default)]
pub struct HandlerRegistry {
    adapters: Vec<Arc<StreamAdapter>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: StreamAdapter) -> Result<Arc<StreamAdapter>, Error> {
        if self.get(adapter.id()).is_some() {
            return Err(Error::Config(format!("handler {} registered twice", adapter.id())));
        }
        let adapter = Arc::new(adapter);
        self.adapters.push(Arc::clone(&adapter));
        Ok(adapter)
    }

    pub fn get(&self, network_id: &str) -> Option<Arc<StreamAdapter>> {
        self.adapters.iter().find(|a| a.id() == network_id).cloned()
    }

    pub fn loaded(&self) -> &[Arc<StreamAdapter>] {
        &self.adapters
    }

    /// First adapter, in registration order, whose pattern matches.
    pub fn resolve_url(&self, url: &str) -> Option<ResolvedUrl> {
        self.adapters.iter().find_map(|adapter| {
            adapter.match_url(url).map(|streamer_id| ResolvedUrl {
                adapter: Arc::clone(adapter),
                streamer_id,
            })
        })
    }

    /// Resumes every adapter and starts its polling loop with events routed
    /// to `dispatcher`.
    pub async fn activate_all(&self, dispatcher: Arc<Dispatcher>) -> Vec<JoinHandle<()>> {
        let hooks = Arc::new(NotificationHooks::new(dispatcher));
        let mut handles = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            handles.push(adapter.activate(hooks.clone()).await);
        }
        handles
    }
}

fn build_source(
    network_id: &str,
    http: Arc<dyn HttpClient>,
    config: &HandlerConfig,
) -> Result<Arc<dyn StreamSource>, Error> {
    let source: Arc<dyn StreamSource> = match network_id {
        picarto::NETWORK_ID => Arc::new(PicartoSource::new(http, config)),
        piczel::NETWORK_ID => Arc::new(PiczelSource::new(http, config)),
        twitch::NETWORK_ID => Arc::new(TwitchSource::new(http, config)?),
        pomf::NETWORK_ID => Arc::new(PomfSource::new(http, config)),
        other => return Err(Error::Config(format!("unknown handler {other}"))),
    };
    Ok(source)
}

/// Registers the built-in handlers that appear in the config file.
pub fn build_registry(
    config: &WatchcatConfig,
    http: Arc<dyn HttpClient>,
    guilds: Arc<dyn GuildRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
) -> Result<HandlerRegistry, Error> {
    for id in config.handlers.keys() {
        if !BUILTIN_NETWORKS.contains(&id.as_str()) {
            warn!("Ignoring unknown handler '{}' in config", id);
        }
    }

    let mut registry = HandlerRegistry::new();
    for network_id in BUILTIN_NETWORKS {
        let Some(handler_config) = config.handler(network_id) else {
            continue;
        };
        let source = build_source(network_id, Arc::clone(&http), handler_config)?;
        registry.register(StreamAdapter::new(source, Arc::clone(&guilds), Arc::clone(&snapshots)))?;
        info!("Registered handler {}", network_id);
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeHttpClient, InMemoryGuildRepository, InMemorySnapshotRepository, ScriptedSource};

    fn adapter(source: ScriptedSource) -> StreamAdapter {
        StreamAdapter::new(
            Arc::new(source),
            Arc::new(InMemoryGuildRepository::default()),
            Arc::new(InMemorySnapshotRepository::default()),
        )
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = HandlerRegistry::new();
        registry.register(adapter(ScriptedSource::bulk("net_a"))).unwrap();
        assert!(registry.register(adapter(ScriptedSource::bulk("net_a"))).is_err());
        assert_eq!(registry.loaded().len(), 1);
    }

    #[test]
    fn test_build_registry_respects_builtin_order_and_config() {
        let config = WatchcatConfig::from_json(
            r#"{"handlers": {
                "pomf_tv": {},
                "picarto_tv": {},
                "twitch_tv": {"clientId": "a", "clientSecret": "b"},
                "mystery_tv": {}
            }}"#,
        )
        .unwrap();

        let registry = build_registry(
            &config,
            Arc::new(FakeHttpClient::new()),
            Arc::new(InMemoryGuildRepository::default()),
            Arc::new(InMemorySnapshotRepository::default()),
        )
        .unwrap();

        let ids: Vec<&str> = registry.loaded().iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec!["picarto_tv", "twitch_tv", "pomf_tv"]);
    }

    #[test]
    fn test_build_registry_fails_without_twitch_credentials() {
        let config = WatchcatConfig::from_json(r#"{"handlers": {"twitch_tv": {}}}"#).unwrap();
        let result = build_registry(
            &config,
            Arc::new(FakeHttpClient::new()),
            Arc::new(InMemoryGuildRepository::default()),
            Arc::new(InMemorySnapshotRepository::default()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

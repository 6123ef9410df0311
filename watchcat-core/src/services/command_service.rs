use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use watchcat_common::models::{normalize_username, ChannelRef, NotificationCard};
use watchcat_common::traits::repository_traits::GuildRepository;

use crate::platforms::ChatGateway;
use crate::registry::HandlerRegistry;
use crate::services::card::build_card;
use crate::services::dispatcher::Dispatcher;
use crate::Error;

/// Outcome of a `watch` / `unwatch` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchReport {
    /// Watch list entries actually added (or removed).
    pub changed: usize,
    /// Entries that were already present (or already absent).
    pub unchanged: usize,
    /// Arguments no handler recognized.
    pub unmatched: Vec<String>,
}

impl WatchReport {
    /// True when none of the arguments was a recognized stream URL.
    pub fn nothing_matched(&self) -> bool {
        self.changed + self.unchanged == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedUser {
    pub username: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub network_name: String,
    pub channel_id: Option<String>,
    pub ping_role_id: Option<String>,
    pub online: Vec<WatchedUser>,
    pub offline: Vec<WatchedUser>,
}

impl StatusReport {
    pub fn is_watching_anyone(&self) -> bool {
        !(self.online.is_empty() && self.offline.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardLookup {
    Unmatched,
    Offline,
    Card(NotificationCard),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelChange {
    pub channel: ChannelRef,
    /// Notifications retracted from the previous channel.
    pub purged: usize,
}

/// Guild-level operations behind the chat commands.
pub struct CommandService {
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<Dispatcher>,
    guilds: Arc<dyn GuildRepository>,
    chat: Arc<dyn ChatGateway>,
}

impl CommandService {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        dispatcher: Arc<Dispatcher>,
        guilds: Arc<dyn GuildRepository>,
        chat: Arc<dyn ChatGateway>,
    ) -> Self {
        debug!("Initializing CommandService");
        Self {
            registry,
            dispatcher,
            guilds,
            chat,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Adds every recognized URL to the guild's watch list and announces
    /// streamers that are already live.
    pub async fn watch(&self, guild_id: &str, urls: &[String]) -> Result<WatchReport, Error> {
        let mut report = WatchReport::default();
        let mut seen = HashSet::new();

        for url in dedupe(urls) {
            let Some(resolved) = self.registry.resolve_url(url) else {
                report.unmatched.push(url.to_string());
                continue;
            };
            let adapter = &resolved.adapter;
            if !seen.insert((adapter.id().to_string(), normalize_username(&resolved.streamer_id))) {
                continue;
            }

            if self.guilds.watch(guild_id, adapter.id(), &resolved.streamer_id).await? {
                report.changed += 1;
            } else {
                report.unchanged += 1;
            }

            if let Err(e) = self
                .dispatcher
                .announce_deferred(guild_id, adapter, &resolved.streamer_id)
                .await
            {
                warn!(
                    "Deferred announce of {} in guild {} failed: {}",
                    resolved.streamer_id, guild_id, e
                );
            }
        }

        info!(
            "Guild {} watch: {} added, {} already present, {} unmatched",
            guild_id,
            report.changed,
            report.unchanged,
            report.unmatched.len()
        );
        Ok(report)
    }

    /// Removes every recognized URL from the guild's watch list and retracts
    /// its notification.
    pub async fn unwatch(&self, guild_id: &str, urls: &[String]) -> Result<WatchReport, Error> {
        let mut report = WatchReport::default();
        let mut seen = HashSet::new();

        for url in dedupe(urls) {
            let Some(resolved) = self.registry.resolve_url(url) else {
                report.unmatched.push(url.to_string());
                continue;
            };
            let adapter = &resolved.adapter;
            if !seen.insert((adapter.id().to_string(), normalize_username(&resolved.streamer_id))) {
                continue;
            }

            self.dispatcher
                .unannounce(guild_id, adapter.id(), &resolved.streamer_id)
                .await?;

            if self.guilds.unwatch(guild_id, adapter.id(), &resolved.streamer_id).await? {
                report.changed += 1;
            } else {
                report.unchanged += 1;
            }
        }

        info!(
            "Guild {} unwatch: {} removed, {} not present, {} unmatched",
            guild_id,
            report.changed,
            report.unchanged,
            report.unmatched.len()
        );
        Ok(report)
    }

    /// Points the guild's notifications at `channel_id`, retracting what was
    /// posted in the previous channel.
    pub async fn use_channel(&self, guild_id: &str, channel_id: &str) -> Result<ChannelChange, Error> {
        let channel = self.chat.resolve_channel(channel_id).await?;
        if channel.guild_id != guild_id {
            return Err(Error::NotFound(format!("channel {channel_id} in guild {guild_id}")));
        }

        let previous = self.guilds.get(guild_id).await?.and_then(|g| g.channel_id);
        let mut purged = 0;
        if let Some(previous) = previous.filter(|p| p != channel_id) {
            purged = match self.dispatcher.purge_for_channel(&previous).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Failed to purge previous channel {}: {}", previous, e);
                    0
                }
            };
        }

        self.guilds.set_channel(guild_id, &channel.channel_id).await?;
        info!("Guild {} now posts to #{} ({})", guild_id, channel.name, channel.channel_id);
        Ok(ChannelChange { channel, purged })
    }

    pub async fn grant(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        self.guilds.grant(guild_id, role_id).await
    }

    pub async fn revoke(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        self.guilds.revoke(guild_id, role_id).await
    }

    pub async fn set_ping_role(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        self.guilds.set_ping_role(guild_id, role_id).await
    }

    pub async fn unset_ping_role(&self, guild_id: &str) -> Result<bool, Error> {
        self.guilds.unset_ping_role(guild_id).await
    }

    /// Role ids with admin privileges.
    pub async fn admins(&self, guild_id: &str) -> Result<Vec<String>, Error> {
        let config = self.guilds.get(guild_id).await?;
        Ok(config
            .map(|g| g.admin_role_ids.into_iter().collect())
            .unwrap_or_default())
    }

    /// The guild's watch list on one network, split by who is live right now.
    pub async fn status(&self, guild_id: &str, network_id: &str) -> Result<StatusReport, Error> {
        let adapter = self
            .registry
            .get(network_id)
            .ok_or_else(|| Error::NotFound(format!("network {network_id}")))?;
        let config = self.guilds.get(guild_id).await?.unwrap_or_default();

        let (online, offline): (Vec<String>, Vec<String>) = config
            .watched(network_id)
            .into_iter()
            .partition(|u| adapter.cached_stream(u).is_some());
        let to_users = |names: Vec<String>| -> Vec<WatchedUser> {
            names
                .into_iter()
                .map(|username| WatchedUser {
                    url: adapter.resolve_stream_url(&username),
                    username,
                })
                .collect()
        };

        Ok(StatusReport {
            network_name: adapter.name().to_string(),
            channel_id: config.channel_id,
            ping_role_id: config.ping_role_id,
            online: to_users(online),
            offline: to_users(offline),
        })
    }

    /// Retracts every notification in the guild.
    pub async fn purge(&self, guild_id: &str) -> Result<usize, Error> {
        self.dispatcher.purge_for_guild(guild_id).await
    }

    /// Forgets a guild the bot was removed from.
    pub async fn remove_guild(&self, guild_id: &str) -> Result<(), Error> {
        info!("Removed from guild {} -- removing data.", guild_id);
        self.guilds.delete(guild_id).await?;
        self.dispatcher.purge_for_guild(guild_id).await?;
        Ok(())
    }

    /// `(network name, streamer id)` of the first handler matching `url`.
    pub fn match_url(&self, url: &str) -> Option<(String, String)> {
        self.registry
            .resolve_url(url)
            .map(|r| (r.adapter.name().to_string(), r.streamer_id))
    }

    /// Renders the card the bot would post right now for `url`.
    pub fn card(&self, url: &str) -> CardLookup {
        let Some(resolved) = self.registry.resolve_url(url) else {
            return CardLookup::Unmatched;
        };
        match resolved.adapter.cached_stream(&resolved.streamer_id) {
            Some(stream) => CardLookup::Card(build_card(resolved.adapter.name(), &stream)),
            None => CardLookup::Offline,
        }
    }

    /// `(name, id)` of every loaded handler.
    pub fn handlers(&self) -> Vec<(String, String)> {
        self.registry
            .loaded()
            .iter()
            .map(|a| (a.name().to_string(), a.id().to_string()))
            .collect()
    }
}

/// Drops repeated arguments, keeping the first occurrence.
fn dedupe(args: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    args.iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty() && seen.insert(*a))
        .collect()
}

// File: src/services/dispatcher.rs

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use watchcat_common::models::{normalize_username, ChannelRef, ManagedMessage, Stream};
use watchcat_common::traits::repository_traits::{GuildRepository, ManagedMessageRepository};

use crate::adapters::{StreamAdapter, StreamEvents};
use crate::platforms::ChatGateway;
use crate::services::card::build_card;
use crate::Error;

/// `(guild, network, lower-cased streamer)`
type TargetKey = (String, String, String);

/// Turns stream events and watch changes into chat messages and keeps at
/// most one live notification per guild, network and streamer.
pub struct Dispatcher {
    chat: Arc<dyn ChatGateway>,
    guilds: Arc<dyn GuildRepository>,
    messages: Arc<dyn ManagedMessageRepository>,
    locks: DashMap<TargetKey, Arc<Mutex<()>>>,
}

impl Dispatcher {
    pub fn new(
        chat: Arc<dyn ChatGateway>,
        guilds: Arc<dyn GuildRepository>,
        messages: Arc<dyn ManagedMessageRepository>,
    ) -> Self {
        Self {
            chat,
            guilds,
            messages,
            locks: DashMap::new(),
        }
    }

    fn target_key(guild_id: &str, network_id: &str, stream_id: &str) -> TargetKey {
        (guild_id.to_string(), network_id.to_string(), normalize_username(stream_id))
    }

    fn target_lock(&self, key: &TargetKey) -> Arc<Mutex<()>> {
        self.locks.entry(key.clone()).or_default().clone()
    }

    /// Drops the map entry once nobody but the map and `lock` holds it.
    /// Must be called after the guard is released.
    fn release_target(&self, key: &TargetKey, lock: Arc<Mutex<()>>) {
        self.locks
            .remove_if(key, |_, held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2);
    }

    #[cfg(test)]
    pub(crate) fn tracked_targets(&self) -> usize {
        self.locks.len()
    }

    /// Retracts the notification for one target, if there is one.
    ///
    /// Safe to call any number of times; only the call that removes the
    /// record deletes the chat message.
    pub async fn unannounce(
        &self,
        guild_id: &str,
        network_id: &str,
        stream_id: &str,
    ) -> Result<Option<ManagedMessage>, Error> {
        let key = Self::target_key(guild_id, network_id, stream_id);
        let lock = self.target_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.unannounce_locked(guild_id, network_id, stream_id).await
        };
        self.release_target(&key, lock);
        result
    }

    async fn unannounce_locked(
        &self,
        guild_id: &str,
        network_id: &str,
        stream_id: &str,
    ) -> Result<Option<ManagedMessage>, Error> {
        let Some(previous) = self.messages.take(guild_id, network_id, stream_id).await? else {
            return Ok(None);
        };

        info!("Cleared existing notify for user {}", previous.stream_id);
        match self.chat.delete_message(&previous.channel_id, &previous.message_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Message {} was already gone", previous.message_id);
            }
            Err(e) => {
                warn!(
                    "Failed to delete message {} in channel {}: {}",
                    previous.message_id, previous.channel_id, e
                );
            }
        }
        Ok(Some(previous))
    }

    /// Posts the notification for `stream` in `channel`, replacing any
    /// earlier one for the same target.
    ///
    /// When the guild has a ping role a mention is posted and removed again
    /// in the background. Nothing is recorded if the card cannot be sent.
    pub async fn announce_to_channel(
        &self,
        adapter: &StreamAdapter,
        stream: &Stream,
        channel: &ChannelRef,
    ) -> Result<ManagedMessage, Error> {
        let key = Self::target_key(&channel.guild_id, adapter.id(), &stream.username);
        let lock = self.target_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.announce_locked(adapter, stream, channel).await
        };
        self.release_target(&key, lock);
        result
    }

    async fn announce_locked(
        &self,
        adapter: &StreamAdapter,
        stream: &Stream,
        channel: &ChannelRef,
    ) -> Result<ManagedMessage, Error> {
        self.unannounce_locked(&channel.guild_id, adapter.id(), &stream.username).await?;

        let guild = self.guilds.get(&channel.guild_id).await?;
        if let Some(role_id) = guild.and_then(|g| g.ping_role_id) {
            info!(
                "Ping role enabled for #{}, sending ping message for role {}",
                channel.name, role_id
            );
            self.spawn_ping(channel, format!("{} is live! <@&{}>", stream.username, role_id));
        }

        let card = build_card(adapter.name(), stream);
        let message_id = self.chat.send_card(&channel.channel_id, &card).await?;
        info!(
            "Announced {} in guild {} - #{} ({})",
            stream.username, channel.guild_id, channel.name, message_id
        );

        let record = ManagedMessage::new(
            &channel.channel_id,
            &message_id,
            &channel.guild_id,
            adapter.id(),
            &stream.username,
        );
        self.messages.insert(&record).await?;
        Ok(record)
    }

    fn spawn_ping(&self, channel: &ChannelRef, content: String) {
        let chat = Arc::clone(&self.chat);
        let channel = channel.clone();
        tokio::spawn(async move {
            match chat.send_text(&channel.channel_id, &content).await {
                Ok(message_id) => {
                    debug!("Ping message created in #{} ({}). Cleaning up...", channel.name, message_id);
                    if let Err(e) = chat.delete_message(&channel.channel_id, &message_id).await {
                        warn!("Failed to clean up ping message {}: {}", message_id, e);
                    }
                }
                Err(e) => warn!("Failed to send ping message to #{}: {}", channel.name, e),
            }
        });
    }

    /// Announces `stream` in every configured guild that watches it.
    /// Returns how many guilds got a notification.
    pub async fn announce_to_all(&self, adapter: &StreamAdapter, stream: &Stream) -> Result<usize, Error> {
        let guilds = self.guilds.list_watching(adapter.id(), &stream.username).await?;

        let announcements = guilds.into_iter().map(|guild| async move {
            let Some(channel_id) = guild.channel_id.as_deref() else {
                info!(
                    "Guild {} watches {} but has no channel configured; skipping",
                    guild.guild_id, stream.username
                );
                return false;
            };

            let channel = match self.chat.resolve_channel(channel_id).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(
                        "Guild {} tried to announce to channel {}, but it could not be resolved: {}",
                        guild.guild_id, channel_id, e
                    );
                    return false;
                }
            };

            match self.announce_to_channel(adapter, stream, &channel).await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Failed to announce {} in guild {}: {}", stream.username, guild.guild_id, e);
                    false
                }
            }
        });

        let announced = join_all(announcements).await.into_iter().filter(|ok| *ok).count();
        Ok(announced)
    }

    /// Announces a streamer that was just watched if they are already live.
    pub async fn announce_deferred(
        &self,
        guild_id: &str,
        adapter: &StreamAdapter,
        username: &str,
    ) -> Result<Option<ManagedMessage>, Error> {
        let Some(stream) = adapter.cached_stream(username) else {
            return Ok(None);
        };

        let channel_id = self.guilds.get(guild_id).await?.and_then(|g| g.channel_id);
        let Some(channel_id) = channel_id else {
            info!("Guild {} tried to announce, but no channel is configured!", guild_id);
            return Ok(None);
        };

        let channel = match self.chat.resolve_channel(&channel_id).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(
                    "Guild {} tried to announce to channel {}, but there was an error resolving this channel: {}",
                    guild_id, channel_id, e
                );
                return Ok(None);
            }
        };

        self.announce_to_channel(adapter, &stream, &channel).await.map(Some)
    }

    async fn purge_all(&self, records: Vec<ManagedMessage>) -> usize {
        let mut purged = 0;
        for record in records {
            match self
                .unannounce(&record.guild_id, &record.network_id, &record.stream_id)
                .await
            {
                Ok(Some(_)) => purged += 1,
                Ok(None) => {}
                Err(e) => warn!("Failed to purge managed message {}: {}", record.message_id, e),
            }
        }
        purged
    }

    /// Retracts every notification of one streamer, across all guilds.
    pub async fn purge_for_streamer(&self, network_id: &str, stream_id: &str) -> Result<usize, Error> {
        let records = self.messages.find_for_streamer(network_id, stream_id).await?;
        Ok(self.purge_all(records).await)
    }

    pub async fn purge_for_channel(&self, channel_id: &str) -> Result<usize, Error> {
        let records = self.messages.find_for_channel(channel_id).await?;
        Ok(self.purge_all(records).await)
    }

    pub async fn purge_for_guild(&self, guild_id: &str) -> Result<usize, Error> {
        let records = self.messages.find_for_guild(guild_id).await?;
        Ok(self.purge_all(records).await)
    }
}

/// Routes adapter events to the dispatcher.
pub struct NotificationHooks {
    dispatcher: Arc<Dispatcher>,
}

impl NotificationHooks {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl StreamEvents for NotificationHooks {
    async fn started(&self, adapter: &StreamAdapter, stream: &Stream) {
        if let Err(e) = self.dispatcher.announce_to_all(adapter, stream).await {
            warn!(network = %adapter.name(), "Failed to announce {}: {}", stream.username, e);
        }
    }

    async fn stopped(&self, adapter: &StreamAdapter, stream: &Stream) {
        if let Err(e) = self.dispatcher.purge_for_streamer(adapter.id(), &stream.username).await {
            warn!(network = %adapter.name(), "Failed to purge {}: {}", stream.username, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockChatGateway;
    use crate::test_utils::{
        stream, InMemoryGuildRepository, InMemoryManagedMessageRepository, InMemorySnapshotRepository,
        ScriptedSource,
    };
    use mockall::predicate::eq;

    fn adapter(guilds: Arc<InMemoryGuildRepository>) -> StreamAdapter {
        StreamAdapter::new(
            Arc::new(ScriptedSource::bulk("test_net")),
            guilds,
            Arc::new(InMemorySnapshotRepository::default()),
        )
    }

    fn channel(id: &str, guild: &str) -> ChannelRef {
        ChannelRef {
            channel_id: id.into(),
            guild_id: guild.into(),
            name: format!("chan-{id}"),
        }
    }

    #[tokio::test]
    async fn test_failed_send_records_nothing() {
        let guilds = Arc::new(InMemoryGuildRepository::default());
        let messages = Arc::new(InMemoryManagedMessageRepository::default());

        let mut chat = MockChatGateway::new();
        chat.expect_send_card()
            .times(1)
            .returning(|_, _| Err(Error::Platform("missing permissions".into())));

        let dispatcher = Dispatcher::new(Arc::new(chat), guilds.clone(), messages.clone());
        let adapter = adapter(guilds);
        let s = stream("test_net", "1", "Foo");

        let result = dispatcher.announce_to_channel(&adapter, &s, &channel("c1", "g1")).await;
        assert!(result.is_err());
        assert!(messages.all().is_empty());
    }

    #[tokio::test]
    async fn test_reannounce_replaces_previous_message() {
        let guilds = Arc::new(InMemoryGuildRepository::default());
        let messages = Arc::new(InMemoryManagedMessageRepository::default());

        let mut chat = MockChatGateway::new();
        let mut next_id = 0;
        chat.expect_send_card().times(2).returning(move |_, _| {
            next_id += 1;
            Ok(format!("m{next_id}"))
        });
        chat.expect_delete_message()
            .with(eq("c1"), eq("m1"))
            .times(1)
            .returning(|_, _| Ok(()));

        let dispatcher = Dispatcher::new(Arc::new(chat), guilds.clone(), messages.clone());
        let adapter = adapter(guilds);
        let s = stream("test_net", "1", "Foo");

        dispatcher.announce_to_channel(&adapter, &s, &channel("c1", "g1")).await.unwrap();
        let second = dispatcher.announce_to_channel(&adapter, &s, &channel("c1", "g1")).await.unwrap();

        let records = messages.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, "m2");
        assert_eq!(second.stream_id, "foo");
    }

    #[tokio::test]
    async fn test_unannounce_tolerates_already_deleted_message() {
        let guilds = Arc::new(InMemoryGuildRepository::default());
        let messages = Arc::new(InMemoryManagedMessageRepository::default());
        messages
            .insert(&ManagedMessage::new("c1", "m1", "g1", "test_net", "Foo"))
            .await
            .unwrap();

        let mut chat = MockChatGateway::new();
        chat.expect_delete_message()
            .times(1)
            .returning(|_, _| Err(Error::NotFound("Unknown Message".into())));

        let dispatcher = Dispatcher::new(Arc::new(chat), guilds, messages.clone());

        let first = dispatcher.unannounce("g1", "test_net", "FOO").await.unwrap();
        assert!(first.is_some());
        let second = dispatcher.unannounce("g1", "test_net", "foo").await.unwrap();
        assert!(second.is_none());
        assert!(messages.all().is_empty());
    }

    #[tokio::test]
    async fn test_target_locks_are_released_after_use() {
        let guilds = Arc::new(InMemoryGuildRepository::default());
        let messages = Arc::new(InMemoryManagedMessageRepository::default());

        let mut chat = MockChatGateway::new();
        chat.expect_send_card().returning(|_, _| Ok("m1".to_string()));
        chat.expect_delete_message().returning(|_, _| Ok(()));

        let dispatcher = Dispatcher::new(Arc::new(chat), guilds.clone(), messages.clone());
        let adapter = adapter(guilds);
        let s = stream("test_net", "1", "Foo");

        dispatcher.announce_to_channel(&adapter, &s, &channel("c1", "g1")).await.unwrap();
        assert_eq!(dispatcher.tracked_targets(), 0);

        for user in ["never", "announced", "here"] {
            assert!(dispatcher.unannounce("g1", "test_net", user).await.unwrap().is_none());
        }
        dispatcher.unannounce("g1", "test_net", "foo").await.unwrap();
        assert_eq!(dispatcher.tracked_targets(), 0);
        assert!(messages.all().is_empty());
    }
}

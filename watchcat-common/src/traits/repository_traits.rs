use async_trait::async_trait;
use crate::error::Error;
use crate::models::{GuildConfig, ManagedMessage, Stream};

/// Per-guild configuration store.
///
/// Every mutation is an upsert: the guild row is created on first write.
/// Set-membership mutations return `true` only when the set actually changed,
/// so adding an entry that is already present reports `false`.
#[async_trait]
pub trait GuildRepository: Send + Sync {
    async fn get(&self, guild_id: &str) -> Result<Option<GuildConfig>, Error>;

    /// Returns `true` if the stored channel changed.
    async fn set_channel(&self, guild_id: &str, channel_id: &str) -> Result<bool, Error>;

    async fn set_ping_role(&self, guild_id: &str, role_id: &str) -> Result<bool, Error>;
    async fn unset_ping_role(&self, guild_id: &str) -> Result<bool, Error>;

    async fn grant(&self, guild_id: &str, role_id: &str) -> Result<bool, Error>;
    async fn revoke(&self, guild_id: &str, role_id: &str) -> Result<bool, Error>;

    /// `username` is lower-cased before it is stored.
    async fn watch(&self, guild_id: &str, network_id: &str, username: &str) -> Result<bool, Error>;
    async fn unwatch(&self, guild_id: &str, network_id: &str, username: &str) -> Result<bool, Error>;

    /// Returns `true` if a guild row was removed.
    async fn delete(&self, guild_id: &str) -> Result<bool, Error>;

    /// Every guild whose watch list for `network_id` contains `username`
    /// (case-insensitive).
    async fn list_watching(&self, network_id: &str, username: &str) -> Result<Vec<GuildConfig>, Error>;

    /// Union of all guilds' watch lists for one network, sorted and
    /// de-duplicated.
    async fn global_watch_list(&self, network_id: &str) -> Result<Vec<String>, Error>;
}

/// Store of notifications that are currently posted.
#[async_trait]
pub trait ManagedMessageRepository: Send + Sync {
    async fn insert(&self, message: &ManagedMessage) -> Result<(), Error>;

    /// Atomically removes and returns the record for one target, matching
    /// `stream_id` case-insensitively.
    async fn take(
        &self,
        guild_id: &str,
        network_id: &str,
        stream_id: &str,
    ) -> Result<Option<ManagedMessage>, Error>;

    async fn find_for_streamer(&self, network_id: &str, stream_id: &str) -> Result<Vec<ManagedMessage>, Error>;
    async fn find_for_channel(&self, channel_id: &str) -> Result<Vec<ManagedMessage>, Error>;
    async fn find_for_guild(&self, guild_id: &str) -> Result<Vec<ManagedMessage>, Error>;
}

/// Last known live snapshot per network, so polling can resume after a
/// restart without re-announcing everybody.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn load(&self, network_id: &str) -> Result<Vec<Stream>, Error>;
    async fn save(&self, network_id: &str, streams: &[Stream]) -> Result<(), Error>;
}

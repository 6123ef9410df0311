// File: watchcat-common/src/models/guild.rs

use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};

/// Per-network watch list of one guild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkWatchList {
    /// Lower-cased usernames.
    pub watched_usernames: BTreeSet<String>,
}

/// Configuration for one chat server.
///
/// A guild without `channel_id` is unconfigured and never receives
/// notifications, even if it watches streamers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: String,
    pub channel_id: Option<String>,
    pub admin_role_ids: BTreeSet<String>,
    pub ping_role_id: Option<String>,
    pub networks: BTreeMap<String, NetworkWatchList>,
}

impl GuildConfig {
    pub fn new(guild_id: &str) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            ..Default::default()
        }
    }

    pub fn watched(&self, network_id: &str) -> Vec<String> {
        self.networks
            .get(network_id)
            .map(|n| n.watched_usernames.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_watching(&self, network_id: &str, username: &str) -> bool {
        let username = crate::models::normalize_username(username);
        self.networks
            .get(network_id)
            .map(|n| n.watched_usernames.contains(&username))
            .unwrap_or(false)
    }

    pub fn is_admin_role(&self, role_id: &str) -> bool {
        self.admin_role_ids.contains(role_id)
    }
}

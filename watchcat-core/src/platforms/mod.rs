// File: src/platforms/mod.rs

use async_trait::async_trait;
use watchcat_common::models::{ChannelRef, NotificationCard};
use crate::Error;

/// What the notification engine needs from a chat platform.
///
/// Ids are the platform's own ids carried as strings. Message-sending
/// methods return the id of the created message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn resolve_channel(&self, channel_id: &str) -> Result<ChannelRef, Error>;
    async fn send_text(&self, channel_id: &str, content: &str) -> Result<String, Error>;
    async fn send_card(&self, channel_id: &str, card: &NotificationCard) -> Result<String, Error>;
    /// Fails with [`Error::NotFound`] when the message or channel is gone.
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), Error>;
}

pub mod discord;

// File: watchcat-core/src/platforms/discord/gateway.rs

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use twilight_http::error::ErrorType;
use twilight_http::Client as HttpClient;
use twilight_model::channel::message::Embed;
use twilight_model::id::Id;
use twilight_model::util::Timestamp;
use twilight_util::builder::embed::{EmbedAuthorBuilder, EmbedBuilder, EmbedFooterBuilder, ImageSource};

use watchcat_common::models::{ChannelRef, NotificationCard};

use crate::platforms::ChatGateway;
use crate::Error;

/// Embed colour of notification cards.
pub const CARD_COLOR: u32 = 0x9B59B6;

pub(crate) fn parse_id<T>(raw: &str) -> Result<Id<T>, Error> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .and_then(Id::new_checked)
        .ok_or_else(|| Error::Parse(format!("invalid Discord id: {raw}")))
}

/// 404s become [`Error::NotFound`], everything else [`Error::Platform`].
pub(crate) fn map_http_error(e: twilight_http::Error, what: &str) -> Error {
    if let ErrorType::Response { status, .. } = e.kind() {
        if status.get() == 404 {
            return Error::NotFound(what.to_string());
        }
    }
    Error::Platform(format!("{what}: {e}"))
}

pub fn render_card(card: &NotificationCard) -> Result<Embed, Error> {
    let mut builder = EmbedBuilder::new()
        .title(card.title.clone())
        .url(card.url.clone())
        .color(CARD_COLOR)
        .author(EmbedAuthorBuilder::new(card.author.clone()).url(card.url.clone()))
        .footer(EmbedFooterBuilder::new(card.footer.clone()));

    if let Some(thumbnail) = &card.thumbnail_url {
        let source = ImageSource::url(thumbnail.clone())
            .map_err(|e| Error::Parse(format!("thumbnail url: {e}")))?;
        builder = builder.thumbnail(source);
    }
    if let Some(image) = &card.image_url {
        let source = ImageSource::url(image.clone())
            .map_err(|e| Error::Parse(format!("image url: {e}")))?;
        builder = builder.image(source);
    }
    if let Some(ts) = card.timestamp {
        let ts = Timestamp::from_secs(ts.timestamp())
            .map_err(|e| Error::Parse(format!("timestamp: {e}")))?;
        builder = builder.timestamp(ts);
    }

    builder
        .validate()
        .map(|b| b.build())
        .map_err(|e| Error::Platform(format!("invalid embed: {e}")))
}

/// [`ChatGateway`] over the Discord REST API.
#[derive(Clone)]
pub struct DiscordChatGateway {
    http: Arc<HttpClient>,
}

impl DiscordChatGateway {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatGateway for DiscordChatGateway {
    async fn resolve_channel(&self, channel_id: &str) -> Result<ChannelRef, Error> {
        let id = parse_id(channel_id)?;
        let channel = self
            .http
            .channel(id)
            .await
            .map_err(|e| map_http_error(e, &format!("channel {channel_id}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing channel => {e:?}")))?;

        let guild_id = channel
            .guild_id
            .ok_or_else(|| Error::NotFound(format!("channel {channel_id} is not in a guild")))?;

        Ok(ChannelRef {
            channel_id: channel.id.to_string(),
            guild_id: guild_id.to_string(),
            name: channel.name.unwrap_or_else(|| channel.id.to_string()),
        })
    }

    async fn send_text(&self, channel_id: &str, content: &str) -> Result<String, Error> {
        let id = parse_id(channel_id)?;
        let message = self
            .http
            .create_message(id)
            .content(content)
            .await
            .map_err(|e| map_http_error(e, &format!("channel {channel_id}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing message => {e:?}")))?;
        Ok(message.id.to_string())
    }

    async fn send_card(&self, channel_id: &str, card: &NotificationCard) -> Result<String, Error> {
        let id = parse_id(channel_id)?;
        let embed = render_card(card)?;
        let message = self
            .http
            .create_message(id)
            .embeds(&[embed])
            .await
            .map_err(|e| map_http_error(e, &format!("channel {channel_id}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing message => {e:?}")))?;
        Ok(message.id.to_string())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), Error> {
        let channel = parse_id(channel_id)?;
        let message = parse_id(message_id)?;
        self.http
            .delete_message(channel, message)
            .await
            .map_err(|e| map_http_error(e, &format!("message {message_id}")))?;
        debug!("Deleted message {} in channel {}", message_id, channel_id);
        Ok(())
    }
}

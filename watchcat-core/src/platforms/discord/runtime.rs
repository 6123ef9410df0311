use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use twilight_gateway::{self as gateway, Config, Event, EventTypeFlags, Intents, Shard, StreamExt};
use twilight_http::client::ClientBuilder;
use twilight_http::Client as HttpClient;
use twilight_model::gateway::payload::incoming::{GuildCreate, MessageCreate, Ready as ReadyPayload};
use twilight_model::guild::Permissions;
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;

use crate::platforms::discord::commands::{
    execute, parse_invocation, resolve_privilege, CommandContext, RoleInfo,
};
use crate::platforms::discord::gateway::map_http_error;
use crate::services::command_service::CommandService;
use crate::Error;

/// Builds the REST client shared by the chat gateway and the shards.
pub fn http_client(token: &str) -> Arc<HttpClient> {
    Arc::new(
        ClientBuilder::new()
            .token(token.to_string())
            .timeout(Duration::from_secs(30))
            .build(),
    )
}

/// Identity learned from the READY payload.
#[derive(Default)]
struct SessionState {
    bot_id: RwLock<Option<Id<UserMarker>>>,
    application_id: RwLock<Option<String>>,
}

/// Gateway connection: keeps guild membership in sync and answers text
/// commands addressed to the bot.
pub struct DiscordRuntime {
    token: String,
    http: Arc<HttpClient>,
    service: Arc<CommandService>,
    session: Arc<SessionState>,
}

impl DiscordRuntime {
    pub fn new(token: String, http: Arc<HttpClient>, service: Arc<CommandService>) -> Self {
        Self {
            token,
            http,
            service,
            session: Arc::new(SessionState::default()),
        }
    }

    /// Connects the recommended number of shards and spawns one runner each.
    pub async fn start(&self) -> Result<Vec<JoinHandle<()>>, Error> {
        if self.token.is_empty() {
            return Err(Error::Auth("Discord token is empty".into()));
        }

        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT,
        );

        let shards = gateway::create_recommended(&self.http, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?;

        let mut handles = Vec::new();
        for shard in shards {
            let http = Arc::clone(&self.http);
            let service = Arc::clone(&self.service);
            let session = Arc::clone(&self.session);
            handles.push(tokio::spawn(async move {
                shard_runner(shard, http, service, session).await;
            }));
        }
        info!("Discord runtime started with {} shard(s)", handles.len());
        Ok(handles)
    }
}

async fn shard_runner(
    mut shard: Shard,
    http: Arc<HttpClient>,
    service: Arc<CommandService>,
    session: Arc<SessionState>,
) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                error!("Shard {shard_id} => error receiving event: {err:?}");
                continue;
            }
        };

        match event {
            Event::Ready(ready) => {
                let data: &ReadyPayload = ready.as_ref();
                info!(
                    "Shard {shard_id} => READY as {} (ID={})",
                    data.user.name, data.user.id
                );
                *session.bot_id.write() = Some(data.user.id);
                *session.application_id.write() = Some(data.application.id.to_string());
            }
            Event::GuildCreate(created) => match created.as_ref() {
                GuildCreate::Available(guild) => {
                    info!("Added to guild {} ({}).", guild.name, guild.id);
                }
                GuildCreate::Unavailable(guild) => {
                    debug!("Guild {} is unavailable", guild.id);
                }
            },
            Event::GuildDelete(deleted) => {
                if deleted.unavailable == Some(true) {
                    warn!("Guild {} became unavailable (outage); keeping its data", deleted.id);
                    continue;
                }
                if let Err(e) = service.remove_guild(&deleted.id.to_string()).await {
                    error!("Failed to remove data for guild {}: {:?}", deleted.id, e);
                }
            }
            Event::MessageCreate(msg) => {
                let Some(bot_id) = *session.bot_id.read() else {
                    continue;
                };
                let application_id = session.application_id.read().clone();
                let http = Arc::clone(&http);
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    if let Err(e) = handle_message(&http, &service, bot_id, application_id, &msg).await {
                        error!("Command failed in channel {}: {:?}", msg.channel_id, e);
                    }
                });
            }
            other => {
                trace!("Shard {shard_id} => unhandled event: {:?}", other.kind());
            }
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

async fn handle_message(
    http: &HttpClient,
    service: &CommandService,
    bot_id: Id<UserMarker>,
    application_id: Option<String>,
    msg: &MessageCreate,
) -> Result<(), Error> {
    if msg.author.bot || msg.author.id == bot_id || msg.mention_everyone {
        return Ok(());
    }
    if !msg.mentions.iter().any(|m| m.id == bot_id) {
        return Ok(());
    }
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    let Some(invocation) = parse_invocation(&msg.content, &bot_id.to_string()) else {
        return Ok(());
    };
    debug!("received text command {:?} in guild {}", invocation.command, guild_id);

    let guild = http
        .guild(guild_id)
        .await
        .map_err(|e| map_http_error(e, &format!("guild {guild_id}")))?
        .model()
        .await
        .map_err(|e| Error::Platform(format!("Error parsing guild => {e:?}")))?;

    let member_roles: Vec<String> = msg
        .member
        .as_ref()
        .map(|m| m.roles.iter().map(|r| r.to_string()).collect())
        .unwrap_or_default();

    // The @everyone role shares the guild's id and applies to every member.
    let is_administrator = guild.roles.iter().any(|role| {
        (role.id.cast() == guild.id || member_roles.contains(&role.id.to_string()))
            && role.permissions.contains(Permissions::ADMINISTRATOR)
    });
    let guild_key = guild_id.to_string();
    let admin_roles: BTreeSet<String> = service.admins(&guild_key).await?.into_iter().collect();
    let privilege = resolve_privilege(
        guild.owner_id == msg.author.id || is_administrator,
        &member_roles,
        &admin_roles,
    );

    let ctx = CommandContext {
        guild_id: guild_key,
        channel_id: msg.channel_id.to_string(),
        privilege,
        roles: guild
            .roles
            .iter()
            .map(|r| RoleInfo {
                id: r.id.to_string(),
                name: r.name.clone(),
            })
            .collect(),
        application_id,
    };

    let reply = execute(service, &ctx, &invocation).await?;
    http.create_message(msg.channel_id)
        .content(&reply)
        .await
        .map_err(|e| map_http_error(e, &format!("channel {}", msg.channel_id)))?;
    Ok(())
}

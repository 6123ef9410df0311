//! watchcat-server/src/context.rs
//!
//! Wires the database, handlers and Discord into one context.

use std::sync::Arc;

use tracing::info;

use watchcat_core::config::WatchcatConfig;
use watchcat_core::platforms::discord::{http_client, DiscordChatGateway, DiscordRuntime};
use watchcat_core::platforms::ChatGateway;
use watchcat_core::registry::{build_registry, HandlerRegistry};
use watchcat_core::repositories::{
    GuildRepository, ManagedMessageRepository, PostgresGuildRepository,
    PostgresManagedMessageRepository, PostgresSnapshotRepository, SnapshotRepository,
};
use watchcat_core::services::{CommandService, Dispatcher};
use watchcat_core::{Database, DefaultHttpClient, Error, HttpClient};

use crate::Args;

pub struct ServerContext {
    pub db: Database,
    pub registry: Arc<HandlerRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub command_service: Arc<CommandService>,
    pub discord: DiscordRuntime,
}

impl ServerContext {
    pub async fn new(args: &Args) -> Result<Self, Error> {
        let config = WatchcatConfig::load(&args.config)?;
        info!("Loaded config with {} handler(s)", config.handlers.len());

        let db = Database::new(&args.database_url).await?;
        if args.skip_migrations {
            info!("Skipping migrations.");
        } else {
            db.migrate().await?;
        }

        let guilds: Arc<dyn GuildRepository> = Arc::new(PostgresGuildRepository::new(db.pool().clone()));
        let messages: Arc<dyn ManagedMessageRepository> =
            Arc::new(PostgresManagedMessageRepository::new(db.pool().clone()));
        let snapshots: Arc<dyn SnapshotRepository> =
            Arc::new(PostgresSnapshotRepository::new(db.pool().clone()));

        let http: Arc<dyn HttpClient> = Arc::new(DefaultHttpClient::new(config.user_agent())?);
        let registry = Arc::new(build_registry(&config, http, guilds.clone(), snapshots)?);
        if registry.loaded().is_empty() {
            return Err(Error::Config(format!(
                "no handlers configured in {}",
                args.config.display()
            )));
        }

        let discord_http = http_client(&args.discord_token);
        let chat: Arc<dyn ChatGateway> = Arc::new(DiscordChatGateway::new(discord_http.clone()));
        let dispatcher = Arc::new(Dispatcher::new(chat.clone(), guilds.clone(), messages));
        let command_service = Arc::new(CommandService::new(
            registry.clone(),
            dispatcher.clone(),
            guilds,
            chat,
        ));
        let discord = DiscordRuntime::new(args.discord_token.clone(), discord_http, command_service.clone());

        Ok(Self {
            db,
            registry,
            dispatcher,
            command_service,
            discord,
        })
    }
}

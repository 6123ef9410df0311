use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod context;
mod server;

#[derive(Parser, Debug, Clone)]
#[command(name = "watchcat")]
#[command(author, version, about = "Watchcat - livestream notifications for Discord")]
pub struct Args {
    /// Path to the JSON config file listing the handlers to load.
    #[arg(long, default_value = "watchcat.json")]
    pub config: PathBuf,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://watchcat@localhost:5432/watchcat")]
    pub database_url: String,

    /// Discord bot token.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: String,

    /// Do not apply pending migrations on startup.
    #[arg(long, default_value = "false")]
    pub skip_migrations: bool,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("watchcat=info".parse().unwrap_or_default())
        .add_directive("watchcat_core=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be set.
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("Watchcat starting. config={}", args.config.display());

    if let Err(e) = server::run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e).context("watchcat stopped with an error");
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

//! watchcat-server/src/server.rs
//!
//! Starts the pollers and the Discord shards, then waits for Ctrl-C.

use tracing::{error, info, warn};

use watchcat_core::Error;

use crate::context::ServerContext;
use crate::Args;

pub async fn run_server(args: Args) -> Result<(), Error> {
    let ctx = ServerContext::new(&args).await?;

    // 1) Shards first, so command handling is up while snapshots resume.
    let shard_handles = ctx.discord.start().await?;

    // 2) Resume snapshots and start polling
    let poll_handles = ctx.registry.activate_all(ctx.dispatcher.clone()).await;
    for (name, id) in ctx.command_service.handlers() {
        info!("Handler {} ({}) is polling", name, id);
    }

    // 3) Wait for Ctrl-C
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {:?}", e);
    }
    info!("Ctrl-C detected; shutting down...");

    for handle in poll_handles.iter().chain(shard_handles.iter()) {
        handle.abort();
    }
    for handle in poll_handles.into_iter().chain(shard_handles) {
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                warn!("Task ended abnormally: {:?}", e);
            }
        }
    }

    ctx.db.pool().close().await;
    info!("Database pool closed.");
    Ok(())
}

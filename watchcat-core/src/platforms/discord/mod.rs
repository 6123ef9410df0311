pub mod commands;
pub mod gateway;
pub mod runtime;

pub use gateway::DiscordChatGateway;
pub use runtime::{http_client, DiscordRuntime};

// src/repositories/postgres/mod.rs

pub mod guilds;
pub mod managed_messages;
pub mod adapter_state;

pub use guilds::PostgresGuildRepository;
pub use managed_messages::PostgresManagedMessageRepository;
pub use adapter_state::PostgresSnapshotRepository;

// src/repositories/mod.rs

pub mod postgres;

pub use watchcat_common::traits::repository_traits::{
    GuildRepository, ManagedMessageRepository, SnapshotRepository,
};
pub use postgres::{
    PostgresGuildRepository, PostgresManagedMessageRepository, PostgresSnapshotRepository,
};

// File: watchcat-core/src/test_utils/mod.rs
//
// Fakes for exercising the engine without Postgres, Discord or the network.

pub mod helpers;
pub mod fakes;

pub use fakes::{
    stream, FakeHttpClient, InMemoryGuildRepository, InMemoryManagedMessageRepository,
    InMemorySnapshotRepository, RecordedRequest, RecordingChat, ScriptedSource, SentMessage,
};

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use watchcat_common::models::Stream;
use watchcat_core::adapters::{StreamAdapter, StreamEvents};
use watchcat_core::registry::HandlerRegistry;
use watchcat_core::services::{CommandService, Dispatcher};
use watchcat_core::test_utils::{
    InMemoryGuildRepository, InMemoryManagedMessageRepository, InMemorySnapshotRepository,
    RecordingChat, ScriptedSource,
};

/// Everything wired to in-memory fakes.
pub struct Harness {
    pub guilds: Arc<InMemoryGuildRepository>,
    pub messages: Arc<InMemoryManagedMessageRepository>,
    pub snapshots: Arc<InMemorySnapshotRepository>,
    pub chat: Arc<RecordingChat>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        let guilds = Arc::new(InMemoryGuildRepository::default());
        let messages = Arc::new(InMemoryManagedMessageRepository::default());
        let snapshots = Arc::new(InMemorySnapshotRepository::default());
        let chat = Arc::new(RecordingChat::new());
        let dispatcher = Arc::new(Dispatcher::new(chat.clone(), guilds.clone(), messages.clone()));
        Self {
            guilds,
            messages,
            snapshots,
            chat,
            dispatcher,
        }
    }

    pub fn adapter(&self, source: &Arc<ScriptedSource>) -> StreamAdapter {
        StreamAdapter::new(source.clone(), self.guilds.clone(), self.snapshots.clone())
    }

    /// Registry holding one adapter per source, in order.
    pub fn registry(&self, sources: &[Arc<ScriptedSource>]) -> Arc<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();
        for source in sources {
            registry.register(self.adapter(source)).unwrap();
        }
        Arc::new(registry)
    }

    pub fn command_service(&self, registry: Arc<HandlerRegistry>) -> CommandService {
        CommandService::new(registry, self.dispatcher.clone(), self.guilds.clone(), self.chat.clone())
    }
}

/// Waits for a background condition, e.g. the ping cleanup task.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Started(String),
    Stopped(String),
    Updated(usize),
}

/// Records the event sequence of a poll cycle.
#[derive(Default)]
pub struct RecordingEvents {
    pub events: Mutex<Vec<Recorded>>,
}

impl RecordingEvents {
    pub fn take(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[async_trait]
impl StreamEvents for RecordingEvents {
    async fn started(&self, _adapter: &StreamAdapter, stream: &Stream) {
        self.events.lock().push(Recorded::Started(stream.username.clone()));
    }

    async fn stopped(&self, _adapter: &StreamAdapter, stream: &Stream) {
        self.events.lock().push(Recorded::Stopped(stream.username.clone()));
    }

    async fn updated(&self, _adapter: &StreamAdapter, streams: &[Stream]) {
        self.events.lock().push(Recorded::Updated(streams.len()));
    }
}

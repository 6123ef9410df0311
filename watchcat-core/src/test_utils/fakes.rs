// File: watchcat-core/src/test_utils/fakes.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;

use watchcat_common::models::{
    normalize_username, ChannelRef, GuildConfig, ManagedMessage, NotificationCard, Stream,
};
use watchcat_common::traits::repository_traits::{
    GuildRepository, ManagedMessageRepository, SnapshotRepository,
};

use crate::adapters::{capture_streamer, DiffKey, SourceKind, StreamSource, UserStatus};
use crate::http::{HttpClient, HttpResponse};
use crate::platforms::ChatGateway;
use crate::Error;

/// A stream whose URL follows the [`ScriptedSource`] pattern.
pub fn stream(network_id: &str, id: &str, username: &str) -> Stream {
    Stream::new(id, network_id, username, format!("https://{network_id}.example/{username}"))
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryGuildRepository {
    guilds: Mutex<BTreeMap<String, GuildConfig>>,
}

impl InMemoryGuildRepository {
    fn upsert<R>(&self, guild_id: &str, f: impl FnOnce(&mut GuildConfig) -> R) -> R {
        let mut guilds = self.guilds.lock();
        let config = guilds
            .entry(guild_id.to_string())
            .or_insert_with(|| GuildConfig::new(guild_id));
        f(config)
    }
}

#[async_trait]
impl GuildRepository for InMemoryGuildRepository {
    async fn get(&self, guild_id: &str) -> Result<Option<GuildConfig>, Error> {
        Ok(self.guilds.lock().get(guild_id).cloned())
    }

    async fn set_channel(&self, guild_id: &str, channel_id: &str) -> Result<bool, Error> {
        Ok(self.upsert(guild_id, |g| {
            let changed = g.channel_id.as_deref() != Some(channel_id);
            g.channel_id = Some(channel_id.to_string());
            changed
        }))
    }

    async fn set_ping_role(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        Ok(self.upsert(guild_id, |g| {
            let changed = g.ping_role_id.as_deref() != Some(role_id);
            g.ping_role_id = Some(role_id.to_string());
            changed
        }))
    }

    async fn unset_ping_role(&self, guild_id: &str) -> Result<bool, Error> {
        Ok(self.upsert(guild_id, |g| g.ping_role_id.take().is_some()))
    }

    async fn grant(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        Ok(self.upsert(guild_id, |g| g.admin_role_ids.insert(role_id.to_string())))
    }

    async fn revoke(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        Ok(self.upsert(guild_id, |g| g.admin_role_ids.remove(role_id)))
    }

    async fn watch(&self, guild_id: &str, network_id: &str, username: &str) -> Result<bool, Error> {
        let username = normalize_username(username);
        Ok(self.upsert(guild_id, |g| {
            g.networks
                .entry(network_id.to_string())
                .or_default()
                .watched_usernames
                .insert(username)
        }))
    }

    async fn unwatch(&self, guild_id: &str, network_id: &str, username: &str) -> Result<bool, Error> {
        let username = normalize_username(username);
        Ok(self.upsert(guild_id, |g| {
            g.networks
                .get_mut(network_id)
                .map(|n| n.watched_usernames.remove(&username))
                .unwrap_or(false)
        }))
    }

    async fn delete(&self, guild_id: &str) -> Result<bool, Error> {
        Ok(self.guilds.lock().remove(guild_id).is_some())
    }

    async fn list_watching(&self, network_id: &str, username: &str) -> Result<Vec<GuildConfig>, Error> {
        Ok(self
            .guilds
            .lock()
            .values()
            .filter(|g| g.is_watching(network_id, username))
            .cloned()
            .collect())
    }

    async fn global_watch_list(&self, network_id: &str) -> Result<Vec<String>, Error> {
        let all: BTreeSet<String> = self
            .guilds
            .lock()
            .values()
            .flat_map(|g| g.watched(network_id))
            .collect();
        Ok(all.into_iter().collect())
    }
}

/// Enforces the one-record-per-target rule the way the unique index does.
#[derive(Default)]
pub struct InMemoryManagedMessageRepository {
    records: Mutex<Vec<ManagedMessage>>,
}

impl InMemoryManagedMessageRepository {
    pub fn all(&self) -> Vec<ManagedMessage> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ManagedMessageRepository for InMemoryManagedMessageRepository {
    async fn insert(&self, message: &ManagedMessage) -> Result<(), Error> {
        let mut records = self.records.lock();
        let stream_id = normalize_username(&message.stream_id);
        let duplicate = records.iter().any(|r| {
            r.guild_id == message.guild_id && r.network_id == message.network_id && r.stream_id == stream_id
        });
        if duplicate {
            return Err(Error::Internal(format!(
                "duplicate managed message for {}/{}/{}",
                message.guild_id, message.network_id, stream_id
            )));
        }
        let mut record = message.clone();
        record.stream_id = stream_id;
        records.push(record);
        Ok(())
    }

    async fn take(
        &self,
        guild_id: &str,
        network_id: &str,
        stream_id: &str,
    ) -> Result<Option<ManagedMessage>, Error> {
        let stream_id = normalize_username(stream_id);
        let mut records = self.records.lock();
        let idx = records.iter().position(|r| {
            r.guild_id == guild_id && r.network_id == network_id && r.stream_id == stream_id
        });
        Ok(idx.map(|i| records.remove(i)))
    }

    async fn find_for_streamer(&self, network_id: &str, stream_id: &str) -> Result<Vec<ManagedMessage>, Error> {
        let stream_id = normalize_username(stream_id);
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|r| r.network_id == network_id && r.stream_id == stream_id)
            .cloned()
            .collect())
    }

    async fn find_for_channel(&self, channel_id: &str) -> Result<Vec<ManagedMessage>, Error> {
        Ok(self.records.lock().iter().filter(|r| r.channel_id == channel_id).cloned().collect())
    }

    async fn find_for_guild(&self, guild_id: &str) -> Result<Vec<ManagedMessage>, Error> {
        Ok(self.records.lock().iter().filter(|r| r.guild_id == guild_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemorySnapshotRepository {
    snapshots: Mutex<HashMap<String, Vec<Stream>>>,
    saves: AtomicUsize,
}

impl InMemorySnapshotRepository {
    pub fn seed(&self, network_id: &str, streams: Vec<Stream>) {
        self.snapshots.lock().insert(network_id.to_string(), streams);
    }

    pub fn stored(&self, network_id: &str) -> Option<Vec<Stream>> {
        self.snapshots.lock().get(network_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn load(&self, network_id: &str) -> Result<Vec<Stream>, Error> {
        Ok(self.stored(network_id).unwrap_or_default())
    }

    async fn save(&self, network_id: &str, streams: &[Stream]) -> Result<(), Error> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.snapshots.lock().insert(network_id.to_string(), streams.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chat platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub channel_id: String,
    pub message_id: String,
    pub text: Option<String>,
    pub card: Option<NotificationCard>,
}

/// A chat platform that remembers what was sent and deleted.
#[derive(Default)]
pub struct RecordingChat {
    channels: Mutex<HashMap<String, ChannelRef>>,
    sent: Mutex<Vec<SentMessage>>,
    deleted: Mutex<Vec<String>>,
    next_id: AtomicU64,
    fail_sends: AtomicBool,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, channel_id: &str, guild_id: &str, name: &str) {
        self.channels.lock().insert(
            channel_id.to_string(),
            ChannelRef {
                channel_id: channel_id.to_string(),
                guild_id: guild_id.to_string(),
                name: name.to_string(),
            },
        );
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    /// Sent cards that have not been deleted.
    pub fn live_cards(&self) -> Vec<SentMessage> {
        let deleted = self.deleted.lock().clone();
        self.sent
            .lock()
            .iter()
            .filter(|m| m.card.is_some() && !deleted.contains(&m.message_id))
            .cloned()
            .collect()
    }

    fn record(&self, channel_id: &str, text: Option<String>, card: Option<NotificationCard>) -> Result<String, Error> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Platform("send rejected".to_string()));
        }
        if !self.channels.lock().contains_key(channel_id) {
            return Err(Error::NotFound(format!("channel {channel_id}")));
        }
        let message_id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.sent.lock().push(SentMessage {
            channel_id: channel_id.to_string(),
            message_id: message_id.clone(),
            text,
            card,
        });
        Ok(message_id)
    }
}

#[async_trait]
impl ChatGateway for RecordingChat {
    async fn resolve_channel(&self, channel_id: &str) -> Result<ChannelRef, Error> {
        self.channels
            .lock()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("channel {channel_id}")))
    }

    async fn send_text(&self, channel_id: &str, content: &str) -> Result<String, Error> {
        self.record(channel_id, Some(content.to_string()), None)
    }

    async fn send_card(&self, channel_id: &str, card: &NotificationCard) -> Result<String, Error> {
        self.record(channel_id, None, Some(card.clone()))
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), Error> {
        let exists = self
            .sent
            .lock()
            .iter()
            .any(|m| m.channel_id == channel_id && m.message_id == message_id);
        let mut deleted = self.deleted.lock();
        if !exists || deleted.iter().any(|d| d == message_id) {
            return Err(Error::NotFound(format!("message {message_id}")));
        }
        deleted.push(message_id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stream source
// ---------------------------------------------------------------------------

/// A stream source whose answers are set by the test.
///
/// URLs look like `https://<network_id>.example/<username>`.
pub struct ScriptedSource {
    network_id: String,
    display_name: String,
    kind: SourceKind,
    diff_key: DiffKey,
    pattern: Regex,
    live: Mutex<Vec<Stream>>,
    failures: AtomicUsize,
    statuses: Mutex<HashMap<String, UserStatus>>,
    fetches: Mutex<Vec<Vec<String>>>,
    checks: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn with_kind(network_id: &str, kind: SourceKind) -> Self {
        let pattern = Regex::new(&format!(r"(?i){}\.example/(.*)$", regex::escape(network_id)))
            .unwrap_or_else(|e| panic!("bad scripted pattern: {e}"));
        Self {
            network_id: network_id.to_string(),
            display_name: format!("{network_id} (scripted)"),
            kind,
            diff_key: DiffKey::Id,
            pattern,
            live: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
            statuses: Mutex::new(HashMap::new()),
            fetches: Mutex::new(Vec::new()),
            checks: Mutex::new(Vec::new()),
        }
    }

    /// Unscoped roster source, diffed by id.
    pub fn bulk(network_id: &str) -> Self {
        Self::with_kind(network_id, SourceKind::BulkListing { scoped_to_watch_list: false })
    }

    /// Roster source that needs the watch list, diffed by username.
    pub fn scoped(network_id: &str) -> Self {
        Self::with_kind(network_id, SourceKind::BulkListing { scoped_to_watch_list: true })
            .with_diff_key(DiffKey::Username)
    }

    /// Per-user source, diffed by username.
    pub fn per_user(network_id: &str) -> Self {
        Self::with_kind(network_id, SourceKind::PerUserCheck).with_diff_key(DiffKey::Username)
    }

    pub fn with_diff_key(mut self, key: DiffKey) -> Self {
        self.diff_key = key;
        self
    }

    pub fn set_live(&self, streams: Vec<Stream>) {
        *self.live.lock() = streams;
    }

    /// Makes the next `n` fetches fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn set_status(&self, username: &str, status: UserStatus) {
        self.statuses.lock().insert(normalize_username(username), status);
    }

    /// Watch lists passed to each `fetch_live` call.
    pub fn fetch_calls(&self) -> Vec<Vec<String>> {
        self.fetches.lock().clone()
    }

    pub fn checked_users(&self) -> Vec<String> {
        self.checks.lock().clone()
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StreamSource for ScriptedSource {
    fn network_id(&self) -> &str {
        &self.network_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn diff_key(&self) -> DiffKey {
        self.diff_key
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(50)
    }

    fn match_url(&self, url: &str) -> Option<String> {
        capture_streamer(&self.pattern, url)
    }

    fn resolve_stream_url(&self, username: &str) -> String {
        format!("https://{}.example/{}", self.network_id, username)
    }

    async fn fetch_live(&self, watched: &[String]) -> Result<Vec<Stream>, Error> {
        self.fetches.lock().push(watched.to_vec());
        if self.take_failure() {
            return Err(Error::Platform("scripted fetch failure".to_string()));
        }
        Ok(self.live.lock().clone())
    }

    async fn check_user(&self, username: &str) -> Result<UserStatus, Error> {
        self.checks.lock().push(username.to_string());
        if self.take_failure() {
            return Err(Error::Platform("scripted check failure".to_string()));
        }
        let status = self.statuses.lock().get(&normalize_username(username)).cloned();
        Ok(status.unwrap_or(UserStatus::Offline))
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
}

struct Canned {
    prefix: String,
    status: u16,
    body: String,
    once: bool,
}

/// Answers requests from canned responses matched by URL prefix.
///
/// One-shot responses are used first, in the order they were added; after
/// that the longest matching persistent prefix wins.
#[derive(Default)]
pub struct FakeHttpClient {
    responses: Mutex<Vec<Canned>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url_prefix: &str, status: u16, body: &str) {
        self.add(url_prefix, status, body, false);
    }

    pub fn respond_once(&self, url_prefix: &str, status: u16, body: &str) {
        self.add(url_prefix, status, body, true);
    }

    fn add(&self, url_prefix: &str, status: u16, body: &str, once: bool) {
        self.responses.lock().push(Canned {
            prefix: url_prefix.to_string(),
            status,
            body: body.to_string(),
            once,
        });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    fn answer(&self, method: &str, url: &str, body: Option<String>, headers: &[(&str, &str)]) -> Result<HttpResponse, Error> {
        self.requests.lock().push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            body,
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        });

        let mut responses = self.responses.lock();
        if let Some(idx) = responses.iter().position(|c| c.once && url.starts_with(&c.prefix)) {
            let canned = responses.remove(idx);
            return Ok(HttpResponse { status: canned.status, body: canned.body });
        }

        responses
            .iter()
            .filter(|c| !c.once && url.starts_with(&c.prefix))
            .max_by_key(|c| c.prefix.len())
            .map(|c| HttpResponse { status: c.status, body: c.body.clone() })
            .ok_or_else(|| Error::Platform(format!("no canned response for {url}")))
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, Error> {
        self.answer("GET", url, None, headers)
    }

    async fn post(&self, url: &str, body: String, headers: &[(&str, &str)]) -> Result<HttpResponse, Error> {
        self.answer("POST", url, Some(body), headers)
    }
}

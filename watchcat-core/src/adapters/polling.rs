// ========================================================
// File: watchcat-core/src/adapters/polling.rs
// ========================================================
//! The polling engine shared by every stream source.
//!
//! Each cycle produces a new snapshot, diffs it against the previous one and
//! reports the difference through [`StreamEvents`]:
//!   - `stopped` once per stream that disappeared,
//!   - `started` once per stream that appeared,
//!   - `updated` exactly once with the full new snapshot.
//! The snapshot is persisted per network so a restart resumes where it left
//! off instead of announcing every live streamer again.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use watchcat_common::models::Stream;
use watchcat_common::traits::repository_traits::{GuildRepository, SnapshotRepository};

use crate::adapters::{DiffKey, SourceKind, StreamSource, UserStatus};
use crate::Error;

/// Receiver of the per-cycle events of one adapter.
#[async_trait]
pub trait StreamEvents: Send + Sync {
    async fn started(&self, adapter: &StreamAdapter, stream: &Stream);
    async fn stopped(&self, adapter: &StreamAdapter, stream: &Stream);
    async fn updated(&self, _adapter: &StreamAdapter, _streams: &[Stream]) {}
}

/// Streams that appeared and disappeared between two snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDiff {
    pub started: Vec<Stream>,
    pub stopped: Vec<Stream>,
}

impl StreamDiff {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A new snapshot was taken and events were emitted.
    Updated { started: usize, stopped: usize, live: usize },
    /// Nothing to do: the source needs a watch list and nobody watches
    /// anyone on this network.
    Idle,
    /// The previous cycle was still running.
    Skipped,
    /// The network could not be reached; the previous snapshot was kept.
    FetchFailed,
}

fn key_of(stream: &Stream, key: DiffKey) -> String {
    match key {
        DiffKey::Id => stream.id.clone(),
        DiffKey::Username => stream.normalized_username(),
    }
}

/// Computes `current − previous` and `previous − current` by identity key.
/// A key that appears more than once is reported once.
pub fn diff_snapshots(previous: &[Stream], current: &[Stream], key: DiffKey) -> StreamDiff {
    let previous_keys: HashSet<String> = previous.iter().map(|s| key_of(s, key)).collect();
    let current_keys: HashSet<String> = current.iter().map(|s| key_of(s, key)).collect();

    let mut seen = HashSet::new();
    let started = current
        .iter()
        .filter(|s| {
            let k = key_of(s, key);
            !previous_keys.contains(&k) && seen.insert(k)
        })
        .cloned()
        .collect();

    seen.clear();
    let stopped = previous
        .iter()
        .filter(|s| {
            let k = key_of(s, key);
            !current_keys.contains(&k) && seen.insert(k)
        })
        .cloned()
        .collect();

    StreamDiff { started, stopped }
}

/// Clears the in-flight flag when a cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A stream source plus its live snapshot and polling loop.
pub struct StreamAdapter {
    source: Arc<dyn StreamSource>,
    guilds: Arc<dyn GuildRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    cache: RwLock<Vec<Stream>>,
    in_flight: AtomicBool,
}

impl StreamAdapter {
    pub fn new(
        source: Arc<dyn StreamSource>,
        guilds: Arc<dyn GuildRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
    ) -> Self {
        Self {
            source,
            guilds,
            snapshots,
            cache: RwLock::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        self.source.network_id()
    }

    pub fn name(&self) -> &str {
        self.source.display_name()
    }

    pub fn poll_interval(&self) -> Duration {
        self.source.poll_interval()
    }

    pub fn match_url(&self, url: &str) -> Option<String> {
        self.source.match_url(url)
    }

    pub fn resolve_stream_url(&self, username: &str) -> String {
        self.source.resolve_stream_url(username)
    }

    /// The live stream of `username` as of the last poll. No I/O.
    pub fn cached_stream(&self, username: &str) -> Option<Stream> {
        self.cache.read().iter().find(|s| s.is_user(username)).cloned()
    }

    /// The whole current snapshot.
    pub fn live(&self) -> Vec<Stream> {
        self.cache.read().clone()
    }

    /// Loads the persisted snapshot for this network.
    pub async fn resume(&self) -> Result<usize, Error> {
        let streams = self.snapshots.load(self.id()).await?;
        let count = streams.len();
        *self.cache.write() = streams;
        info!(
            network = %self.name(),
            "Resuming from previous state; {} streams in store. Polling every {}s",
            count,
            self.poll_interval().as_secs()
        );
        Ok(count)
    }

    /// Runs one poll cycle.
    ///
    /// Fetch failures are logged and reported as [`PollOutcome::FetchFailed`];
    /// only store failures come back as `Err`.
    pub async fn poll_once(&self, events: &dyn StreamEvents) -> Result<PollOutcome, Error> {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            debug!(network = %self.name(), "Previous poll still running; skipping this tick");
            return Ok(PollOutcome::Skipped);
        };

        let next = match self.source.kind() {
            SourceKind::BulkListing { scoped_to_watch_list } => {
                let watched = if scoped_to_watch_list {
                    self.guilds.global_watch_list(self.id()).await?
                } else {
                    Vec::new()
                };

                if scoped_to_watch_list && watched.is_empty() {
                    // The last watcher left; drop whatever is still cached.
                    if self.cache.read().is_empty() {
                        debug!(network = %self.name(), "Nobody is watched; nothing to poll");
                        return Ok(PollOutcome::Idle);
                    }
                    Vec::new()
                } else {
                    match self.source.fetch_live(&watched).await {
                        Ok(streams) => streams,
                        Err(e) => {
                            warn!(network = %self.name(), "Poll failure: {}", e);
                            return Ok(PollOutcome::FetchFailed);
                        }
                    }
                }
            }
            SourceKind::PerUserCheck => match self.check_watched().await? {
                Some(streams) => streams,
                None => return Ok(PollOutcome::Idle),
            },
        };

        let previous = std::mem::replace(&mut *self.cache.write(), next.clone());
        let diff = diff_snapshots(&previous, &next, self.source.diff_key());

        for stream in &diff.stopped {
            info!(network = %self.name(), "stream {} stopped: {}", stream.id, stream.username);
            events.stopped(self, stream).await;
        }
        for stream in &diff.started {
            info!(network = %self.name(), "stream {} started: {}", stream.id, stream.username);
            events.started(self, stream).await;
        }
        events.updated(self, &next).await;

        self.snapshots.save(self.id(), &next).await?;

        Ok(PollOutcome::Updated {
            started: diff.started.len(),
            stopped: diff.stopped.len(),
            live: next.len(),
        })
    }

    /// Builds the next snapshot of a per-user source by checking every
    /// globally watched username. Returns `None` when nobody is watched and
    /// nothing is cached.
    async fn check_watched(&self) -> Result<Option<Vec<Stream>>, Error> {
        let watched = self.guilds.global_watch_list(self.id()).await?;
        if watched.is_empty() && self.cache.read().is_empty() {
            debug!(network = %self.name(), "Nobody is watched; nothing to poll");
            return Ok(None);
        }
        debug!(network = %self.name(), "{} user(s) for which to perform update.", watched.len());

        // Users nobody watches anymore fall out of the snapshot.
        let mut next: Vec<Stream> = self
            .live()
            .into_iter()
            .filter(|s| watched.contains(&s.normalized_username()))
            .collect();

        for user in &watched {
            let known = next.iter().position(|s| s.is_user(user));

            match self.source.check_user(user).await {
                Ok(UserStatus::Online(stream)) => {
                    if known.is_none() {
                        info!(network = %self.name(), "{} is now online.", user);
                        next.push(stream);
                    }
                }
                Ok(UserStatus::Offline) => {
                    if let Some(idx) = known {
                        info!(network = %self.name(), "{} is now offline.", user);
                        next.remove(idx);
                    }
                }
                Ok(UserStatus::Unknown) => {
                    info!(network = %self.name(), "Trying to track {}, but they don't seem to exist.", user);
                }
                Ok(UserStatus::Unrecognized(status)) => {
                    warn!(network = %self.name(), "Unexpected status for user {}: {}", user, status);
                }
                Err(e) => {
                    warn!(network = %self.name(), "Failed to check status of {}: {}", user, e);
                }
            }
        }

        Ok(Some(next))
    }

    /// Spawns the polling loop: one cycle right away, then one per interval.
    pub fn spawn(self: &Arc<Self>, events: Arc<dyn StreamEvents>) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(adapter.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match adapter.poll_once(events.as_ref()).await {
                    Ok(outcome) => debug!(network = %adapter.name(), "Poll finished: {:?}", outcome),
                    Err(e) => error!(network = %adapter.name(), "Poll cycle failed: {:?}", e),
                }
            }
        })
    }

    /// Resumes the persisted snapshot and starts polling.
    pub async fn activate(self: &Arc<Self>, events: Arc<dyn StreamEvents>) -> JoinHandle<()> {
        if let Err(e) = self.resume().await {
            error!(network = %self.name(), "Could not load previous state, starting empty: {:?}", e);
        }
        let handle = self.spawn(events);
        info!(network = %self.name(), "Handler loaded");
        handle
    }
}
